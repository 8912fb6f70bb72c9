//! Process wiring: clients, the Mattermost event loop and shutdown.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use strum::Display;
use url::Url;

use crate::config::Config;
use crate::error::Result;
use crate::mattermost::{MattermostClient, MattermostSocket, WebSocketSignal, parse_posted};
use crate::openai::OpenAiClient;
use crate::relay::{ChatRelay, ImageRelay, ReplyController, TypingIndicator};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BotKind {
    /// Streams chat completions into thread replies.
    Chat,
    /// Answers mentions with a generated image.
    Image,
}

/// Run one bot until SIGTERM or Ctrl-C.
pub async fn run(kind: BotKind) -> Result<()> {
    info!("Initializing {kind} bot");
    let config = Config::from_env()?;

    debug!("Initializing Mattermost client");
    let mattermost = Arc::new(MattermostClient::new(&config.mattermost)?);
    let identity = mattermost.get_me().await?;
    info!(
        "Logged in to Mattermost as @{} ({})",
        identity.username, identity.id
    );

    debug!("Initializing OpenAI client");
    let openai = Arc::new(OpenAiClient::new(&config.openai)?);

    let websocket_url = config.mattermost.websocket_url()?;
    let indicator = TypingIndicator::new(
        Arc::new(WebSocketSignal::new(websocket_url.clone())),
        config.mattermost.token.clone(),
    );
    let model = config.openai.deployment.clone();

    let controller: Arc<dyn ReplyController> = match kind {
        BotKind::Chat => Arc::new(ChatRelay::new(
            mattermost, openai, indicator, identity, model,
        )),
        BotKind::Image => Arc::new(ImageRelay::new(
            mattermost, openai, indicator, identity, model,
        )),
    };

    info!("Starting Mattermost event listener");
    tokio::select! {
        () = listen(&websocket_url, &config.mattermost.token, controller) => {}
        () = shutdown_signal() => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    Ok(())
}

/// Keeps an event connection open, reconnecting after a fixed delay.
async fn listen(url: &Url, token: &str, controller: Arc<dyn ReplyController>) {
    loop {
        match listen_once(url, token, &controller).await {
            Ok(()) => warn!(
                "Mattermost closed the event connection, reconnecting in {}s",
                RECONNECT_DELAY.as_secs()
            ),
            Err(e) => warn!(
                "Mattermost event connection failed: {e}, reconnecting in {}s",
                RECONNECT_DELAY.as_secs()
            ),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Dispatches `posted` events until the connection ends. Each post is
/// handled on its own task.
async fn listen_once(
    url: &Url,
    token: &str,
    controller: &Arc<dyn ReplyController>,
) -> Result<()> {
    let mut socket = MattermostSocket::connect(url).await?;
    socket.authenticate(token).await?;
    info!("Connected to Mattermost event stream");

    while let Some(event) = socket.next_event().await? {
        match parse_posted(&event) {
            Ok(Some(incoming)) => {
                debug!(
                    "Post {} from {} in channel {}",
                    incoming.post.id, incoming.sender_name, incoming.post.channel_id
                );
                let controller = Arc::clone(controller);
                tokio::spawn(async move { controller.handle(incoming).await });
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping malformed posted event: {e}"),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = terminate.recv() => debug!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => debug!("Received SIGINT"),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_lowercase() {
        assert_eq!(BotKind::Chat.to_string(), "chat");
        assert_eq!(BotKind::Image.to_string(), "image");
    }
}
