//! Reply controller for the image bot.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::backend::{CompletionApi, MessagingBackend};
use crate::error::Result;
use crate::media::transcode_to_jpeg;
use crate::types::{BotIdentity, IncomingPost, Post, TypingTarget};

use super::typing::TypingIndicator;
use super::{ReplyController, report_failure};

/// Turns a post that mentions the bot into a generated image reply.
pub struct ImageRelay {
    backend: Arc<dyn MessagingBackend>,
    completions: Arc<dyn CompletionApi>,
    indicator: TypingIndicator,
    identity: BotIdentity,
    model: String,
}

impl ImageRelay {
    pub fn new(
        backend: Arc<dyn MessagingBackend>,
        completions: Arc<dyn CompletionApi>,
        indicator: TypingIndicator,
        identity: BotIdentity,
        model: String,
    ) -> Self {
        Self {
            backend,
            completions,
            indicator,
            identity,
            model,
        }
    }

    /// Only direct messages and explicit mentions trigger a reply.
    fn is_addressed(&self, incoming: &IncomingPost) -> bool {
        incoming.post.user_id != self.identity.id
            && (incoming.is_direct_message() || incoming.mentions_user(&self.identity.id))
    }

    async fn reply(&self, post: &Post) -> Result<()> {
        let prompt = image_prompt(&post.message, &self.identity.mention_token());
        info!("API request: {prompt}");

        let session = self.indicator.start(TypingTarget::for_post(post));
        let result = self.generate_and_post(post, prompt).await;
        session.stop().await;
        result
    }

    async fn generate_and_post(&self, post: &Post, prompt: &str) -> Result<()> {
        let image = self.completions.generate_image(prompt, &self.model).await?;

        let source = image.bytes;
        let jpeg = tokio::task::spawn_blocking(move || transcode_to_jpeg(&source)).await??;
        debug!("Transcoded image to {} JPEG bytes", jpeg.len());

        self.backend
            .post_image_reply(post, &image.revised_prompt, jpeg)
            .await?;
        info!("API response: {}", image.revised_prompt);
        Ok(())
    }
}

/// Drops a leading `@bot` address and surrounding whitespace.
fn image_prompt<'a>(message: &'a str, mention: &str) -> &'a str {
    let message = message.trim();
    match message.strip_prefix(mention) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
            rest.trim_start()
        }
        _ => message,
    }
}

#[async_trait]
impl ReplyController for ImageRelay {
    async fn handle(&self, incoming: IncomingPost) {
        if !self.is_addressed(&incoming) {
            return;
        }

        let post = &incoming.post;
        info!(
            "Received image request from {} in channel {}: {}",
            incoming.sender_name, post.channel_id, post.message
        );

        if let Err(e) = self.reply(post).await {
            report_failure(self.backend.as_ref(), post, &e).await;
        }
    }
}
