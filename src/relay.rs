//! Reply controllers that relay Mattermost posts to the model and back.

mod chat;
mod context;
mod image;
mod mention;
mod render;
mod typing;

#[cfg(test)]
mod testing;

use async_trait::async_trait;
use log::error;

use crate::backend::MessagingBackend;
use crate::error::BotError;
use crate::types::{IncomingPost, Post};

pub use chat::ChatRelay;
pub use context::build_prompt_messages;
pub use image::ImageRelay;
pub use mention::{RESERVED_BOT_PREFIX, should_reply};
pub use render::{CURSOR, RenderBuffer, render_stream};
pub use typing::{TypingIndicator, TypingSession};

/// Entry point invoked once per inbound post.
///
/// Implementations never fail: errors end up as a diagnostic post.
#[async_trait]
pub trait ReplyController: Send + Sync {
    async fn handle(&self, incoming: IncomingPost);
}

/// Logs `err` and posts its diagnostic to the channel of `post`.
async fn report_failure(backend: &dyn MessagingBackend, post: &Post, err: &BotError) {
    let origin = if err.is_upstream() {
        "OpenAI"
    } else {
        "Mattermost"
    };
    error!(
        "Reply to post {} in channel {} failed ({origin}): {err}",
        post.id, post.channel_id
    );

    if let Err(e) = backend
        .create_post(&post.channel_id, &err.diagnostic())
        .await
    {
        error!(
            "Failed to post diagnostic to channel {}: {e}",
            post.channel_id
        );
    }
}
