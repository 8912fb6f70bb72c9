//! Reply controller for the chat bot.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::backend::{CompletionApi, MessagingBackend};
use crate::error::Result;
use crate::openai::Message;
use crate::types::{BotIdentity, IncomingPost, Post, Thread, TypingTarget};

use super::context::build_prompt_messages;
use super::mention::should_reply;
use super::render::render_stream;
use super::typing::TypingIndicator;
use super::{ReplyController, report_failure};

/// Answers any thread that mentions the bot by streaming a completion into
/// one reply post.
pub struct ChatRelay {
    backend: Arc<dyn MessagingBackend>,
    completions: Arc<dyn CompletionApi>,
    indicator: TypingIndicator,
    identity: BotIdentity,
    model: String,
}

impl ChatRelay {
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

    async fn reply(&self, post: &Post, thread: &Thread) -> Result<()> {
        let system_prompt = self.backend.get_channel_prompt(&post.channel_id).await?;
        let messages = build_prompt_messages(thread, &self.identity, &system_prompt);
        info!("API request: {}", serde_json::to_string(&messages)?);

        let session = self.indicator.start(TypingTarget::for_post(post));
        let result = self.stream_reply(post, messages).await;
        session.stop().await;

        let content = result?;
        info!("API response: {content}");
        Ok(())
    }

    async fn stream_reply(&self, post: &Post, messages: Vec<Message>) -> Result<String> {
        let stream = self
            .completions
            .stream_completion(messages, &self.model)
            .await?;
        let reply = self.backend.create_reply(post, "").await?;
        render_stream(self.backend.as_ref(), &reply, stream).await
    }
}

#[async_trait]
impl ReplyController for ChatRelay {
    async fn handle(&self, incoming: IncomingPost) {
        let post = &incoming.post;
        if post.user_id == self.identity.id {
            return;
        }

        // Only the whole thread tells whether the bot was addressed, so a
        // failed fetch cannot be reported anywhere.
        let thread = match self.backend.fetch_thread(&post.id).await {
            Ok(thread) => thread,
            Err(e) => {
                warn!("Failed to fetch thread for post {}: {e}", post.id);
                return;
            }
        };

        if !should_reply(&thread, &incoming.sender_name, &self.identity.username) {
            debug!("Post {} does not address the bot", post.id);
            return;
        }

        info!(
            "Received message from {} in channel {}: {}",
            incoming.sender_name, post.channel_id, post.message
        );

        if let Err(e) = self.reply(post, &thread).await {
            report_failure(self.backend.as_ref(), post, &e).await;
        }
    }
}
