//! Conversation context building from Mattermost threads.

use log::warn;

use crate::openai::Message;
use crate::types::{BotIdentity, MessageRole, Thread};

/// Converts a thread into the message list sent to the completion API.
///
/// The channel prompt always comes first. Posts by the bot become
/// `assistant` turns verbatim; everyone else's become `user` turns with the
/// bot's mention token removed. Nothing is truncated.
pub fn build_prompt_messages(
    thread: &Thread,
    bot: &BotIdentity,
    system_prompt: &str,
) -> Vec<Message> {
    let mention = bot.mention_token();
    let mut messages = Vec::with_capacity(thread.order.len() + 1);
    messages.push(Message::new(MessageRole::System, system_prompt));

    for post_id in &thread.order {
        let Some(post) = thread.posts.get(post_id) else {
            warn!("Thread lists post {post_id} without its content, skipping");
            continue;
        };

        let message = if post.user_id == bot.id {
            Message::new(MessageRole::Assistant, post.message.clone())
        } else {
            Message::new(MessageRole::User, post.message.replace(&mention, ""))
        };
        messages.push(message);
    }

    messages
}
