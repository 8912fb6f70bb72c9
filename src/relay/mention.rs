//! Decides whether a thread addresses the bot.

use log::debug;

use crate::types::Thread;

/// Senders whose name starts with this are other bots; replying to them
/// would start a loop.
pub const RESERVED_BOT_PREFIX: &str = "ai-";

/// Returns true when some post in `thread` contains `@bot_username` as a
/// whole whitespace-delimited word.
pub fn should_reply(thread: &Thread, sender_name: &str, bot_username: &str) -> bool {
    if sender_name.starts_with(RESERVED_BOT_PREFIX) {
        debug!("Ignoring post from bot account {sender_name}");
        return false;
    }

    let token = format!("@{bot_username}");
    thread.iter().any(|post| contains_token(&post.message, &token))
}

fn contains_token(text: &str, token: &str) -> bool {
    text.split_whitespace().any(|word| word == token)
}
