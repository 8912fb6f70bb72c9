//! Common types used throughout the mattergpt bots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Role of a message in the conversation.
///
/// Maps to OpenAI chat-completion message roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from a human in the thread
    User,
    /// Message previously written by the bot
    Assistant,
    /// Channel prompt
    System,
}

/// A Mattermost post as returned by the REST API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    /// Empty for posts that start a thread.
    #[serde(default)]
    pub root_id: String,
    #[serde(default)]
    pub message: String,
}

impl Post {
    /// Id of the thread this post belongs to; a root post is its own thread.
    pub fn thread_root(&self) -> &str {
        if self.root_id.is_empty() {
            &self.id
        } else {
            &self.root_id
        }
    }
}

/// One conversation branch as returned by `GET /posts/{id}/thread`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thread {
    pub order: Vec<String>,
    pub posts: HashMap<String, Post>,
}

impl Thread {
    /// Posts in thread order, skipping ids missing from the map.
    pub fn iter(&self) -> impl Iterator<Item = &Post> {
        self.order.iter().filter_map(|id| self.posts.get(id))
    }
}

/// A `posted` event delivered over the WebSocket.
#[derive(Debug, Clone)]
pub struct IncomingPost {
    pub post: Post,
    /// Author's username without the leading `@`.
    pub sender_name: String,
    /// `O`, `P`, `D` or `G`.
    pub channel_type: String,
    /// User ids mentioned by the post.
    pub mentions: Vec<String>,
}

impl IncomingPost {
    pub fn is_direct_message(&self) -> bool {
        self.channel_type == "D"
    }

    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions.iter().any(|id| id == user_id)
    }
}

/// The bot's own account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
}

impl BotIdentity {
    /// The literal `@username` token other users type to address the bot.
    pub fn mention_token(&self) -> String {
        format!("@{}", self.username)
    }
}

/// Identifies a post the bot created and may edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostHandle {
    pub id: String,
}

/// Where the "typing" signal is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingTarget {
    pub channel_id: String,
    /// Thread root; empty when typing at channel level.
    pub parent_id: String,
}

impl TypingTarget {
    pub fn for_post(post: &Post) -> Self {
        Self {
            channel_id: post.channel_id.clone(),
            parent_id: post.root_id.clone(),
        }
    }
}

/// One item of a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    End,
}

/// Output of the image-generation endpoint.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Raw bytes as delivered by the model, usually PNG.
    pub bytes: Vec<u8>,
    pub revised_prompt: String,
}
