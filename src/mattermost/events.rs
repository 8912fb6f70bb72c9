//! Decoding of `posted` WebSocket events.

use serde::Deserialize;

use crate::error::Result;
use crate::types::{IncomingPost, Post};

use super::websocket::WebSocketEvent;

/// `data` of a `posted` event. Mattermost double-encodes `post` and
/// `mentions` as JSON strings.
#[derive(Debug, Deserialize)]
struct PostedData {
    post: String,
    #[serde(default)]
    sender_name: String,
    #[serde(default)]
    channel_type: String,
    #[serde(default)]
    mentions: Option<String>,
}

/// Returns the new post carried by a `posted` event, or `None` for any other
/// event type.
pub fn parse_posted(event: &WebSocketEvent) -> Result<Option<IncomingPost>> {
    if event.event != "posted" {
        return Ok(None);
    }

    let data: PostedData = serde_json::from_value(event.data.clone())?;
    let post: Post = serde_json::from_str(&data.post)?;
    let mentions = match data.mentions.as_deref() {
        Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
        _ => Vec::new(),
    };

    Ok(Some(IncomingPost {
        post,
        sender_name: data.sender_name.trim_start_matches('@').to_string(),
        channel_type: data.channel_type,
        mentions,
    }))
}
