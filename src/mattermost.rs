//! Mattermost REST and WebSocket plumbing.

mod client;
mod events;
mod websocket;

pub use client::MattermostClient;
pub use events::parse_posted;
pub use websocket::{MattermostSocket, WebSocketEvent, WebSocketSignal};
