//! Renders a completion stream into a single edited post.

use std::time::Duration;

use futures::StreamExt;
use log::debug;
use tokio::time::Instant;

use crate::backend::{CompletionStream, MessagingBackend};
use crate::error::Result;
use crate::types::{PostHandle, StreamEvent};

/// Appended to intermediate snapshots while the model is still writing.
pub const CURSOR: char = '▌';

/// Minimum spacing between intermediate edits.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Text received so far plus the time of the last intermediate edit.
#[derive(Debug)]
pub struct RenderBuffer {
    content: String,
    last_flush: Instant,
}

impl RenderBuffer {
    pub fn new(started: Instant) -> Self {
        Self {
            content: String::new(),
            last_flush: started,
        }
    }

    pub fn push(&mut self, fragment: &str) {
        self.content.push_str(fragment);
    }

    /// Returns the cursor-suffixed snapshot when a flush is due at `now`,
    /// and records `now` as the last flush.
    pub fn take_snapshot(&mut self, now: Instant) -> Option<String> {
        if now.duration_since(self.last_flush) < FLUSH_INTERVAL {
            return None;
        }
        self.last_flush = now;
        let mut snapshot = String::with_capacity(self.content.len() + CURSOR.len_utf8());
        snapshot.push_str(&self.content);
        snapshot.push(CURSOR);
        Some(snapshot)
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

/// Drains `stream` into the post behind `reply` and returns the final text.
///
/// Intermediate edits happen at most once per second. The final edit, with
/// no cursor, happens exactly once when the stream ends. A stream or edit
/// error aborts without the final edit, leaving the last snapshot visible.
pub async fn render_stream(
    backend: &dyn MessagingBackend,
    reply: &PostHandle,
    mut stream: CompletionStream,
) -> Result<String> {
    let mut buffer = RenderBuffer::new(Instant::now());
    let mut flushes = 0_usize;

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Fragment(fragment) => {
                buffer.push(&fragment);
                if let Some(snapshot) = buffer.take_snapshot(Instant::now()) {
                    backend.edit_message(reply, &snapshot).await?;
                    flushes += 1;
                }
            }
            StreamEvent::End => break,
        }
    }

    let content = buffer.into_content();
    backend.edit_message(reply, &content).await?;
    debug!(
        "Rendered {} characters into post {} after {flushes} intermediate edits",
        content.chars().count(),
        reply.id
    );
    Ok(content)
}
