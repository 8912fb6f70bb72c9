//! Collaborator seams between the reply controllers and the outside world.
//!
//! The Mattermost and OpenAI clients implement these; tests swap in recording
//! mocks.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::openai::Message;
use crate::types::{GeneratedImage, Post, PostHandle, StreamEvent, Thread, TypingTarget};

/// Lazy, forward-only completion output.
pub type CompletionStream = BoxStream<'static, Result<StreamEvent>>;

#[async_trait]
pub trait MessagingBackend: Send + Sync {
    async fn fetch_thread(&self, post_id: &str) -> Result<Thread>;

    /// Posts `text` in the thread of `original`.
    async fn create_reply(&self, original: &Post, text: &str) -> Result<PostHandle>;

    async fn edit_message(&self, handle: &PostHandle, text: &str) -> Result<()>;

    /// Uploads `image` as a JPEG and posts it in the thread of `original`.
    async fn post_image_reply(&self, original: &Post, caption: &str, image: Vec<u8>)
    -> Result<()>;

    /// Posts at channel level, outside any thread.
    async fn create_post(&self, channel_id: &str, text: &str) -> Result<()>;

    /// The channel header, used as the system prompt.
    async fn get_channel_prompt(&self, channel_id: &str) -> Result<String>;
}

#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn stream_completion(&self, messages: Vec<Message>, model: &str)
    -> Result<CompletionStream>;

    async fn generate_image(&self, prompt: &str, model: &str) -> Result<GeneratedImage>;
}

/// Opens side connections used only for "typing" signals.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    async fn open(&self) -> Result<Box<dyn SignalConnection>>;
}

#[async_trait]
pub trait SignalConnection: Send {
    async fn authenticate(&mut self, token: &str) -> Result<()>;

    async fn send_typing(&mut self, target: &TypingTarget) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
