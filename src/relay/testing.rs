//! Recording collaborators for the relay tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use reqwest::StatusCode;
use tokio::time::{self, Instant};

use crate::backend::{
    CompletionApi, CompletionStream, MessagingBackend, SignalChannel, SignalConnection,
};
use crate::error::{BotError, Result};
use crate::openai::{Message, parse_event_data};
use crate::types::{GeneratedImage, Post, PostHandle, StreamEvent, Thread, TypingTarget};

pub const REPLY_ID: &str = "reply-1";

/// Round trip of every mocked completion call.
pub const API_LATENCY: Duration = Duration::from_millis(50);

fn backend_error(message: &str) -> BotError {
    BotError::MattermostApi {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct EditRecord {
    pub text: String,
    pub at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateReply { root: String, text: String },
    ImageReply { root: String, caption: String, image: Vec<u8> },
    ChannelPost { channel_id: String, text: String },
}

#[derive(Default)]
pub struct MockBackend {
    thread: Option<Thread>,
    prompt: Option<String>,
    calls: Mutex<Vec<BackendCall>>,
    edits: Mutex<Vec<EditRecord>>,
}

impl MockBackend {
    /// Empty thread and empty channel prompt.
    pub fn new() -> Self {
        Self {
            thread: Some(Thread::default()),
            prompt: Some(String::new()),
            ..Self::default()
        }
    }

    pub fn with_thread(mut self, thread: Thread) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    pub fn failing_thread(mut self) -> Self {
        self.thread = None;
        self
    }

    pub fn failing_prompt(mut self) -> Self {
        self.prompt = None;
        self
    }

    pub fn edits(&self) -> Vec<EditRecord> {
        self.edits.lock().expect("edits lock").clone()
    }

    pub fn edit_texts(&self) -> Vec<String> {
        self.edits().into_iter().map(|edit| edit.text).collect()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn channel_posts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::ChannelPost { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

#[async_trait]
impl MessagingBackend for MockBackend {
    async fn fetch_thread(&self, _post_id: &str) -> Result<Thread> {
        self.thread
            .clone()
            .ok_or_else(|| backend_error("thread unavailable"))
    }

    async fn create_reply(&self, original: &Post, text: &str) -> Result<PostHandle> {
        self.record(BackendCall::CreateReply {
            root: original.thread_root().to_string(),
            text: text.to_string(),
        });
        Ok(PostHandle {
            id: REPLY_ID.to_string(),
        })
    }

    async fn edit_message(&self, _handle: &PostHandle, text: &str) -> Result<()> {
        self.edits.lock().expect("edits lock").push(EditRecord {
            text: text.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn post_image_reply(
        &self,
        original: &Post,
        caption: &str,
        image: Vec<u8>,
    ) -> Result<()> {
        self.record(BackendCall::ImageReply {
            root: original.thread_root().to_string(),
            caption: caption.to_string(),
            image,
        });
        Ok(())
    }

    async fn create_post(&self, channel_id: &str, text: &str) -> Result<()> {
        self.record(BackendCall::ChannelPost {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn get_channel_prompt(&self, _channel_id: &str) -> Result<String> {
        self.prompt
            .clone()
            .ok_or_else(|| backend_error("channel unavailable"))
    }
}

/// One step of a scripted completion stream, emitted after `delay_ms`.
#[derive(Debug, Clone)]
pub enum Script {
    Fragment { delay_ms: u64, text: String },
    End { delay_ms: u64 },
    Fail { delay_ms: u64, message: String },
    /// Raw SSE `data` payload, parsed the way the OpenAI client parses it.
    Chunk { delay_ms: u64, data: String },
}

impl Script {
    pub fn fragment(delay_ms: u64, text: &str) -> Self {
        Script::Fragment {
            delay_ms,
            text: text.to_string(),
        }
    }

    pub fn end(delay_ms: u64) -> Self {
        Script::End { delay_ms }
    }

    pub fn fail(delay_ms: u64, message: &str) -> Self {
        Script::Fail {
            delay_ms,
            message: message.to_string(),
        }
    }

    pub fn chunk(delay_ms: u64, data: &str) -> Self {
        Script::Chunk {
            delay_ms,
            data: data.to_string(),
        }
    }
}

pub fn scripted_stream(script: Vec<Script>) -> CompletionStream {
    let items = stream::iter(script).then(|step| async move {
        let (delay_ms, item) = match step {
            Script::Fragment { delay_ms, text } => {
                (delay_ms, Some(Ok(StreamEvent::Fragment(text))))
            }
            Script::End { delay_ms } => (delay_ms, Some(Ok(StreamEvent::End))),
            Script::Fail { delay_ms, message } => {
                (delay_ms, Some(Err(BotError::Stream(message))))
            }
            Script::Chunk { delay_ms, data } => (delay_ms, parse_event_data(&data).transpose()),
        };
        time::sleep(Duration::from_millis(delay_ms)).await;
        item
    });
    Box::pin(items.filter_map(future::ready))
}

#[derive(Default)]
pub struct MockCompletions {
    script: Mutex<Option<Vec<Script>>>,
    image: Option<(Vec<u8>, String)>,
    requests: Mutex<Vec<Vec<Message>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletions {
    pub fn streaming(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            ..Self::default()
        }
    }

    pub fn image(bytes: Vec<u8>, revised_prompt: &str) -> Self {
        Self {
            image: Some((bytes, revised_prompt.to_string())),
            ..Self::default()
        }
    }

    /// Every call fails with a 401 after [`API_LATENCY`].
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

fn unauthorized() -> BotError {
    BotError::OpenAiApi {
        status: StatusCode::UNAUTHORIZED,
        message: "invalid api key".to_string(),
    }
}

#[async_trait]
impl CompletionApi for MockCompletions {
    async fn stream_completion(
        &self,
        messages: Vec<Message>,
        _model: &str,
    ) -> Result<CompletionStream> {
        self.requests.lock().expect("requests lock").push(messages);
        time::sleep(API_LATENCY).await;
        let script = self.script.lock().expect("script lock").take();
        script.map(scripted_stream).ok_or_else(unauthorized)
    }

    async fn generate_image(&self, prompt: &str, _model: &str) -> Result<GeneratedImage> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        time::sleep(API_LATENCY).await;
        self.image
            .clone()
            .map(|(bytes, revised_prompt)| GeneratedImage {
                bytes,
                revised_prompt,
            })
            .ok_or_else(unauthorized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    Opened,
    Authenticated(String),
    Typing(TypingTarget),
    Closed,
}

/// Signal channel that records what its connections do.
#[derive(Default)]
pub struct RecordingSignal {
    events: Arc<Mutex<Vec<SignalEvent>>>,
    fail_open: bool,
    fail_send_after: Option<usize>,
    stall_close: bool,
}

impl RecordingSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_open() -> Arc<Self> {
        Arc::new(Self {
            fail_open: true,
            ..Self::default()
        })
    }

    /// Connections accept `sends` typing signals, then fail.
    pub fn failing_send_after(sends: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_send_after: Some(sends),
            ..Self::default()
        })
    }

    /// Connections never finish closing.
    pub fn stalling_close() -> Arc<Self> {
        Arc::new(Self {
            stall_close: true,
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<SignalEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

#[async_trait]
impl SignalChannel for RecordingSignal {
    async fn open(&self) -> Result<Box<dyn SignalConnection>> {
        if self.fail_open {
            return Err(backend_error("websocket refused"));
        }
        self.events
            .lock()
            .expect("events lock")
            .push(SignalEvent::Opened);
        Ok(Box::new(RecordingConnection {
            events: Arc::clone(&self.events),
            sends: 0,
            fail_send_after: self.fail_send_after,
            stall_close: self.stall_close,
        }))
    }
}

struct RecordingConnection {
    events: Arc<Mutex<Vec<SignalEvent>>>,
    sends: usize,
    fail_send_after: Option<usize>,
    stall_close: bool,
}

impl RecordingConnection {
    fn push(&self, event: SignalEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

#[async_trait]
impl SignalConnection for RecordingConnection {
    async fn authenticate(&mut self, token: &str) -> Result<()> {
        self.push(SignalEvent::Authenticated(token.to_string()));
        Ok(())
    }

    async fn send_typing(&mut self, target: &TypingTarget) -> Result<()> {
        if self.fail_send_after.is_some_and(|limit| self.sends >= limit) {
            return Err(backend_error("websocket closed"));
        }
        self.sends += 1;
        self.push(SignalEvent::Typing(target.clone()));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.stall_close {
            std::future::pending::<()>().await;
        }
        self.push(SignalEvent::Closed);
        Ok(())
    }
}
