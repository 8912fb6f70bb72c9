use std::error::Error as StdError;
use std::fmt::Write;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Mattermost API error ({status}): {message}")]
    MattermostApi { status: StatusCode, message: String },

    #[error("Unexpected Mattermost response: {0}")]
    MattermostResponse(String),

    #[error("OpenAI API error ({status}): {message}")]
    OpenAiApi { status: StatusCode, message: String },

    #[error("OpenAI response error: {0}")]
    OpenAiResponse(String),

    #[error("Completion stream error: {0}")]
    Stream(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<tokio_tungstenite::tungstenite::Error> for BotError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BotError::WebSocket(Box::new(err))
    }
}

impl BotError {
    /// Returns the diagnostic posted to the channel when a reply fails.
    ///
    /// Every variant already renders its direct source, so the chain starts
    /// one level below it.
    pub fn diagnostic(&self) -> String {
        let mut detail = self.to_string();
        let mut source = self.source().and_then(|cause| cause.source());
        while let Some(cause) = source {
            let _ = write!(detail, "\ncaused by: {cause}");
            source = cause.source();
        }
        format!("Exception occurred.\n```\n{detail}\n```")
    }

    /// True when the failure came from the model provider rather than Mattermost.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            BotError::OpenAiApi { .. } | BotError::OpenAiResponse(_) | BotError::Stream(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
