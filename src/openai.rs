use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use eventsource_stream::Eventsource;
use futures::{StreamExt, future};
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::{CompletionApi, CompletionStream};
use crate::config::{ImageStyle, OpenAiConfig, Provider};
use crate::error::{BotError, Result};
use crate::types::{GeneratedImage, MessageRole, StreamEvent};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Terminal SSE payload sent by both providers.
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

/// Error object the provider sends in place of a chunk when generation
/// fails after the response has started.
#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    response_format: &'static str,
    style: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

pub struct OpenAiClient {
    api_key: String,
    client: Client,
    provider: Provider,
    image_style: ImageStyle,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(proxy) = &config.proxy {
            debug!("Routing OpenAI traffic through proxy {proxy}");
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            api_key: config.api_key.clone(),
            client: builder.build()?,
            provider: config.provider.clone(),
            image_style: config.image_style,
        })
    }

    /// Resolves `operation` (e.g. `chat/completions`) for the configured provider.
    fn endpoint(&self, operation: &str, model: &str) -> Result<Url> {
        match &self.provider {
            Provider::OpenAi => Ok(Url::parse(&format!("{OPENAI_API_BASE}/{operation}"))?),
            Provider::Azure {
                service,
                api_version,
            } => {
                let mut url = Url::parse(&format!(
                    "https://{service}.openai.azure.com/openai/deployments/{model}/{operation}"
                ))?;
                url.query_pairs_mut().append_pair("api-version", api_version);
                Ok(url)
            }
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.provider {
            Provider::OpenAi => request.bearer_auth(&self.api_key),
            Provider::Azure { .. } => request.header("api-key", &self.api_key),
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("Failed to read error response: {e}"));
    Err(BotError::OpenAiApi { status, message })
}

/// Maps one SSE `data` payload onto the stream protocol.
///
/// Chunks without text (role preambles, content-filter results, empty
/// choices) yield `None`. An `error` object ends the stream with an error.
pub(crate) fn parse_event_data(data: &str) -> Result<Option<StreamEvent>> {
    if data.trim() == DONE_SENTINEL {
        return Ok(Some(StreamEvent::End));
    }

    let chunk: ChatChunk = serde_json::from_str(data)?;
    if let Some(error) = chunk.error {
        return Err(BotError::Stream(match error.kind {
            Some(kind) => format!("{kind}: {}", error.message),
            None => error.message,
        }));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(StreamEvent::Fragment))
}

fn decode_image_response(response: ImageResponse) -> Result<GeneratedImage> {
    let image = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| BotError::OpenAiResponse("No image in response".to_string()))?;

    let encoded = image
        .b64_json
        .ok_or_else(|| BotError::OpenAiResponse("Image response has no b64_json".to_string()))?;

    Ok(GeneratedImage {
        bytes: STANDARD.decode(encoded.trim())?,
        revised_prompt: image.revised_prompt.unwrap_or_default(),
    })
}

#[async_trait]
impl CompletionApi for OpenAiClient {
    async fn stream_completion(
        &self,
        messages: Vec<Message>,
        model: &str,
    ) -> Result<CompletionStream> {
        debug!(
            "Sending streaming request to OpenAI API with {} messages",
            messages.len()
        );

        let request = ChatRequest {
            model,
            messages: &messages,
            stream: true,
        };

        let url = self.endpoint("chat/completions", model)?;
        let response = self
            .authorized(self.client.post(url))
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| {
                future::ready(match event {
                    Ok(event) => parse_event_data(&event.data).transpose(),
                    Err(e) => Some(Err(BotError::Stream(e.to_string()))),
                })
            });

        Ok(Box::pin(stream))
    }

    async fn generate_image(&self, prompt: &str, model: &str) -> Result<GeneratedImage> {
        debug!("Sending image request to OpenAI API: '{prompt}'");

        let request = ImageRequest {
            model,
            prompt,
            n: 1,
            response_format: "b64_json",
            style: self.image_style.to_string(),
        };

        let url = self.endpoint("images/generations", model)?;
        let response = self
            .authorized(self.client.post(url))
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let image = decode_image_response(response.json().await?)?;
        debug!("Received {} image bytes from OpenAI API", image.bytes.len());
        Ok(image)
    }
}
