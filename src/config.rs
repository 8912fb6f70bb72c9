use std::env;

use log::{debug, error, info};
use strum::{Display, EnumString, VariantNames};
use url::Url;

use crate::error::{BotError, Result};

const DEFAULT_PORT: u16 = 443;
const DEFAULT_API_PATH: &str = "/api/v4";
const DEFAULT_SCHEME: &str = "https";
const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Rendering style requested from the image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, VariantNames, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ImageStyle {
    #[default]
    Vivid,
    Natural,
}

/// Which OpenAI deployment answers requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// api.openai.com, model named in the request body.
    OpenAi,
    /// `https://{service}.openai.azure.com`, model named by the deployment path.
    Azure { service: String, api_version: String },
}

#[derive(Debug, Clone)]
pub struct MattermostConfig {
    pub host: String,
    pub port: u16,
    pub api_path: String,
    pub scheme: String,
    pub token: String,
}

impl MattermostConfig {
    /// REST base, e.g. `https://chat.example.com:443/api/v4`.
    pub fn api_url(&self) -> Result<Url> {
        let raw = format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, self.api_path
        );
        Ok(Url::parse(&raw)?)
    }

    /// WebSocket endpoint; `wss` only when the REST scheme is `https`.
    pub fn websocket_url(&self) -> Result<Url> {
        let protocol = if self.scheme == "https" { "wss" } else { "ws" };
        let raw = format!(
            "{}://{}:{}{}/websocket",
            protocol, self.host, self.port, self.api_path
        );
        Ok(Url::parse(&raw)?)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub deployment: String,
    pub proxy: Option<String>,
    pub provider: Provider,
    pub image_style: ImageStyle,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mattermost: MattermostConfig,
    pub openai: OpenAiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        debug!("Loading configuration from environment");
        dotenvy::dotenv().ok();

        let host = env::var("MATTERMOST_URL").map_err(|e| {
            error!("Failed to load MATTERMOST_URL from environment: {e}");
            e
        })?;

        let token = env::var("BOT_TOKEN").map_err(|e| {
            error!("Failed to load BOT_TOKEN from environment: {e}");
            e
        })?;

        Self::from_lookup(host, token, |key| env::var(key).ok())
    }

    /// Builds the configuration from the two required values plus a lookup
    /// for the optional keys. Empty values count as unset.
    pub fn from_lookup<F>(host: String, token: String, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let port = match optional("MATTERMOST_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                BotError::Config(format!("MATTERMOST_PORT must be a port number, got '{raw}'"))
            })?,
            None => DEFAULT_PORT,
        };

        let scheme = optional("SCHEME").unwrap_or_else(|| DEFAULT_SCHEME.to_string());
        if scheme != "http" && scheme != "https" {
            return Err(BotError::Config(format!(
                "SCHEME must be 'http' or 'https', got '{scheme}'"
            )));
        }

        let mattermost = MattermostConfig {
            host: host
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            port,
            api_path: optional("MATTERMOST_API_PATH")
                .unwrap_or_else(|| DEFAULT_API_PATH.to_string()),
            scheme,
            token,
        };

        let provider = match optional("AZURE_OPENAI_SERVICE") {
            Some(service) => Provider::Azure {
                service,
                api_version: optional("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
            None => Provider::OpenAi,
        };

        let image_style = match optional("AZURE_OPENAI_IMAGE_STYLE") {
            Some(raw) => raw.parse::<ImageStyle>().map_err(|_| {
                BotError::Config(format!(
                    "Invalid image style '{}'. Supported: {}",
                    raw,
                    ImageStyle::VARIANTS.join(", ")
                ))
            })?,
            None => ImageStyle::default(),
        };

        let openai = OpenAiConfig {
            api_key: lookup("AZURE_OPENAI_API_KEY").unwrap_or_default(),
            deployment: lookup("AZURE_OPENAI_DEPLOYMENT").unwrap_or_default(),
            proxy: optional("AZURE_OPENAI_PROXY"),
            provider,
            image_style,
        };

        info!("Configuration loaded successfully");
        debug!(
            "Mattermost endpoint: {}://{}:{}{}",
            mattermost.scheme, mattermost.host, mattermost.port, mattermost.api_path
        );
        debug!("Bot token length: {} characters", mattermost.token.len());
        debug!("OpenAI API key length: {} characters", openai.api_key.len());
        debug!("OpenAI provider: {:?}", openai.provider);
        debug!("OpenAI deployment: {}", openai.deployment);

        Ok(Self { mattermost, openai })
    }
}
