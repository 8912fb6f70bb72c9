pub mod backend;
pub mod bot;
pub mod config;
pub mod error;
pub mod mattermost;
pub mod media;
pub mod openai;
pub mod relay;
pub mod types;

pub use bot::{BotKind, run};
