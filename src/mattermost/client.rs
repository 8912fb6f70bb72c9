//! REST v4 client for the calls the bots need.

use async_trait::async_trait;
use log::debug;
use reqwest::{
    Client, Response,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::backend::MessagingBackend;
use crate::config::MattermostConfig;
use crate::error::{BotError, Result};
use crate::media::image_filename;
use crate::types::{BotIdentity, Post, PostHandle, Thread};

#[derive(Debug, Serialize)]
struct CreatePost<'a> {
    channel_id: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "is_root")]
    root_id: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    file_ids: Vec<String>,
}

fn is_root(root_id: &&str) -> bool {
    root_id.is_empty()
}

#[derive(Debug, Serialize)]
struct UpdatePost<'a> {
    id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    header: String,
}

#[derive(Debug, Deserialize)]
struct FileUpload {
    file_infos: Vec<FileInfo>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    id: String,
}

pub struct MattermostClient {
    client: Client,
    base_url: String,
    token: String,
}

impl MattermostClient {
    pub fn new(config: &MattermostConfig) -> Result<Self> {
        let base_url = config.api_url()?.as_str().trim_end_matches('/').to_string();
        debug!("Mattermost API base: {base_url}");
        Ok(Self {
            client: Client::new(),
            base_url,
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Post> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// The account the bot token belongs to.
    pub async fn get_me(&self) -> Result<BotIdentity> {
        self.get("users/me").await
    }

    async fn upload_image(&self, channel_id: &str, image: Vec<u8>) -> Result<String> {
        let part = Part::bytes(image)
            .file_name(image_filename())
            .mime_str(mime::IMAGE_JPEG.as_ref())?;
        let form = Form::new()
            .text("channel_id", channel_id.to_string())
            .part("files", part);

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let upload: FileUpload = ensure_success(response).await?.json().await?;

        upload
            .file_infos
            .into_iter()
            .next()
            .map(|info| info.id)
            .ok_or_else(|| BotError::MattermostResponse("File upload returned no file info".into()))
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
    Err(BotError::MattermostApi { status, message })
}

#[async_trait]
impl MessagingBackend for MattermostClient {
    async fn fetch_thread(&self, post_id: &str) -> Result<Thread> {
        self.get(&format!("posts/{post_id}/thread")).await
    }

    async fn create_reply(&self, original: &Post, text: &str) -> Result<PostHandle> {
        let created = self
            .post_json(
                "posts",
                &CreatePost {
                    channel_id: &original.channel_id,
                    message: text,
                    root_id: original.thread_root(),
                    file_ids: Vec::new(),
                },
            )
            .await?;
        debug!("Created reply {} in thread {}", created.id, original.thread_root());
        Ok(PostHandle { id: created.id })
    }

    async fn edit_message(&self, handle: &PostHandle, text: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("posts/{}", handle.id)))
            .bearer_auth(&self.token)
            .json(&UpdatePost {
                id: &handle.id,
                message: text,
            })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn post_image_reply(
        &self,
        original: &Post,
        caption: &str,
        image: Vec<u8>,
    ) -> Result<()> {
        let file_id = self.upload_image(&original.channel_id, image).await?;
        self.post_json(
            "posts",
            &CreatePost {
                channel_id: &original.channel_id,
                message: caption,
                root_id: original.thread_root(),
                file_ids: vec![file_id],
            },
        )
        .await?;
        Ok(())
    }

    async fn create_post(&self, channel_id: &str, text: &str) -> Result<()> {
        self.post_json(
            "posts",
            &CreatePost {
                channel_id,
                message: text,
                root_id: "",
                file_ids: Vec::new(),
            },
        )
        .await?;
        Ok(())
    }

    async fn get_channel_prompt(&self, channel_id: &str) -> Result<String> {
        let channel: Channel = self.get(&format!("channels/{channel_id}")).await?;
        Ok(channel.header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_payload_targets_thread_root() -> Result<()> {
        let original = Post {
            id: "p2".to_string(),
            channel_id: "c1".to_string(),
            root_id: "p1".to_string(),
            ..Post::default()
        };
        let json = serde_json::to_value(CreatePost {
            channel_id: &original.channel_id,
            message: "",
            root_id: original.thread_root(),
            file_ids: Vec::new(),
        })?;
        assert_eq!(json["root_id"], "p1");
        assert_eq!(json["message"], "");
        assert!(json.get("file_ids").is_none());
        Ok(())
    }

    #[test]
    fn channel_post_has_no_root() -> Result<()> {
        let json = serde_json::to_value(CreatePost {
            channel_id: "c1",
            message: "Exception occurred.",
            root_id: "",
            file_ids: Vec::new(),
        })?;
        assert!(json.get("root_id").is_none());
        Ok(())
    }

    #[test]
    fn channel_header_defaults_to_empty() -> Result<()> {
        let channel: Channel = serde_json::from_str(r#"{"id":"c1","name":"town-square"}"#)?;
        assert_eq!(channel.header, "");
        Ok(())
    }

    #[test]
    fn urls_join_api_path() -> Result<()> {
        let client = MattermostClient::new(&MattermostConfig {
            host: "chat.example.com".to_string(),
            port: 8065,
            api_path: "/api/v4".to_string(),
            scheme: "http".to_string(),
            token: "tok".to_string(),
        })?;
        assert_eq!(
            client.url("posts/p1/thread"),
            "http://chat.example.com:8065/api/v4/posts/p1/thread"
        );
        Ok(())
    }
}
