use std::future::Future;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use agora_types::api::{
    ChannelListResponse, ErrorBody, MessagePage, SendMessageRequest, ToggleReactionRequest,
    ToggleReactionResponse, UploadResponse,
};
use agora_types::models::{Channel, Message, StreamId};

use crate::config::SyncConfig;
use crate::error::ClientError;

/// A file picked by the user but not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// The server operations the synchronization client depends on.
pub trait ChatApi: Send + Sync + 'static {
    fn list_channels(&self) -> impl Future<Output = Result<Vec<Channel>, ClientError>> + Send;

    fn list_messages(
        &self,
        stream: StreamId,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = Result<MessagePage, ClientError>> + Send;

    fn send_message(
        &self,
        stream: StreamId,
        req: SendMessageRequest,
    ) -> impl Future<Output = Result<Message, ClientError>> + Send;

    fn toggle_reaction(
        &self,
        message_id: Uuid,
        emoji: String,
    ) -> impl Future<Output = Result<ToggleReactionResponse, ClientError>> + Send;

    fn upload(&self, file: StagedFile) -> impl Future<Output = Result<UploadResponse, ClientError>> + Send;
}

/// REST path of a stream's message collection.
pub fn messages_path(stream: StreamId) -> String {
    match stream {
        StreamId::Channel(id) => format!("/channels/{id}/messages"),
        StreamId::Thread(id) => format!("/threads/{id}/messages"),
    }
}

/// [`ChatApi`] over the server's HTTP surface.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    config: SyncConfig,
}

impl HttpApi {
    pub fn new(config: SyncConfig) -> Result<Self, ClientError> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.config.token)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    Err(ClientError::from_status(status.as_u16(), message))
}

impl ChatApi for HttpApi {
    async fn list_channels(&self) -> Result<Vec<Channel>, ClientError> {
        let resp = self
            .authed(self.client.get(self.config.url("/channels")))
            .send()
            .await?;
        let body: ChannelListResponse = decode(resp).await?;
        Ok(body.channels)
    }

    async fn list_messages(&self, stream: StreamId, page: u32, limit: u32) -> Result<MessagePage, ClientError> {
        let resp = self
            .authed(self.client.get(self.config.url(&messages_path(stream))))
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await?;
        decode(resp).await
    }

    async fn send_message(&self, stream: StreamId, req: SendMessageRequest) -> Result<Message, ClientError> {
        let resp = self
            .authed(self.client.post(self.config.url(&messages_path(stream))))
            .json(&req)
            .send()
            .await?;
        decode(resp).await
    }

    async fn toggle_reaction(&self, message_id: Uuid, emoji: String) -> Result<ToggleReactionResponse, ClientError> {
        let resp = self
            .authed(self.client.post(self.config.url("/reactions")))
            .json(&ToggleReactionRequest { message_id, emoji })
            .send()
            .await?;
        decode(resp).await
    }

    async fn upload(&self, file: StagedFile) -> Result<UploadResponse, ClientError> {
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .authed(self.client.post(self.config.url("/upload")))
            .multipart(form)
            .timeout(self.config.upload_timeout)
            .send()
            .await?;
        decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_paths() {
        let id = Uuid::nil();
        assert_eq!(
            messages_path(StreamId::Channel(id)),
            format!("/channels/{id}/messages")
        );
        assert_eq!(
            messages_path(StreamId::Thread(id)),
            format!("/threads/{id}/messages")
        );
    }
}
