use std::future::Future;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use murmur_types::api::{
    DeleteConversationResponse, ErrorResponse, MarkReadRequest, MarkReadResponse,
    SendMessageRequest, UnreadResponse,
};
use murmur_types::{Conversation, Message, UserId};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Durable request/response path to the Message Store.
pub trait MessageApi: Send + Sync + 'static {
    /// Most recent `limit` messages with `with`, oldest first.
    fn history(
        &self,
        with: &UserId,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Message>, ClientError>> + Send;

    fn conversations(&self) -> impl Future<Output = Result<Vec<Conversation>, ClientError>> + Send;

    fn send(
        &self,
        receiver: &UserId,
        content: &str,
    ) -> impl Future<Output = Result<Message, ClientError>> + Send;

    fn mark_read(&self, sender: &UserId) -> impl Future<Output = Result<u64, ClientError>> + Send;

    fn delete_conversation(
        &self,
        with: &UserId,
    ) -> impl Future<Output = Result<u64, ClientError>> + Send;

    fn unread_total(&self) -> impl Future<Output = Result<u64, ClientError>> + Send;
}

/// `reqwest` implementation of [`MessageApi`] against the `/messages` routes.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let res = req.bearer_auth(&self.token).send().await?;
        decode(res).await
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.json::<T>().await?);
    }

    // Error bodies are {"message": ...}; fall back to the status text
    let message = match res.json::<ErrorResponse>().await {
        Ok(body) => body.message,
        Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
    };
    debug!("REST call failed with {}: {}", status, message);
    Err(ClientError::from_status(status.as_u16(), message))
}

impl MessageApi for RestClient {
    async fn history(&self, with: &UserId, limit: u32) -> Result<Vec<Message>, ClientError> {
        let limit = limit.to_string();
        let req = self
            .http
            .get(self.url("/messages"))
            .query(&[("conversationWith", with.as_str()), ("limit", limit.as_str())]);
        self.execute(req).await
    }

    async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.execute(self.http.get(self.url("/messages"))).await
    }

    async fn send(&self, receiver: &UserId, content: &str) -> Result<Message, ClientError> {
        let body = SendMessageRequest {
            receiver_id: receiver.to_string(),
            content: content.to_string(),
        };
        self.execute(self.http.post(self.url("/messages")).json(&body))
            .await
    }

    async fn mark_read(&self, sender: &UserId) -> Result<u64, ClientError> {
        let body = MarkReadRequest {
            sender_id: sender.to_string(),
        };
        let res: MarkReadResponse = self
            .execute(self.http.post(self.url("/messages/read")).json(&body))
            .await?;
        Ok(res.updated)
    }

    async fn delete_conversation(&self, with: &UserId) -> Result<u64, ClientError> {
        let req = self
            .http
            .delete(self.url("/messages/delete"))
            .query(&[("conversationWith", with.as_str())]);
        let res: DeleteConversationResponse = self.execute(req).await?;
        Ok(res.deleted_count)
    }

    async fn unread_total(&self) -> Result<u64, ClientError> {
        let res: UnreadResponse = self.execute(self.http.get(self.url("/messages/unread"))).await?;
        Ok(res.unread)
    }
}
