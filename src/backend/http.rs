//! HTTP implementation of [`ChatBackend`]

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::retry::RetryPolicy;
use super::types::{
    ChatReply, ChatRequest, ClearHistoryReply, ClearHistoryRequest, ConversationsReply,
    HealthStatus,
};
use super::ChatBackend;
use crate::config::BackendConfig;
use crate::error::BackendError;

/// reqwest-based client for the AI reply service
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One request/response exchange
    async fn exchange<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Backend request: {} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header("content-type", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(BackendError::BadStatus {
                code: status.as_u16(),
                detail: error_detail(&bytes),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| BackendError::MalformedResponse(e.to_string()))
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else if err.is_decode() {
            BackendError::MalformedResponse(err.to_string())
        } else {
            BackendError::Unreachable(err.to_string())
        }
    }

    async fn retried<T: DeserializeOwned>(
        &self,
        label: &str,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, BackendError> {
        self.retry
            .run(label, || self.exchange(method.clone(), path, body.as_ref()))
            .await
    }
}

/// Pull `detail` (FastAPI) or `error` out of an error body
fn error_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let field = value.get("detail").or_else(|| value.get("error"))?;
    match field {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn health(&self) -> Result<HealthStatus, BackendError> {
        self.exchange(Method::GET, "/health", None).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        let body = serde_json::to_value(request)
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;
        self.retried("chat", Method::POST, "/chat", Some(body)).await
    }

    async fn clear_history(&self, scope_id: &str) -> Result<ClearHistoryReply, BackendError> {
        let body = serde_json::to_value(ClearHistoryRequest {
            conversation_id: scope_id,
        })
        .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;
        self.retried("clear_history", Method::POST, "/clear_history", Some(body))
            .await
    }

    async fn list_conversations(&self) -> Result<BTreeMap<String, u64>, BackendError> {
        let reply: ConversationsReply = self
            .retried("list_conversations", Method::GET, "/conversations", None)
            .await?;
        Ok(reply.conversations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_extraction() {
        assert_eq!(
            error_detail(br#"{"detail": "message too long"}"#).as_deref(),
            Some("message too long")
        );
        assert_eq!(
            error_detail(br#"{"error": "no api key"}"#).as_deref(),
            Some("no api key")
        );
        assert!(error_detail(b"<html>502</html>").is_none());
        assert!(error_detail(br#"{"detail": null}"#).is_none());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpBackend::new(&BackendConfig {
            base_url: "http://localhost:1478/".into(),
            ..BackendConfig::default()
        })
        .unwrap();
        assert_eq!(backend.base_url(), "http://localhost:1478");
    }
}
