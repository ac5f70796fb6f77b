// SPDX-License-Identifier: Apache-2.0

//! HTTP transport seam for platform chat adapters, so bot-API calls can
//! be faked in tests without a real network (same shape as the session
//! crate's `SessionAdapter` abstracting over the `tmux` binary).

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn post_json(&self, url: &str, body: serde_json::Value) -> Result<serde_json::Value, HttpError>;

    async fn post_multipart(
        &self,
        url: &str,
        field_name: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<serde_json::Value, HttpError>;
}

/// Test double that records the URL of every call and returns a
/// canned response instead of touching the network.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeHttpTransport {
    response: serde_json::Value,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeHttpTransport {
    pub fn new() -> Self {
        Self {
            response: serde_json::json!({"id": "fake-1", "result": {"message_id": 1, "message_thread_id": 1}, "messages": [{"id": "fake-1"}]}),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl HttpTransport for FakeHttpTransport {
    async fn post_json(&self, _url: &str, _body: serde_json::Value) -> Result<serde_json::Value, HttpError> {
        Ok(self.response.clone())
    }

    async fn post_multipart(
        &self,
        _url: &str,
        _field_name: &str,
        _filename: &str,
        _data: Vec<u8>,
    ) -> Result<serde_json::Value, HttpError> {
        Ok(self.response.clone())
    }
}
