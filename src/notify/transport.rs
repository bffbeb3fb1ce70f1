//! Outbound HTTP seam shared by every dispatcher.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Per-request ceiling for every outbound call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A JSON POST with its headers
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl OutboundRequest {
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST the request body as JSON. Non-2xx responses are errors; a
    /// non-JSON success body is returned as a string value.
    async fn post_json(&self, request: OutboundRequest) -> Result<Value, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, request: OutboundRequest) -> Result<Value, TransportError> {
        debug!("POST {}", request.url);
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("json"))
            .unwrap_or(false);
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        if is_json {
            Ok(serde_json::from_str(&text)?)
        } else {
            Ok(Value::String(text))
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&OutboundRequest) -> Result<Value, TransportError> + Send + Sync>;

    /// Records every request and answers through a closure
    pub struct RecordingTransport {
        requests: Mutex<Vec<OutboundRequest>>,
        responder: Responder,
    }

    impl RecordingTransport {
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&OutboundRequest) -> Result<Value, TransportError> + Send + Sync + 'static,
        {
            Self {
                requests: Mutex::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        pub fn ok() -> Self {
            Self::new(|_| Ok(Value::Null))
        }

        pub fn requests(&self) -> Vec<OutboundRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn urls(&self) -> Vec<String> {
            self.requests().into_iter().map(|r| r.url).collect()
        }
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn post_json(&self, request: OutboundRequest) -> Result<Value, TransportError> {
            let response = (self.responder)(&request);
            self.requests.lock().unwrap().push(request);
            response
        }
    }
}
