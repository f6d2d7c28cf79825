//! HTTP transport seam.
//!
//! The executor talks to upstream APIs through [`HttpTransport`] so the
//! challenge/pay/retry cycle can be exercised without sockets. The shipped
//! implementation wraps `reqwest::Client`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PayError;

/// A request about to be sent upstream. Cloneable so the executor can
/// resend it with the payment header attached.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl WireRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// POST with a JSON body and `Content-Type` set.
    pub fn post_json<T: Serialize>(url: impl Into<String>, body: &T) -> Result<Self, PayError> {
        let bytes = serde_json::to_vec(body)?;
        Ok(Self::new("POST", url)
            .header("content-type", "application/json")
            .body(bytes))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, bytes: Vec<u8>) -> Self {
        self.body = Some(bytes);
        self
    }
}

/// A response as seen by the engine: status, headers, body bytes.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl WireResponse {
    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PayError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Boundary contract for the HTTP collaborator.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse, PayError>;
}

/// `reqwest`-backed transport with a configured timeout.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: std::time::Duration) -> Result<Self, PayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client, keeping its settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &WireRequest) -> Result<WireResponse, PayError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| PayError::Config(format!("invalid method: {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| PayError::Transport(format!("request failed: {e}")))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| PayError::Transport(format!("failed to read body: {e}")))?
            .to_vec();

        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}
