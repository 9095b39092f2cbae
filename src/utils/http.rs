// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::Result;
use crate::models::PortalConfig;

/// Status code and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal GET transport used by the session manager and fetcher.
///
/// `Err` means the request never produced a response (connect, timeout,
/// body read); any HTTP status is returned as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpReply>;
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &PortalConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpReply> {
        let response = reqwest::Client::get(self, url)
            .headers(headers.clone())
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_success_range() {
        assert!(HttpReply::new(200, "").is_success());
        assert!(HttpReply::new(204, "").is_success());
        assert!(!HttpReply::new(401, "").is_success());
        assert!(!HttpReply::new(503, "").is_success());
    }

    #[test]
    fn test_create_client_from_default_config() {
        assert!(create_async_client(&PortalConfig::default()).is_ok());
    }
}
