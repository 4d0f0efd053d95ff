//! Shared HTTP client for the Nestbook backend.
//!
//! Provides a minimal client with optional auth (Bearer token or X-API-Key),
//! the upload orchestrator that drives the multipart upload endpoint, and the
//! image resolution state machine that loads assets through the image proxy.
//! The CLI uses this client directly.

pub mod api;
pub mod error;
pub mod image;
pub mod progress;
pub mod upload;

use std::time::Duration;

use anyhow::{Context, Result};
use nestbook_core::ClientConfig;
use nestbook_storage::ReferenceRewriter;
use reqwest::{Client, Url};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Authentication strategy for the API.
#[derive(Clone, Debug)]
pub enum Auth {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// `X-API-Key: {key}`
    XApiKey(String),
}

/// HTTP client for the Nestbook API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
    auth: Option<Auth>,
}

impl ApiClient {
    /// No overall request timeout is set on the HTTP client; transfers and
    /// image loads apply their own configurable timeouts.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        let auth = config.api_token.clone().map(Auth::Bearer);

        Ok(Self {
            client,
            config: ClientConfig {
                api_url: config.api_url.trim_end_matches('/').to_string(),
                ..config
            },
            auth,
        })
    }

    /// Create client from environment (see `ClientConfig::from_env`).
    pub fn from_env() -> Result<Self> {
        let config = ClientConfig::from_env().context("Invalid client configuration")?;
        Self::new(config)
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.api_url
    }

    /// Absolute URL for `path`. Absolute inputs are returned as is.
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.config.api_url, path)
        }
    }

    /// Reference rewriter pointing at this backend's image proxy.
    pub fn rewriter(&self) -> ReferenceRewriter {
        ReferenceRewriter::from_config(&self.config)
    }

    /// Whether `url` (relative or absolute) points at this backend's origin.
    /// Credentials are only ever attached to such URLs.
    pub fn is_api_origin(&self, url: &str) -> bool {
        let absolute = self.build_url(url);
        match (Url::parse(&absolute), Url::parse(&self.config.api_url)) {
            (Ok(target), Ok(api)) => target.origin() == api.origin(),
            _ => false,
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some(Auth::Bearer(token)) => {
                request.header("Authorization", format!("Bearer {}", token))
            }
            Some(Auth::XApiKey(key)) => request.header("X-API-Key", key.as_str()),
            None => request,
        }
    }

    /// Raw client for custom requests. Caller must apply auth via build_url and headers.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

// Re-export the main entry points for convenience.
pub use error::TransferError;
pub use image::{
    AssetReference, AssetView, ImageLoader, NoHooks, Phase, ResolutionHooks, ResolutionMachine,
    ResolutionState, Transition,
};
pub use progress::{FileProgress, ProgressSink};
pub use upload::{
    upload_many, upload_one, TransferOptions, UploadOrchestrator, UploadState, UploadTransport,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_joins_relative_paths() {
        let client = ApiClient::new(ClientConfig {
            api_url: "http://localhost:3000/".to_string(),
            ..ClientConfig::default()
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(
            client.build_url("/images/placeholder.png"),
            "http://localhost:3000/images/placeholder.png"
        );
        assert_eq!(
            client.build_url("https://cdn.example.com/a.jpg"),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn api_origin_excludes_foreign_hosts() {
        let client = ApiClient::new(ClientConfig {
            api_url: "https://api.nestbook.test".to_string(),
            ..ClientConfig::default()
        })
        .unwrap();
        assert!(client.is_api_origin("/images/placeholder.png"));
        assert!(client.is_api_origin("https://api.nestbook.test/api/v0/images/proxy/k"));
        assert!(!client.is_api_origin("https://cdn.example.com/a.jpg"));
        assert!(!client.is_api_origin("http://api.nestbook.test/a.jpg"));
        assert!(!client.is_api_origin("https://api.nestbook.test.evil.com/a.jpg"));
    }

    #[test]
    fn token_becomes_bearer_auth() {
        let client = ApiClient::new(ClientConfig {
            api_token: Some("secret".to_string()),
            ..ClientConfig::default()
        })
        .unwrap();
        assert!(matches!(client.auth, Some(Auth::Bearer(ref t)) if t == "secret"));
    }
}
