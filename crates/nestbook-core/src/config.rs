//! Configuration module
//!
//! Client-side settings for the asset pipeline: where the backend lives, how
//! storage URLs are recognized, upload limits, and the optional timeouts and
//! concurrency bound for transfers. Values come from the environment (with
//! `.env` support) and fall back to the defaults below.

use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::UploadRules;

// Common constants
const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_API_VERSION: &str = "v0";
const DEFAULT_UPLOAD_PATH: &str = "/upload";
const DEFAULT_IMAGE_PROXY_PATH: &str = "/images/proxy";
const DEFAULT_STORAGE_HOST: &str = "amazonaws.com";
const MAX_FILE_SIZE_MB: usize = 5;
const MAX_FILES: usize = 10;
const DEFAULT_CONTENT_TYPES: &str = "image/jpeg,image/png,image/gif,image/webp";
const DEFAULT_EXTENSIONS: &str = "jpg,jpeg,png,gif,webp";

/// Client configuration for the upload and image pipeline.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_version: String,
    pub api_token: Option<String>,
    pub upload_path: String,
    pub image_proxy_path: String,
    /// Substring identifying direct object-storage URLs.
    pub storage_host: String,
    pub rules: UploadRules,
    /// `None` keeps transfers unbounded.
    pub upload_concurrency: Option<usize>,
    pub upload_timeout: Option<Duration>,
    pub image_load_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_token: None,
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            image_proxy_path: DEFAULT_IMAGE_PROXY_PATH.to_string(),
            storage_host: DEFAULT_STORAGE_HOST.to_string(),
            rules: UploadRules::new(
                MAX_FILE_SIZE_MB * 1024 * 1024,
                split_list(DEFAULT_CONTENT_TYPES),
                split_list(DEFAULT_EXTENSIONS),
                MAX_FILES,
            ),
            upload_concurrency: None,
            upload_timeout: None,
            image_load_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let api_url = env::var("NESTBOOK_API_URL")
            .or_else(|_| env::var("API_URL"))
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let max_file_size_mb = env::var("MAX_FILE_SIZE_MB")
            .unwrap_or_else(|_| MAX_FILE_SIZE_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_FILE_SIZE_MB);

        let max_files = env::var("MAX_FILES")
            .unwrap_or_else(|_| MAX_FILES.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_FILES);

        let allowed_content_types = split_list(
            &env::var("ALLOWED_CONTENT_TYPES").unwrap_or_else(|_| DEFAULT_CONTENT_TYPES.to_string()),
        );

        let allowed_extensions = split_list(
            &env::var("ALLOWED_EXTENSIONS").unwrap_or_else(|_| DEFAULT_EXTENSIONS.to_string()),
        );

        let config = ClientConfig {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_version: env::var("NESTBOOK_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
            api_token: env::var("NESTBOOK_API_KEY").ok().filter(|s| !s.is_empty()),
            upload_path: env::var("NESTBOOK_UPLOAD_PATH")
                .unwrap_or_else(|_| DEFAULT_UPLOAD_PATH.to_string()),
            image_proxy_path: env::var("NESTBOOK_IMAGE_PROXY_PATH")
                .unwrap_or_else(|_| DEFAULT_IMAGE_PROXY_PATH.to_string()),
            storage_host: env::var("STORAGE_HOST")
                .unwrap_or_else(|_| DEFAULT_STORAGE_HOST.to_string())
                .trim()
                .to_lowercase(),
            rules: UploadRules::new(
                megabytes(max_file_size_mb)?,
                allowed_content_types,
                allowed_extensions,
                max_files,
            ),
            upload_concurrency: env::var("UPLOAD_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok()),
            upload_timeout: env::var("UPLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            image_load_timeout: env::var("IMAGE_LOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "NESTBOOK_API_URL must be an http(s) URL, got '{}'",
                self.api_url
            ));
        }

        if self.storage_host.is_empty() {
            return Err(anyhow::anyhow!("STORAGE_HOST must not be empty"));
        }

        if self.rules.max_file_size == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }

        if self.rules.max_files == 0 {
            return Err(anyhow::anyhow!("MAX_FILES must be greater than 0"));
        }

        if self.upload_concurrency == Some(0) {
            return Err(anyhow::anyhow!(
                "UPLOAD_CONCURRENCY must be greater than 0 when set"
            ));
        }

        Ok(())
    }

    /// API version prefix (e.g. "/api/v0").
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }

    /// Absolute URL of the upload endpoint.
    pub fn upload_url(&self) -> String {
        format!("{}{}{}", self.api_url, self.api_prefix(), self.upload_path)
    }

    /// Absolute base of the image proxy; keys are appended as one path segment.
    pub fn image_proxy_base(&self) -> String {
        format!(
            "{}{}{}",
            self.api_url,
            self.api_prefix(),
            self.image_proxy_path.trim_end_matches('/')
        )
    }
}

/// Byte count for a MAX_FILE_SIZE_MB value.
fn megabytes(mb: usize) -> Result<usize, AppError> {
    mb.checked_mul(1024 * 1024).ok_or_else(|| {
        AppError::Config(format!("MAX_FILE_SIZE_MB is too large: {}", mb))
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
