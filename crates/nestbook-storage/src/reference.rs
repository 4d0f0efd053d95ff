//! Source classification and URL rewriting.
//!
//! Storage detection is a plain substring match on the configured storage
//! host. Upstream data sometimes carries URLs glued onto another URL, so a
//! strict parser would reject references that `clean_reference` can repair.

use std::fmt::{Display, Formatter, Result as FmtResult};

use nestbook_core::ClientConfig;
use serde::Serialize;

use crate::keys::{extract_key, proxy_url};

/// The four kinds of asset reference. Every string is exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    /// Served by the application itself, e.g. `/images/placeholder.png`.
    LocalPath,
    /// Absolute URL on some other origin; used as is.
    ForeignUrl,
    /// Absolute URL on the storage host; rewritten to the proxy.
    StorageUrl,
    /// Anything else is treated as a raw storage key.
    StorageKey,
}

impl SourceClass {
    pub fn is_storage(self) -> bool {
        matches!(self, SourceClass::StorageUrl | SourceClass::StorageKey)
    }
}

impl Display for SourceClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SourceClass::LocalPath => write!(f, "local_path"),
            SourceClass::ForeignUrl => write!(f, "foreign_url"),
            SourceClass::StorageUrl => write!(f, "storage_url"),
            SourceClass::StorageKey => write!(f, "storage_key"),
        }
    }
}

fn contains_host(lower: &str, storage_host: &str) -> bool {
    !storage_host.is_empty() && lower.contains(storage_host)
}

/// Classify `reference`. `storage_host` must be lowercase.
pub fn classify(reference: &str, storage_host: &str) -> SourceClass {
    let lower = reference.to_ascii_lowercase();
    if lower.starts_with('/') {
        SourceClass::LocalPath
    } else if lower.starts_with("http") {
        if contains_host(&lower, storage_host) {
            SourceClass::StorageUrl
        } else {
            SourceClass::ForeignUrl
        }
    } else {
        SourceClass::StorageKey
    }
}

/// Repair a reference that has a storage URL glued onto something else.
///
/// Keeps the suffix starting at the last `http://` or `https://` that precedes
/// the last occurrence of the storage host. References without the storage
/// host, or without a scheme before it, are returned unchanged. Applying the
/// function twice gives the same result as applying it once.
pub fn clean_reference(reference: &str, storage_host: &str) -> String {
    let lower = reference.to_ascii_lowercase();
    let host_at = match lower.rfind(storage_host) {
        Some(at) if !storage_host.is_empty() => at,
        _ => return reference.to_string(),
    };

    let before_host = &lower[..host_at];
    let scheme_at = [before_host.rfind("https://"), before_host.rfind("http://")]
        .into_iter()
        .flatten()
        .max();

    match scheme_at {
        Some(0) | None => reference.to_string(),
        Some(start) => {
            tracing::debug!(
                reference = %reference,
                cleaned = %&reference[start..],
                "Repaired concatenated storage reference"
            );
            reference[start..].to_string()
        }
    }
}

/// Outcome of resolving one reference, for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedReference {
    pub class: SourceClass,
    pub url: String,
}

/// Rewrites asset references into URLs the client can fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRewriter {
    storage_host: String,
    proxy_base: String,
}

impl ReferenceRewriter {
    pub fn new(storage_host: impl Into<String>, proxy_base: impl Into<String>) -> Self {
        Self {
            storage_host: storage_host.into().trim().to_ascii_lowercase(),
            proxy_base: proxy_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.storage_host.clone(), config.image_proxy_base())
    }

    pub fn storage_host(&self) -> &str {
        &self.storage_host
    }

    pub fn proxy_base(&self) -> &str {
        &self.proxy_base
    }

    pub fn classify(&self, reference: &str) -> SourceClass {
        classify(reference, &self.storage_host)
    }

    pub fn clean_reference(&self, reference: &str) -> String {
        clean_reference(reference, &self.storage_host)
    }

    /// Clean, classify and rewrite `reference`.
    pub fn resolve(&self, reference: &str) -> ResolvedReference {
        let cleaned = self.clean_reference(reference);
        let class = self.classify(&cleaned);
        let url = match class {
            SourceClass::LocalPath | SourceClass::ForeignUrl => cleaned,
            SourceClass::StorageUrl => {
                proxy_url(&self.proxy_base, &extract_key(&cleaned, &self.storage_host))
            }
            SourceClass::StorageKey => proxy_url(&self.proxy_base, &cleaned),
        };
        ResolvedReference { class, url }
    }

    /// Fetchable URL for `reference`.
    pub fn resolve_url(&self, reference: &str) -> String {
        self.resolve(reference).url
    }
}
