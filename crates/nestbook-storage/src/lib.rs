//! Nestbook Storage References
//!
//! Asset references reach the client in many shapes: bundled paths, third
//! party URLs, direct object-storage URLs (sometimes concatenated twice by
//! upstream data), and bare storage keys. This crate classifies a reference
//! and rewrites storage references to the backend image proxy so the browser
//! never fetches from the storage origin directly.
//!
//! # Proxy URL format
//!
//! `{api_url}/api/{version}{image_proxy_path}/{key}` where `key` is
//! percent-encoded as a single path segment (`/` becomes `%2F`).

pub mod keys;
pub mod reference;

// Re-export commonly used types
pub use keys::{encode_key, extract_key, proxy_url};
pub use reference::{classify, clean_reference, ReferenceRewriter, ResolvedReference, SourceClass};
