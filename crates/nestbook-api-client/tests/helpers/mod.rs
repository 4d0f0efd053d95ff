#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

use nestbook_storage::ReferenceRewriter;

pub const STORAGE_HOST: &str = "amazonaws.com";
pub const PROXY_BASE: &str = "https://api.nestbook.test/api/v0/images/proxy";

/// Rewriter pointing at the test proxy.
pub fn test_rewriter() -> ReferenceRewriter {
    ReferenceRewriter::new(STORAGE_HOST, PROXY_BASE)
}
