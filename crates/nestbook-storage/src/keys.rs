//! Storage key extraction and proxy URL construction.

/// Extract the object key from a direct storage URL.
///
/// The key is everything after the first `/` that follows the last occurrence
/// of `storage_host`, without query string or fragment, percent-decoded when
/// the encoding is valid. Returns an empty key when the URL has no path.
pub fn extract_key(storage_url: &str, storage_host: &str) -> String {
    let lower = storage_url.to_ascii_lowercase();
    let after_host = match lower.rfind(storage_host) {
        Some(at) if !storage_host.is_empty() => &storage_url[at + storage_host.len()..],
        _ => storage_url,
    };

    let path = match after_host.find('/') {
        Some(slash) => &after_host[slash + 1..],
        None => "",
    };
    let path = path.split(['?', '#']).next().unwrap_or("");

    let decoded = urlencoding::decode(path)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| path.to_string());

    decoded.trim_start_matches('/').to_string()
}

/// Percent-encode a key so it travels as one path segment.
pub fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

/// Proxy URL serving `key` from the application's own origin.
pub fn proxy_url(proxy_base: &str, key: &str) -> String {
    format!("{}/{}", proxy_base.trim_end_matches('/'), encode_key(key))
}
