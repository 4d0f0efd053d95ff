use nestbook_core::UploadProgressEvent;

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// One progress row, e.g. `[1] villa.jpg  42%`.
pub fn progress_line(event: &UploadProgressEvent, name_width: usize) -> String {
    format!(
        "[{}] {:<width$} {:>3}%",
        event.index,
        truncate_string(&event.file_name, name_width),
        event.percent,
        width = name_width
    )
}


/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
