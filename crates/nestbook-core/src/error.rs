//! Error types module
//!
//! Two families live here. `ValidationError` describes why a single candidate
//! file (or a batch) was refused before any transfer starts; those errors are
//! collected and shown to the user as a list, never propagated past the
//! validation boundary. `AppError` covers configuration and local I/O failures
//! at the edges of the client.
//!
//! Transfer failures belong to the API client crate and implement the same
//! `ErrorMetadata` trait.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like a failed transfer
    Warn,
    /// Error level - for unexpected failures
    Error,
}

impl LogLevel {
    /// Emit `message` through `tracing` at this level.
    pub fn log(self, code: &'static str, message: &str) {
        match self {
            LogLevel::Debug => tracing::debug!(error_code = code, "{}", message),
            LogLevel::Warn => tracing::warn!(error_code = code, "{}", message),
            LogLevel::Error => tracing::error!(error_code = code, "{}", message),
        }
    }
}

/// Metadata describing how an error should be presented to the user.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "FILE_TOO_LARGE")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation can succeed
    fn is_recoverable(&self) -> bool;

    /// Message suitable for a transient notification
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;

    /// Log the error with its code at its own level.
    fn report(&self) {
        self.log_level()
            .log(self.error_code(), &self.client_message());
    }
}

/// Reason a candidate file (or a batch of them) was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{file_name}: file size exceeds maximum allowed size of {}", format_size_limit(.max))]
    FileTooLarge {
        file_name: String,
        size: usize,
        max: usize,
    },

    #[error("{file_name}: file type not allowed. Allowed types: {allowed}")]
    TypeNotAllowed {
        file_name: String,
        content_type: String,
        allowed: String,
    },

    #[error("Maximum {max} files allowed; {dropped} file(s) were not added")]
    TooManyFiles { max: usize, dropped: usize },

    #[error("Only one file can be uploaded at a time ({count} selected)")]
    MultipleFilesInSingleMode { count: usize },
}

impl ValidationError {
    /// Name of the offending file, when the error concerns a single file.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            ValidationError::FileTooLarge { file_name, .. }
            | ValidationError::TypeNotAllowed { file_name, .. } => Some(file_name),
            ValidationError::TooManyFiles { .. }
            | ValidationError::MultipleFilesInSingleMode { .. } => None,
        }
    }
}

impl ErrorMetadata for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            ValidationError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ValidationError::TypeNotAllowed { .. } => "FILE_TYPE_NOT_ALLOWED",
            ValidationError::TooManyFiles { .. } => "TOO_MANY_FILES",
            ValidationError::MultipleFilesInSingleMode { .. } => "SINGLE_UPLOAD_ONLY",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn client_message(&self) -> String {
        self.to_string()
    }

    fn log_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

/// Human-readable size limit: whole megabytes when possible, bytes otherwise.
fn format_size_limit(max: &usize) -> String {
    const MB: usize = 1024 * 1024;
    if *max >= MB && max % MB == 0 {
        format!("{} MB", max / MB)
    } else {
        format!("{} bytes", max)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Io(_) => "IO_ERROR",
            AppError::InternalWithSource { .. } => "INTERNAL_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, AppError::Io(_))
    }

    fn client_message(&self) -> String {
        match self {
            AppError::InternalWithSource { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            AppError::InvalidInput(_) => LogLevel::Debug,
            AppError::Io(_) => LogLevel::Warn,
            AppError::Config(_) | AppError::InternalWithSource { .. } => LogLevel::Error,
        }
    }
}
