//! Transfer errors
//!
//! Anything that goes wrong while talking to the backend. The message shown to
//! the user is the server's own message when it sent one, otherwise a generic
//! "Upload failed".

use std::time::Duration;

use nestbook_core::{ErrorMetadata, LogLevel};

/// Message used when the server gave no usable explanation.
pub const GENERIC_UPLOAD_FAILURE: &str = "Upload failed";

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// 2xx response whose body reported `success: false`.
    #[error("{message}")]
    Server { message: String },

    /// Non-2xx response.
    #[error("{message} (HTTP {status})")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("An upload is already in progress")]
    Busy,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransferError {
    /// Best available message for a notification.
    pub fn message(&self) -> String {
        match self {
            TransferError::Server { message } | TransferError::Http { message, .. } => {
                message.clone()
            }
            TransferError::Network(_) | TransferError::InvalidResponse(_) => {
                GENERIC_UPLOAD_FAILURE.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ErrorMetadata for TransferError {
    fn error_code(&self) -> &'static str {
        match self {
            TransferError::Server { .. } => "SERVER_REJECTED",
            TransferError::Http { .. } => "HTTP_ERROR",
            TransferError::Network(_) => "NETWORK_ERROR",
            TransferError::Timeout(_) => "TIMEOUT",
            TransferError::Cancelled => "CANCELLED",
            TransferError::Busy => "BUSY",
            TransferError::InvalidResponse(_) => "INVALID_RESPONSE",
            TransferError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            TransferError::Network(_) | TransferError::Timeout(_) | TransferError::Busy => true,
            TransferError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    fn client_message(&self) -> String {
        self.message()
    }

    fn log_level(&self) -> LogLevel {
        match self {
            TransferError::Cancelled | TransferError::Busy => LogLevel::Debug,
            TransferError::Server { .. }
            | TransferError::Http { .. }
            | TransferError::Timeout(_)
            | TransferError::Network(_) => LogLevel::Warn,
            TransferError::InvalidResponse(_) | TransferError::InvalidRequest(_) => LogLevel::Error,
        }
    }
}
