//! Nestbook Core Library
//!
//! This crate provides the domain models, error types, configuration, upload
//! validation and local preview handles shared by the Nestbook client crates.
//! Nothing in here performs network I/O.

pub mod config;
pub mod error;
pub mod models;
pub mod preview;
pub mod validation;

// Re-export commonly used types
pub use config::ClientConfig;
pub use error::{AppError, ErrorMetadata, LogLevel, ValidationError};
pub use models::{
    guess_content_type, CandidateFile, Folder, UploadMode, UploadProgressEvent, UploadResult,
    UploadRules,
};
pub use preview::{PreviewGuard, PreviewHandle, PreviewStore};
pub use validation::{validate, validate_batch, BatchValidation, ValidationOutcome};
