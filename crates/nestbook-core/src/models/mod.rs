//! Domain models for the asset pipeline

pub mod file;
pub mod upload;

pub use file::{guess_content_type, CandidateFile};
pub use upload::{Folder, UploadMode, UploadProgressEvent, UploadResult, UploadRules};
