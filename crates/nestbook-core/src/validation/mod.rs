//! Upload validation
//!
//! `validate` checks one file; `validate_batch` applies it to a selection and
//! then enforces the per-widget count rules. Both are pure.

use crate::error::ValidationError;
use crate::models::{CandidateFile, UploadMode, UploadRules};

/// Result of validating a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(CandidateFile),
    Rejected(ValidationError),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }
}

/// Files that passed validation plus one message per problem, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchValidation {
    pub valid_files: Vec<CandidateFile>,
    pub errors: Vec<String>,
}

/// Validate one file against `rules`.
///
/// Size is checked first. The declared MIME type is the primary signal; the
/// extension is only consulted when the MIME type is missing or not allowed.
pub fn validate(file: CandidateFile, rules: &UploadRules) -> ValidationOutcome {
    if file.size() > rules.max_file_size {
        return ValidationOutcome::Rejected(ValidationError::FileTooLarge {
            file_name: file.name.clone(),
            size: file.size(),
            max: rules.max_file_size,
        });
    }

    let content_type = file.normalized_content_type();
    if !content_type.is_empty() && rules.allowed_content_types.contains(&content_type) {
        return ValidationOutcome::Valid(file);
    }

    let extension = file.extension();
    if !extension.is_empty() && rules.allowed_extensions.contains(&extension) {
        tracing::debug!(
            file_name = %file.name,
            content_type = %file.content_type,
            extension = %extension,
            "Accepted file by extension"
        );
        return ValidationOutcome::Valid(file);
    }

    ValidationOutcome::Rejected(ValidationError::TypeNotAllowed {
        file_name: file.name.clone(),
        content_type: file.content_type.clone(),
        allowed: rules.allowed_extensions.join(", "),
    })
}

/// Validate a selection of files for a widget in `mode`.
///
/// In single mode only the first valid file is kept and the rest are dropped
/// without an error unless `rules.strict_single` is set. In multiple mode a
/// selection over `rules.max_files` is cut to the limit and one error is
/// added for the whole overflow.
pub fn validate_batch(
    files: Vec<CandidateFile>,
    rules: &UploadRules,
    mode: UploadMode,
) -> BatchValidation {
    let mut batch = BatchValidation::default();

    for file in files {
        match validate(file, rules) {
            ValidationOutcome::Valid(file) => batch.valid_files.push(file),
            ValidationOutcome::Rejected(reason) => batch.errors.push(reason.to_string()),
        }
    }

    match mode {
        UploadMode::Single if batch.valid_files.len() > 1 => {
            let count = batch.valid_files.len();
            batch.valid_files.truncate(1);
            if rules.strict_single {
                batch
                    .errors
                    .push(ValidationError::MultipleFilesInSingleMode { count }.to_string());
            }
        }
        UploadMode::Multiple if batch.valid_files.len() > rules.max_files => {
            let dropped = batch.valid_files.len() - rules.max_files;
            batch.valid_files.truncate(rules.max_files);
            batch.errors.push(
                ValidationError::TooManyFiles {
                    max: rules.max_files,
                    dropped,
                }
                .to_string(),
            );
        }
        _ => {}
    }

    if !batch.errors.is_empty() {
        tracing::debug!(
            valid = batch.valid_files.len(),
            rejected = batch.errors.len(),
            "Batch validation reported errors"
        );
    }

    batch
}
