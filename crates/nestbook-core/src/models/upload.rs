use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Target classification sent as the `folder` field of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Folder(String);

impl Folder {
    pub const PHOTOS: &'static str = "photos";
    pub const DOCUMENTS: &'static str = "documents";
    pub const PROFILE_PICS: &'static str = "profile-pics";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn photos() -> Self {
        Self::new(Self::PHOTOS)
    }

    pub fn documents() -> Self {
        Self::new(Self::DOCUMENTS)
    }

    pub fn profile_pics() -> Self {
        Self::new(Self::PROFILE_PICS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Folder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Whether a widget accepts one file or a list of files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Single,
    #[default]
    Multiple,
}

/// Size, type and count limits applied before any transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRules {
    pub max_file_size: usize,
    /// Lowercase MIME types, checked first.
    pub allowed_content_types: Vec<String>,
    /// Lowercase extensions without the dot, checked when the MIME type is not allowed.
    pub allowed_extensions: Vec<String>,
    pub max_files: usize,
    /// Report an error instead of silently keeping the first file in single mode.
    pub strict_single: bool,
}

impl UploadRules {
    pub fn new(
        max_file_size: usize,
        allowed_content_types: Vec<String>,
        allowed_extensions: Vec<String>,
        max_files: usize,
    ) -> Self {
        Self {
            max_file_size,
            allowed_content_types,
            allowed_extensions,
            max_files,
            strict_single: false,
        }
    }

    /// Photos: common web image formats up to 5 MB, ten per batch.
    pub fn images() -> Self {
        Self::new(
            5 * 1024 * 1024,
            to_strings(&["image/jpeg", "image/png", "image/gif", "image/webp"]),
            to_strings(&["jpg", "jpeg", "png", "gif", "webp"]),
            10,
        )
    }

    /// Documents: PDFs and office files up to 10 MB, five per batch.
    pub fn documents() -> Self {
        Self::new(
            10 * 1024 * 1024,
            to_strings(&[
                "application/pdf",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ]),
            to_strings(&["pdf", "doc", "docx"]),
            5,
        )
    }

    /// Preset matching a folder. Profile pictures are single images up to 2 MB.
    pub fn for_folder(folder: &Folder) -> Self {
        match folder.as_str() {
            Folder::DOCUMENTS => Self::documents(),
            Folder::PROFILE_PICS => Self {
                max_file_size: 2 * 1024 * 1024,
                max_files: 1,
                ..Self::images()
            },
            _ => Self::images(),
        }
    }

    pub fn with_strict_single(mut self, strict: bool) -> Self {
        self.strict_single = strict;
        self
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Progress of one in-flight file within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressEvent {
    /// Position of the file in the batch passed by the caller.
    pub index: usize,
    pub file_name: String,
    /// 0..=100; 100 is only sent once the server accepted the file.
    pub percent: u8,
}

/// A file stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub key: String,
    pub url: String,
    pub file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_presets() {
        let rules = UploadRules::for_folder(&Folder::profile_pics());
        assert_eq!(rules.max_files, 1);
        assert_eq!(rules.max_file_size, 2 * 1024 * 1024);
        assert!(rules.allowed_extensions.contains(&"png".to_string()));

        let rules = UploadRules::for_folder(&Folder::documents());
        assert!(rules.allowed_extensions.contains(&"pdf".to_string()));

        let rules = UploadRules::for_folder(&Folder::new("amenities"));
        assert_eq!(rules, UploadRules::images());
    }

    #[test]
    fn upload_result_uses_wire_names() {
        let result = UploadResult {
            key: "photos/a.jpg".to_string(),
            url: "https://cdn.example.com/photos/a.jpg".to_string(),
            file_name: "a.jpg".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["fileName"], "a.jpg");
    }
}
