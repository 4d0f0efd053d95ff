use std::path::{Component, Path};

use bytes::Bytes;

use crate::error::AppError;

/// A file selected for upload: name, declared MIME type and contents.
///
/// The declared type may be empty or wrong (browsers and file pickers do not
/// always know it), which is why validation falls back to the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read a local file. The content type is guessed from the extension and
    /// left empty when the extension is unknown.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(AppError::InvalidInput(format!(
                "Path must not contain '..': {}",
                path.display()
            )));
        }

        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let content_type = guess_content_type(&name).unwrap_or_default().to_string();

        tracing::debug!(
            file_name = %name,
            content_type = %content_type,
            size = data.len(),
            "Loaded candidate file"
        );

        Ok(Self::new(name, content_type, data))
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Lowercase extension without the dot; empty when the name has none.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }

    /// Declared type with parameters stripped, lowercased.
    pub fn normalized_content_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .map(|s| s.trim())
            .unwrap_or("")
            .to_lowercase()
    }

    pub fn is_image(&self) -> bool {
        self.normalized_content_type().starts_with("image/")
    }
}

pub(crate) fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}

/// Map a file name's extension to its usual MIME type.
pub fn guess_content_type(name: &str) -> Option<&'static str> {
    let content_type = match extension_of(name).as_str() {
        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        // Documents
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "csv" => "text/csv",
        _ => return None,
    };
    Some(content_type)
}
