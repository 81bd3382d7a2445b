//! Text document loading
//!
//! Reads a UTF-8 text resource from disk into a [`Document`]. Markdown and
//! plain text are treated identically; the detected type is recorded as
//! metadata for traceability.

use std::path::Path;

use askdoc_core::{Document, RagError, Result};

/// Supported source file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    PlainText,
    Markdown,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" | "text" => Self::PlainText,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlainText => write!(f, "text"),
            Self::Markdown => write!(f, "markdown"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Loader for UTF-8 text files
#[derive(Debug, Clone, Default)]
pub struct TextLoader;

impl TextLoader {
    /// Create a new loader
    pub fn new() -> Self {
        Self
    }

    /// Load a document from a file path
    ///
    /// Fails with [`RagError::SourceNotFound`] when the file is missing or
    /// unreadable (including invalid UTF-8).
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| RagError::SourceNotFound {
            path: path.display().to_string(),
            source: e,
        })?;

        tracing::info!(
            source = %path.display(),
            bytes = content.len(),
            "document loaded"
        );

        let mut document = Document::new(path.display().to_string(), content)
            .with_metadata("file_type", FileType::from_path(path).to_string());

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            document = document.with_metadata("file_name", name);
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_text_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "Hello from a test document.").unwrap();

        let doc = TextLoader::new().load(file.path()).unwrap();

        assert_eq!(doc.content, "Hello from a test document.");
        assert_eq!(doc.metadata.get("file_type"), Some(&"text".to_string()));
        assert_eq!(doc.source, file.path().display().to_string());
    }

    #[test]
    fn test_load_missing_file() {
        let err = TextLoader::new()
            .load("does/not/exist.txt")
            .unwrap_err();

        assert!(matches!(err, RagError::SourceNotFound { .. }));
        assert!(err.to_string().contains("does/not/exist.txt"));
    }

    #[test]
    fn test_load_empty_file_is_not_an_error() {
        let file = tempfile::NamedTempFile::with_suffix(".md").unwrap();

        let doc = TextLoader::new().load(file.path()).unwrap();

        assert!(doc.content.is_empty());
        assert_eq!(doc.metadata.get("file_type"), Some(&"markdown".to_string()));
    }

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_extension("txt"), FileType::PlainText);
        assert_eq!(FileType::from_extension("MD"), FileType::Markdown);
        assert_eq!(FileType::from_extension("pdf"), FileType::Unknown);
    }
}
