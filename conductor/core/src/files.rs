//! File Handles
//!
//! A selected document, read once into memory so a retry can replay exactly
//! the same bytes without asking the user to pick the file again.

use std::path::Path;
use std::sync::Arc;

use crate::upload::UploadError;

/// Extensions the answering service knows how to ingest
pub const ACCEPTED_EXTENSIONS: &[&str] = &["txt", "pdf", "doc", "docx", "json"];

/// A document selected for upload
///
/// Cloning is cheap; clones share the same bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    content_type: String,
    bytes: Arc<Vec<u8>>,
}

impl FileHandle {
    /// Build a handle from in-memory bytes
    ///
    /// The content type is guessed from the name's extension.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            name,
            content_type,
            bytes: Arc::new(bytes.into()),
        }
    }

    /// Read a document from disk
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::UnsupportedType`] for extensions outside
    /// [`ACCEPTED_EXTENSIONS`] and [`UploadError::Read`] if the file cannot
    /// be read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !is_accepted(path) {
            return Err(UploadError::UnsupportedType { name });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self::from_bytes(name, bytes))
    }

    /// File name as shown to the user and sent to the service
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME type sent with the multipart part
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// File contents
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the file is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether two handles share the same underlying buffer
    #[must_use]
    pub fn same_file(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

/// Whether a path has one of the accepted extensions (case-insensitive)
#[must_use]
pub fn is_accepted(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
}
