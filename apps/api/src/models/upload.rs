use std::path::Path;

use bytes::Bytes;
use serde::Deserialize;

use crate::models::document::DocumentId;

/// A file as received from the client, before any remote call.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension without the leading dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Processor response to an upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadReceipt {
    #[serde(default, alias = "documentId", alias = "resumeId")]
    pub document_id: Option<DocumentId>,
    // Older processors omit the flag; only an explicit `false` is a rejection.
    #[serde(default = "accepted_by_default", alias = "success")]
    pub accepted: bool,
}

fn accepted_by_default() -> bool {
    true
}
