//! Confirmation file attached when acknowledging a profile change.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::ValidationError;
use crate::session::EvidencePayload;

/// An in-memory confirmation file.
#[derive(Clone, PartialEq, Eq)]
pub struct EvidenceFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl EvidenceFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn validate(&self, max_bytes: usize) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyEvidence(self.file_name.clone()));
        }
        if self.len() > max_bytes {
            return Err(ValidationError::EvidenceTooLarge {
                max: max_bytes,
                actual: self.len(),
            });
        }
        Ok(())
    }

    /// Encodes the file for a JSON request body.
    pub fn to_payload(&self) -> EvidencePayload {
        EvidencePayload {
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            content_base64: STANDARD.encode(&self.bytes),
        }
    }
}

// File contents stay out of logs.
impl std::fmt::Debug for EvidenceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
