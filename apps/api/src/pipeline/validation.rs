use crate::models::upload::UploadFile;
use crate::pipeline::PipelineError;

const DEFAULT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];
const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Accepted file types and size ceiling, checked before any remote call.
#[derive(Debug, Clone)]
pub struct UploadRules {
    pub accepted_extensions: Vec<String>,
    pub max_bytes: usize,
}

impl Default for UploadRules {
    fn default() -> Self {
        Self {
            accepted_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl UploadRules {
    pub fn validate(&self, file: &UploadFile) -> Result<(), PipelineError> {
        if file.is_empty() {
            return Err(PipelineError::Validation(format!(
                "'{}' is empty",
                file.file_name
            )));
        }

        let accepted = self.accepted_extensions.join(", ");
        let extension = file.extension().ok_or_else(|| {
            PipelineError::Validation(format!(
                "'{}' has no file extension; accepted types: {accepted}",
                file.file_name
            ))
        })?;

        if !self
            .accepted_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&extension))
        {
            return Err(PipelineError::Validation(format!(
                "Unsupported file type '.{extension}'; accepted types: {accepted}"
            )));
        }

        if file.len() > self.max_bytes {
            return Err(PipelineError::Validation(format!(
                "'{}' is {} bytes; the limit is {} bytes",
                file.file_name,
                file.len(),
                self.max_bytes
            )));
        }

        Ok(())
    }
}
