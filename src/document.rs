//! Boundaries to the collaborators that turn an uploaded résumé into text
//! and text into a summary. Only the contracts live here.

use std::path::Path;

use crate::{
    error::{Error, Result},
    prompt::experience_summary_request,
};

/// Résumé container formats the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Detect the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("docx") => Ok(Self::Docx),
            _ => Err(Error::UnsupportedFormat(format!(
                "{} (only .pdf and .docx are supported)",
                path.display()
            ))),
        }
    }
}

/// Extracts best-effort plain text from a document.
pub trait TextExtractor {
    fn extract(&self, path: &Path, format: DocumentFormat) -> Result<String>;
}

/// A language model completion endpoint.
pub trait CompletionClient {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Extract a résumé and ask the completion client for a short experience
/// summary of it.
pub fn summarize_resume(
    path: &Path,
    extractor: &dyn TextExtractor,
    client: &dyn CompletionClient,
) -> Result<String> {
    let format = DocumentFormat::from_path(path)?;
    if !path.exists() {
        return Err(Error::missing_path("resume", path));
    }
    let text = extractor.extract(path, format)?;
    tracing::debug!(
        path = %path.display(),
        ?format,
        chars = text.chars().count(),
        "extracted resume text"
    );
    client.complete(&experience_summary_request(&text))
}
