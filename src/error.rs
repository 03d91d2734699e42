use crate::pdfinspect::PdfInspectError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    #[error("no sources provided to bind")]
    EmptySourceList,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("render failed for {input}: {message}")]
    Render { input: String, message: String },

    #[error("text extraction failed for {}: {message}", .path.display())]
    Extraction { path: PathBuf, message: String },

    #[error("pdf inspect error: {0}")]
    Inspect(#[from] PdfInspectError),

    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FolioError {
    pub(crate) fn render(input: impl Into<String>, message: impl Into<String>) -> Self {
        FolioError::Render {
            input: input.into(),
            message: message.into(),
        }
    }
}
