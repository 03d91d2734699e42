use crate::fragment::Fragment;
use lopdf::Document as LoDocument;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfEncryptedUnsupported,
    PdfIoError,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfEncryptedUnsupported => "PDF_ENCRYPTED_UNSUPPORTED",
            PdfInspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: {message}", .code.as_str())]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pdf.get_pages().len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, PdfInspectError> {
    let data = std::fs::read(path).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfIoError,
        message: format!("{}: {err}", path.display()),
    })?;
    inspect_pdf_bytes(&data)
}

/// Fragments are stamped and recomposed page by page, which encrypted files
/// do not allow.
pub fn require_composable(report: &PdfInspectReport) -> Result<(), PdfInspectError> {
    if report.encrypted {
        return Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEncryptedUnsupported,
            message: "encrypted pdf fragments are not supported".to_string(),
        });
    }
    Ok(())
}

/// Records the physical page count of a fragment. Fragments without a
/// location are returned untouched.
pub fn count_fragment_pages(mut fragment: Fragment) -> Result<Fragment, PdfInspectError> {
    let Some(location) = fragment.location.as_deref() else {
        return Ok(fragment);
    };
    let report = inspect_pdf_path(location).map_err(|err| PdfInspectError {
        code: err.code,
        message: format!("{}: {}", fragment.kind.label(), err.message),
    })?;
    require_composable(&report)?;
    log::debug!(
        "{}: pdf {} with {} pages ({} bytes)",
        fragment.kind.label(),
        report.pdf_version,
        report.page_count,
        report.file_size_bytes
    );
    fragment.page_count = Some(report.page_count);
    Ok(fragment)
}
