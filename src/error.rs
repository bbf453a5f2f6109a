//! Error types for the exam-forge library.
//!
//! The split mirrors the two pipelines' failure modes:
//!
//! * [`ExamError`] — **Fatal**: the operation cannot produce its result
//!   (no credentials configured, page out of range, both raster engines or
//!   both crop backends failed). Returned as `Err(ExamError)` from the
//!   public entry points.
//!
//! * [`CallError`] — **Non-fatal**: a single model call failed (timeout,
//!   transport error, unparseable reply). The orchestrator records it in the
//!   batch report and carries on with the remaining batches, so a caller may
//!   receive fewer questions than requested but never an error.
//!
//! [`ParseError`], [`BackendError`] and [`EngineError`] describe one failed
//! attempt inside a fallback chain. A [`ParseError`] becomes
//! [`CallError::Unparseable`] on its batch; backend and engine failures that
//! no fallback recovers are folded into a terminal [`ExamError`] that names
//! every attempt.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the exam-forge library.
#[derive(Debug, Error)]
pub enum ExamError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The credential pool is empty; raised before any batch is attempted.
    #[error(
        "No model credentials configured.\n\
Set EXAM_FORGE_API_KEYS (comma-separated), GEMINI_API_KEY or OPENAI_API_KEY."
    )]
    NoCredentials,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The generation request itself is unusable (e.g. `count == 0`).
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The file exists but could not be read.
    #[error("Cannot read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes read are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    /// HTTP download of the PDF failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// A 1-indexed page number outside the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Terminal resource errors ──────────────────────────────────────────
    /// Both raster engines failed for this page.
    #[error("Rasterisation failed for page {page}: primary: {primary}; fallback: {fallback}")]
    RasterisationFailed {
        page: usize,
        primary: String,
        fallback: String,
    },

    /// Both crop backends failed for this region.
    #[error("Cropping failed: {first}; {second}")]
    CropFailed {
        first: BackendError,
        second: BackendError,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task join failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of a single model call.
///
/// Stored in [`crate::output::BatchReport`] so callers can see why a batch
/// came back empty.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum CallError {
    /// The call exceeded the configured per-call timeout.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Network-level failure before a response arrived.
    #[error("transport error: {detail}")]
    Transport { detail: String },

    /// The service answered with a non-success status.
    #[error("model service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered but carried no text.
    #[error("model service returned an empty response")]
    EmptyResponse,

    /// The reply text could not be turned into questions.
    #[error("unparseable model reply: {detail}")]
    Unparseable { detail: String },
}

/// Failure of the response repair chain.
#[derive(Debug, Error)]
pub enum ParseError {
    /// No `[` … `]` span was found in the reply.
    #[error("model reply contains no JSON array")]
    NoArray,

    /// Every strategy failed; `source` is the failure of the direct parse.
    #[error("model reply is not valid JSON after {attempts} repair attempts: {source}")]
    Invalid {
        attempts: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The JSON parsed but the top level is not an array.
    #[error("model reply parsed, but the top-level value is not an array")]
    NotAnArray,
}

impl From<ParseError> for CallError {
    fn from(e: ParseError) -> Self {
        CallError::Unparseable {
            detail: e.to_string(),
        }
    }
}

/// One failed crop attempt on a single image backend.
#[derive(Debug, Clone, Error)]
#[error("{backend} backend: {detail}")]
pub struct BackendError {
    pub backend: &'static str,
    pub detail: String,
}

impl BackendError {
    pub fn new(backend: &'static str, detail: impl Into<String>) -> Self {
        Self {
            backend,
            detail: detail.into(),
        }
    }
}

/// One failed render attempt on a single raster engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The requested page does not exist in the document.
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The engine could not render the page.
    #[error("{engine}: {detail}")]
    Failed { engine: &'static str, detail: String },
}

impl EngineError {
    pub fn failed(engine: &'static str, detail: impl Into<String>) -> Self {
        EngineError::Failed {
            engine,
            detail: detail.into(),
        }
    }
}
