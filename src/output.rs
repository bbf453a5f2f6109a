//! Output types returned by the generation and extraction entry points.

use crate::error::CallError;
use crate::pipeline::encode::png_data_uri;
use crate::pipeline::geometry::CanonicalRect;
use crate::question::GeneratedQuestion;
use serde::{Deserialize, Serialize};

/// Result of a generation run.
///
/// `questions.len()` never exceeds the requested count; it is smaller when
/// generation and the top-up pass both under-delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub questions: Vec<GeneratedQuestion>,
    pub stats: GenerationStats,
    /// One entry per batch, in dispatch order (top-up last).
    pub batches: Vec<BatchReport>,
}

/// Aggregate counters for a generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    pub requested: usize,
    pub produced: usize,
    /// Questions asked of the model across every batch, top-up included.
    pub planned: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// Candidates parsed from model replies, before deduplication.
    pub candidates: usize,
    pub duplicates_removed: usize,
    pub top_up_used: bool,
    /// `requested - produced`.
    pub shortfall: usize,
    pub duration_ms: u64,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// 0-indexed in dispatch order.
    pub index: usize,
    pub requested: usize,
    /// Questions parsed from the reply (0 on failure).
    pub produced: usize,
    pub delay_ms: u64,
    pub top_up: bool,
    pub duration_ms: u64,
    pub error: Option<CallError>,
}

/// One cropped region, PNG-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedImage {
    /// 1-indexed page the region was cut from.
    pub page: usize,
    /// The normalized rectangle actually cropped.
    pub rect: CanonicalRect,
    /// Crop backend that produced the bytes.
    pub backend: &'static str,
    pub png: Vec<u8>,
}

impl CroppedImage {
    /// `data:image/png;base64,…`, ready to embed in a question record.
    pub fn to_data_uri(&self) -> String {
        png_data_uri(&self.png)
    }
}
