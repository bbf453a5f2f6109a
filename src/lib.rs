//! # exam-forge
//!
//! Generate exam questions in bulk with a language model, and cut diagram
//! regions out of PDF pages for those questions.
//!
//! ## Why this crate?
//!
//! A single model call asked for fifty questions returns fewer, repeats
//! itself, and often emits invalid JSON because question text carries LaTeX
//! backslashes. This crate splits large requests into staggered batches,
//! rotates API keys across them, repairs the replies, removes near-duplicate
//! questions and tops up any shortfall once. Diagrams referenced by those
//! questions are rasterised from the source PDF and cropped by bounding box.
//!
//! ## Pipeline Overview
//!
//! ```text
//! GenerationRequest
//!  │
//!  ├─ 1. Plan     direct call, or inflate ×1.2 and split into batches of 10
//!  ├─ 2. Call     staggered concurrent model calls, keys rotated round-robin
//!  ├─ 3. Repair   strip fences, fix backslash escaping, parse the array
//!  ├─ 4. Dedup    Jaccard similarity over content words
//!  ├─ 5. Top-up   one extra batch if still short
//!  └─ 6. Output   truncated questions + per-batch stats
//!
//! PDF + (page, box)…
//!  │
//!  ├─ 1. Render   pdfium, falling back to pdftoppm; once per page
//!  ├─ 2. Normalize fractional or pixel, corners or origin → clamped rect
//!  └─ 3. Crop     image backend, sticky failover to the raw png backend
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exam_forge::{generate_questions, GenerationConfig, GenerationRequest, QuestionType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys from EXAM_FORGE_API_KEYS / GEMINI_API_KEY / OPENAI_API_KEY
//!     let config = GenerationConfig::from_env()?;
//!     let request = GenerationRequest::new("Projectile motion", "Physics", 30)
//!         .level("Class 11")
//!         .question_type(QuestionType::SingleChoice)
//!         .difficulty(60);
//!     let output = generate_questions(&request, &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.questions)?);
//!     eprintln!("{} of {} questions", output.stats.produced, output.stats.requested);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `examforge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! exam-forge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod question;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, GenerationConfig, GenerationConfigBuilder,
    ProviderKind,
};
pub use error::{BackendError, CallError, EngineError, ExamError, ParseError};
pub use extract::{extract_regions, DiagramExtractor, RegionRequest};
pub use generate::{generate_questions, QuestionGenerator};
pub use output::{BatchReport, CroppedImage, GenerationOutput, GenerationStats};
pub use pipeline::crop::{BackendPreference, RegionCropper};
pub use pipeline::geometry::{BoundingBox, CanonicalRect};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use question::{GeneratedQuestion, GenerationRequest, QuestionOption, QuestionType};
