//! Pipeline stages for question generation and diagram extraction.
//!
//! Each submodule implements one step and is testable on its own; the
//! entry points in [`crate::generate`] and [`crate::extract`] wire them up.
//!
//! ## Data Flow
//!
//! ```text
//! generation:  batch ──▶ llm ──▶ repair ──▶ dedup
//!              (plan)   (rotate   (JSON     (Jaccard)
//!                        keys)     fix-up)
//!
//! extraction:  input ──▶ raster ──▶ geometry ──▶ crop ──▶ encode
//!              (path/URL) (pdfium |  (normalize)  (sticky  (PNG)
//!                         pdftoppm)               failover)
//! ```
//!
//! 1. [`batch`]       — inflate, chunk and stagger a request
//! 2. [`credentials`] — round-robin API key rotation
//! 3. [`llm`]         — one model call with a per-call timeout; the only
//!    generation stage with network I/O
//! 4. [`repair`]      — ordered repair strategies for malformed JSON replies
//! 5. [`dedup`]       — drop near-duplicate questions
//! 6. [`input`]       — load PDF bytes from a path or URL
//! 7. [`raster`]      — render one page, falling back to a second engine
//! 8. [`geometry`]    — bounding box → clamped pixel rectangle
//! 9. [`crop`]        — cut regions with primary/alternate backends
//! 10. [`encode`]     — PNG and base64 helpers

pub mod batch;
pub mod credentials;
pub mod crop;
pub mod dedup;
pub mod encode;
pub mod geometry;
pub mod input;
pub mod llm;
pub mod raster;
pub mod repair;
