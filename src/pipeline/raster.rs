//! PDF rasterisation: render one page to a `DynamicImage`, with engine failover.
//!
//! ## Engines
//!
//! * [`PdfiumEngine`] (primary) — renders only the requested page through
//!   `pdfium-render` at a fixed upscale factor. pdfium keeps thread-local
//!   state and is not async-safe, so the work runs in `spawn_blocking`.
//! * [`PdftoppmEngine`] (fallback) — poppler's general document renderer,
//!   driven as a subprocess on a temp copy of the PDF. Used only when pdfium
//!   fails, which in practice means the pdfium library is missing or chokes on
//!   a malformed scan that poppler tolerates.
//!
//! Engine-internal cleanup (documents, temp dirs) is best-effort: failures
//! are logged at debug level and never replace the render result.

use crate::config::ExtractionConfig;
use crate::error::{EngineError, ExamError};
use futures::future::BoxFuture;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A rendered page. Owned by the extraction call that produced it.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 1-indexed page number.
    pub page: usize,
    pub image: DynamicImage,
    /// Name of the engine that produced the bitmap.
    pub engine: &'static str,
}

impl RasterPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// One way of turning a PDF page into a bitmap.
pub trait RasterEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render 1-indexed `page` of `pdf`.
    fn render(&self, pdf: Arc<[u8]>, page: usize) -> BoxFuture<'_, Result<DynamicImage, EngineError>>;
}

/// Primary engine → fallback engine.
pub struct RasterAdapter {
    primary: Arc<dyn RasterEngine>,
    fallback: Arc<dyn RasterEngine>,
}

impl RasterAdapter {
    pub fn new(primary: Arc<dyn RasterEngine>, fallback: Arc<dyn RasterEngine>) -> Self {
        Self { primary, fallback }
    }

    /// pdfium first, `pdftoppm` second.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            Arc::new(PdfiumEngine::new(config.render_scale, config.pdfium_lib_path.clone())),
            Arc::new(PdftoppmEngine::new(
                config.pdftoppm_bin.clone(),
                config.pdfinfo_bin.clone(),
                config.fallback_dpi,
            )),
        )
    }

    /// Render 1-indexed `page`, falling back to the secondary engine if the
    /// primary fails.
    ///
    /// # Errors
    /// * [`ExamError::PageOutOfRange`] if either engine reports the page does
    ///   not exist and no engine rendered it.
    /// * [`ExamError::RasterisationFailed`] naming both failures otherwise.
    pub async fn render_page(&self, pdf: Arc<[u8]>, page: usize) -> Result<RasterPage, ExamError> {
        if page == 0 {
            return Err(ExamError::InvalidRequest(
                "page numbers are 1-indexed; got 0".into(),
            ));
        }

        let primary_err = match self.primary.render(Arc::clone(&pdf), page).await {
            Ok(image) => {
                debug!(
                    "Rendered page {} with {} → {}x{} px",
                    page,
                    self.primary.name(),
                    image.width(),
                    image.height()
                );
                return Ok(RasterPage {
                    page,
                    image,
                    engine: self.primary.name(),
                });
            }
            Err(e) => e,
        };

        warn!(
            "Page {}: {} failed ({}); falling back to {}",
            page,
            self.primary.name(),
            primary_err,
            self.fallback.name()
        );

        match self.fallback.render(pdf, page).await {
            Ok(image) => {
                info!(
                    "Rendered page {} with fallback {} → {}x{} px",
                    page,
                    self.fallback.name(),
                    image.width(),
                    image.height()
                );
                Ok(RasterPage {
                    page,
                    image,
                    engine: self.fallback.name(),
                })
            }
            Err(EngineError::PageOutOfRange { page, total }) => {
                Err(ExamError::PageOutOfRange { page, total })
            }
            Err(fallback_err) => match primary_err {
                EngineError::PageOutOfRange { page, total } => {
                    Err(ExamError::PageOutOfRange { page, total })
                }
                primary_err => Err(ExamError::RasterisationFailed {
                    page,
                    primary: primary_err.to_string(),
                    fallback: fallback_err.to_string(),
                }),
            },
        }
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Renders through the pdfium library.
pub struct PdfiumEngine {
    scale: f32,
    lib_path: Option<PathBuf>,
}

impl PdfiumEngine {
    const NAME: &'static str = "pdfium";

    pub fn new(scale: f32, lib_path: Option<PathBuf>) -> Self {
        Self { scale, lib_path }
    }
}

impl RasterEngine for PdfiumEngine {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn render(&self, pdf: Arc<[u8]>, page: usize) -> BoxFuture<'_, Result<DynamicImage, EngineError>> {
        let scale = self.scale;
        let lib_path = self.lib_path.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                render_with_pdfium(&pdf, page, scale, lib_path.as_deref())
            })
            .await
            .map_err(|e| EngineError::failed(Self::NAME, format!("render task panicked: {e}")))?
        })
    }
}

/// Blocking pdfium render of a single page.
fn render_with_pdfium(
    pdf: &[u8],
    page: usize,
    scale: f32,
    lib_path: Option<&Path>,
) -> Result<DynamicImage, EngineError> {
    let fail = |stage: &str, e: PdfiumError| {
        EngineError::failed(PdfiumEngine::NAME, format!("{stage}: {e:?}"))
    };

    let bindings = match lib_path {
        Some(path) => Pdfium::bind_to_library(path.to_string_lossy().to_string()),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| fail("bind", e))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| fail("load", e))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if page > total {
        return Err(EngineError::PageOutOfRange { page, total });
    }

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| fail("page", e))?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| fail("render", e))?;

    Ok(bitmap.as_image())
}

// ── pdftoppm ─────────────────────────────────────────────────────────────

/// Renders through poppler's `pdftoppm`, using `pdfinfo` for the page count.
pub struct PdftoppmEngine {
    bin: PathBuf,
    info_bin: PathBuf,
    dpi: u32,
}

impl PdftoppmEngine {
    const NAME: &'static str = "pdftoppm";

    pub fn new(bin: PathBuf, info_bin: PathBuf, dpi: u32) -> Self {
        Self { bin, info_bin, dpi }
    }

    /// Page count via `pdfinfo`; `None` if it is unavailable or unparseable.
    async fn page_count(&self, pdf_path: &Path) -> Option<usize> {
        let output = match Command::new(&self.info_bin).arg(pdf_path).output().await {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!("pdfinfo exited with {}", output.status);
                return None;
            }
            Err(e) => {
                debug!("pdfinfo unavailable: {e}");
                return None;
            }
        };
        parse_page_count(&String::from_utf8_lossy(&output.stdout))
    }

    async fn render_in(&self, dir: &Path, pdf: &[u8], page: usize) -> Result<DynamicImage, EngineError> {
        let fail = |detail: String| EngineError::failed(Self::NAME, detail);

        let input = dir.join("input.pdf");
        tokio::fs::write(&input, pdf)
            .await
            .map_err(|e| fail(format!("writing temp PDF: {e}")))?;

        let known_total = self.page_count(&input).await;
        if let Some(total) = known_total {
            if page > total {
                return Err(EngineError::PageOutOfRange { page, total });
            }
        }

        let prefix = dir.join("page");
        let page_arg = page.to_string();
        let output = Command::new(&self.bin)
            .args(["-f", &page_arg, "-l", &page_arg])
            .args(["-r", &self.dpi.to_string()])
            .args(["-png", "-singlefile"])
            .arg(&input)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| fail(format!("could not run {}: {e}", self.bin.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Wrong page range") {
                return Err(EngineError::PageOutOfRange {
                    page,
                    total: known_total.unwrap_or(0),
                });
            }
            return Err(fail(format!("exited with {}: {}", output.status, stderr.trim())));
        }

        let png = tokio::fs::read(prefix.with_extension("png"))
            .await
            .map_err(|e| fail(format!("reading output: {e}")))?;
        image::load_from_memory(&png).map_err(|e| fail(format!("decoding output: {e}")))
    }
}

impl RasterEngine for PdftoppmEngine {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn render(&self, pdf: Arc<[u8]>, page: usize) -> BoxFuture<'_, Result<DynamicImage, EngineError>> {
        Box::pin(async move {
            let dir = tempfile::tempdir()
                .map_err(|e| EngineError::failed(Self::NAME, format!("temp dir: {e}")))?;
            let result = self.render_in(dir.path(), &pdf, page).await;
            if let Err(e) = dir.close() {
                debug!("pdftoppm temp dir cleanup failed: {e}");
            }
            result
        })
    }
}

/// Extract `Pages:` from `pdfinfo` output.
pub fn parse_page_count(pdfinfo_stdout: &str) -> Option<usize> {
    pdfinfo_stdout
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse().ok())
}
