//! Diagram extraction entry points.
//!
//! A diagram request names a page and a bounding box. Each distinct page is
//! rasterised exactly once; every box on that page is cropped from the same
//! bitmap, which is dropped before the next page is rendered.

use crate::config::ExtractionConfig;
use crate::error::ExamError;
use crate::output::CroppedImage;
use crate::pipeline::crop::RegionCropper;
use crate::pipeline::geometry::BoundingBox;
use crate::pipeline::input;
use crate::pipeline::raster::{RasterAdapter, RasterPage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// One region to cut: a 1-indexed page and a box on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRequest {
    pub page: usize,
    pub bbox: BoundingBox,
}

impl RegionRequest {
    pub fn new(page: usize, bbox: BoundingBox) -> Self {
        Self { page, bbox }
    }
}

/// Load a PDF from a path or URL and crop `requests` out of it.
///
/// Results are returned in the order of `requests`.
pub async fn extract_regions(
    input_str: impl AsRef<str>,
    requests: &[RegionRequest],
    config: &ExtractionConfig,
) -> Result<Vec<CroppedImage>, ExamError> {
    let pdf = input::load_pdf(input_str.as_ref(), config.download_timeout_secs).await?;
    DiagramExtractor::from_config(config)
        .extract_regions(Arc::from(pdf), requests)
        .await
}

/// Raster adapter plus region cropper.
pub struct DiagramExtractor {
    adapter: RasterAdapter,
    cropper: Arc<RegionCropper>,
}

impl DiagramExtractor {
    pub fn new(adapter: RasterAdapter, cropper: Arc<RegionCropper>) -> Self {
        Self { adapter, cropper }
    }

    /// pdfium → `pdftoppm`, cropping with the process-wide backend preference.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            RasterAdapter::from_config(config),
            Arc::new(RegionCropper::default()),
        )
    }

    pub fn cropper(&self) -> &RegionCropper {
        &self.cropper
    }

    /// Render one page.
    pub async fn rasterize(&self, pdf: Arc<[u8]>, page: usize) -> Result<RasterPage, ExamError> {
        self.adapter.render_page(pdf, page).await
    }

    /// Render `page` once and crop every box from it, in input order.
    ///
    /// An empty `boxes` slice renders nothing.
    pub async fn extract_page_regions(
        &self,
        pdf: Arc<[u8]>,
        page: usize,
        boxes: &[BoundingBox],
    ) -> Result<Vec<CroppedImage>, ExamError> {
        if boxes.is_empty() {
            return Ok(Vec::new());
        }
        let raster = self.adapter.render_page(pdf, page).await?;
        self.crop_on(raster, boxes.to_vec()).await
    }

    /// Crop regions spread over any number of pages.
    ///
    /// Pages are rendered in ascending order, one at a time; results come
    /// back in the order of `requests`.
    pub async fn extract_regions(
        &self,
        pdf: Arc<[u8]>,
        requests: &[RegionRequest],
    ) -> Result<Vec<CroppedImage>, ExamError> {
        let started = Instant::now();
        let mut by_page: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, request) in requests.iter().enumerate() {
            by_page.entry(request.page).or_default().push(i);
        }
        info!(
            "Extracting {} region(s) from {} page(s)",
            requests.len(),
            by_page.len()
        );

        let mut slots: Vec<Option<CroppedImage>> = vec![None; requests.len()];
        for (page, indices) in by_page {
            let boxes: Vec<BoundingBox> = indices.iter().map(|&i| requests[i].bbox).collect();
            let crops = self.extract_page_regions(Arc::clone(&pdf), page, &boxes).await?;
            for (slot, crop) in indices.into_iter().zip(crops) {
                slots[slot] = Some(crop);
            }
        }

        let crops: Vec<CroppedImage> = slots.into_iter().flatten().collect();
        debug!(
            "Extracted {} region(s) in {}ms",
            crops.len(),
            started.elapsed().as_millis()
        );
        Ok(crops)
    }

    /// Crop on the blocking pool; encoding a large page region is CPU-bound.
    async fn crop_on(&self, raster: RasterPage, boxes: Vec<BoundingBox>) -> Result<Vec<CroppedImage>, ExamError> {
        let cropper = Arc::clone(&self.cropper);
        tokio::task::spawn_blocking(move || cropper.crop_all(&raster, &boxes))
            .await
            .map_err(|e| ExamError::Internal(format!("crop task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pipeline::crop::{BackendPreference, ImageBackend, RawPngBackend};
    use crate::pipeline::raster::RasterEngine;
    use futures::future::BoxFuture;
    use image::{DynamicImage, RgbaImage};
    use std::sync::Mutex;

    /// Renders a page whose width encodes the page number; records calls.
    struct PageSizedEngine {
        pages: usize,
        calls: Mutex<Vec<usize>>,
    }

    impl RasterEngine for PageSizedEngine {
        fn name(&self) -> &'static str {
            "page-sized"
        }

        fn render(&self, _pdf: Arc<[u8]>, page: usize) -> BoxFuture<'_, Result<DynamicImage, EngineError>> {
            self.calls.lock().unwrap().push(page);
            let pages = self.pages;
            Box::pin(async move {
                if page > pages {
                    return Err(EngineError::PageOutOfRange { page, total: pages });
                }
                Ok(DynamicImage::ImageRgba8(RgbaImage::new(100 * page as u32, 200)))
            })
        }
    }

    fn extractor(pages: usize) -> (DiagramExtractor, Arc<PageSizedEngine>) {
        let primary = Arc::new(PageSizedEngine {
            pages,
            calls: Mutex::new(Vec::new()),
        });
        let fallback = Arc::new(PageSizedEngine {
            pages,
            calls: Mutex::new(Vec::new()),
        });
        let cropper = RegionCropper::new(
            Arc::new(ImageBackend),
            Arc::new(RawPngBackend),
            Arc::new(BackendPreference::new()),
        );
        (
            DiagramExtractor::new(RasterAdapter::new(primary.clone(), fallback), Arc::new(cropper)),
            primary,
        )
    }

    fn pdf() -> Arc<[u8]> {
        Arc::from(&b"%PDF-1.7"[..])
    }

    #[tokio::test]
    async fn each_page_is_rendered_once_and_order_is_kept() {
        let (extractor, engine) = extractor(3);
        let full = BoundingBox::origin(0.0, 0.0, 1.0, 1.0);
        let requests = vec![
            RegionRequest::new(2, full),
            RegionRequest::new(1, full),
            RegionRequest::new(2, BoundingBox::corners(0.0, 0.0, 0.5, 0.5)),
        ];

        let crops = extractor.extract_regions(pdf(), &requests).await.unwrap();
        assert_eq!(crops.iter().map(|c| c.page).collect::<Vec<_>>(), [2, 1, 2]);
        assert_eq!(crops[0].rect.width, 200);
        assert_eq!(crops[1].rect.width, 100);
        assert_eq!(crops[2].rect.width, 100);
        assert_eq!(*engine.calls.lock().unwrap(), [1, 2]);
        assert!(crops.iter().all(|c| c.png.starts_with(b"\x89PNG")));
    }

    #[tokio::test]
    async fn out_of_range_page_is_reported() {
        let (extractor, _) = extractor(2);
        let err = extractor
            .extract_page_regions(pdf(), 5, &[BoundingBox::origin(0.0, 0.0, 1.0, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, ExamError::PageOutOfRange { page: 5, total: 2 }));
    }

    #[tokio::test]
    async fn no_boxes_renders_nothing() {
        let (extractor, engine) = extractor(2);
        let crops = extractor.extract_page_regions(pdf(), 1, &[]).await.unwrap();
        assert!(crops.is_empty());
        assert!(engine.calls.lock().unwrap().is_empty());
    }
}
