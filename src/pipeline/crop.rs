//! Region cropping with sticky backend failover.
//!
//! Two backends cut a [`CanonicalRect`] out of a [`RasterPage`] and return
//! PNG bytes:
//!
//! * [`ImageBackend`] (primary) — `image::imageops` crop + the `image` PNG
//!   encoder.
//! * [`RawPngBackend`] (alternate) — copies RGBA rows by hand and writes them
//!   with the standalone `png` encoder, so it shares no crop or encode code
//!   with the primary.
//!
//! [`BackendPreference`] remembers which backend to try first. Once the
//! alternate has rescued a crop it stays preferred for the rest of the
//! process; the flag is never reset.

use crate::error::{BackendError, ExamError};
use crate::output::CroppedImage;
use crate::pipeline::encode::encode_png;
use crate::pipeline::geometry::{normalize, BoundingBox, CanonicalRect};
use crate::pipeline::raster::RasterPage;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cuts one rectangle out of a page bitmap.
pub trait CropBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Crop `rect` (already normalized against `page`) and encode it as PNG.
    fn crop(&self, page: &RasterPage, rect: CanonicalRect) -> Result<Vec<u8>, BackendError>;
}

/// Which crop backend goes first. Monotonic: primary → alternate, never back.
#[derive(Debug, Default)]
pub struct BackendPreference {
    alternate: AtomicBool,
}

static GLOBAL_PREFERENCE: Lazy<Arc<BackendPreference>> =
    Lazy::new(|| Arc::new(BackendPreference::new()));

impl BackendPreference {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide preference shared by every default-built cropper.
    pub fn global() -> Arc<BackendPreference> {
        Arc::clone(&GLOBAL_PREFERENCE)
    }

    pub fn prefers_alternate(&self) -> bool {
        self.alternate.load(Ordering::Acquire)
    }

    fn switch_to_alternate(&self) -> bool {
        !self.alternate.swap(true, Ordering::AcqRel)
    }
}

/// Normalizes boxes and crops them with primary/alternate failover.
pub struct RegionCropper {
    primary: Arc<dyn CropBackend>,
    alternate: Arc<dyn CropBackend>,
    preference: Arc<BackendPreference>,
}

impl Default for RegionCropper {
    /// [`ImageBackend`] then [`RawPngBackend`], sharing the process-wide preference.
    fn default() -> Self {
        Self::new(
            Arc::new(ImageBackend),
            Arc::new(RawPngBackend),
            BackendPreference::global(),
        )
    }
}

impl RegionCropper {
    pub fn new(
        primary: Arc<dyn CropBackend>,
        alternate: Arc<dyn CropBackend>,
        preference: Arc<BackendPreference>,
    ) -> Self {
        Self {
            primary,
            alternate,
            preference,
        }
    }

    pub fn preference(&self) -> &BackendPreference {
        &self.preference
    }

    /// Crop one region of `page`.
    ///
    /// # Errors
    /// [`ExamError::CropFailed`] if both backends fail.
    pub fn crop(&self, page: &RasterPage, bbox: &BoundingBox) -> Result<CroppedImage, ExamError> {
        let rect = normalize(bbox, page.width(), page.height());

        let alternate_first = self.preference.prefers_alternate();
        let (first, second) = if alternate_first {
            (&self.alternate, &self.primary)
        } else {
            (&self.primary, &self.alternate)
        };

        let first_err = match first.crop(page, rect) {
            Ok(png) => return Ok(self.finish(page, rect, first.name(), png)),
            Err(e) => e,
        };
        warn!("Crop {:?} on page {}: {}; retrying with {}", rect, page.page, first_err, second.name());

        match second.crop(page, rect) {
            Ok(png) => {
                if !alternate_first && self.preference.switch_to_alternate() {
                    warn!(
                        "{} backend failed; {} is now preferred for this process",
                        self.primary.name(),
                        self.alternate.name()
                    );
                }
                Ok(self.finish(page, rect, second.name(), png))
            }
            Err(second_err) => Err(ExamError::CropFailed {
                first: first_err,
                second: second_err,
            }),
        }
    }

    /// Crop every box against one already-rendered page, in input order.
    pub fn crop_all(&self, page: &RasterPage, boxes: &[BoundingBox]) -> Result<Vec<CroppedImage>, ExamError> {
        boxes.iter().map(|b| self.crop(page, b)).collect()
    }

    fn finish(&self, page: &RasterPage, rect: CanonicalRect, backend: &'static str, png: Vec<u8>) -> CroppedImage {
        debug!(
            "Cropped {}x{} at ({}, {}) on page {} via {} → {} bytes",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            page.page,
            backend,
            png.len()
        );
        CroppedImage {
            page: page.page,
            rect,
            backend,
            png,
        }
    }
}

// ── Backends ─────────────────────────────────────────────────────────────

/// Crop and encode with the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageBackend;

impl CropBackend for ImageBackend {
    fn name(&self) -> &'static str {
        "image"
    }

    fn crop(&self, page: &RasterPage, rect: CanonicalRect) -> Result<Vec<u8>, BackendError> {
        check_bounds(self.name(), page, rect)?;
        let region = page.image.crop_imm(rect.x, rect.y, rect.width, rect.height);
        encode_png(&region).map_err(|e| BackendError::new(self.name(), e.to_string()))
    }
}

/// Copy RGBA rows by hand and encode with the `png` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawPngBackend;

impl CropBackend for RawPngBackend {
    fn name(&self) -> &'static str {
        "png"
    }

    fn crop(&self, page: &RasterPage, rect: CanonicalRect) -> Result<Vec<u8>, BackendError> {
        check_bounds(self.name(), page, rect)?;
        let rgba = page.image.to_rgba8();
        let stride = rgba.width() as usize * 4;
        let raw = rgba.as_raw();

        let row_bytes = rect.width as usize * 4;
        let mut data = Vec::with_capacity(row_bytes * rect.height as usize);
        for row in rect.y..rect.y + rect.height {
            let start = row as usize * stride + rect.x as usize * 4;
            data.extend_from_slice(&raw[start..start + row_bytes]);
        }

        let err = |e: png::EncodingError| BackendError::new("png", e.to_string());
        let mut buffer = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buffer, rect.width, rect.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().map_err(err)?;
            writer.write_image_data(&data).map_err(err)?;
        }
        Ok(buffer)
    }
}

fn check_bounds(backend: &'static str, page: &RasterPage, rect: CanonicalRect) -> Result<(), BackendError> {
    if rect.width == 0 || rect.height == 0 || !rect.fits_within(page.width(), page.height()) {
        return Err(BackendError::new(
            backend,
            format!(
                "rectangle {:?} does not fit a {}x{} page",
                rect,
                page.width(),
                page.height()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::atomic::AtomicUsize;

    fn page(w: u32, h: u32) -> RasterPage {
        let mut img = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        img.put_pixel(w / 2, h / 2, Rgba([255, 0, 0, 255]));
        RasterPage {
            page: 1,
            image: DynamicImage::ImageRgba8(img),
            engine: "test",
        }
    }

    struct FlakyBackend {
        name: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FlakyBackend {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl CropBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn crop(&self, _page: &RasterPage, _rect: CanonicalRect) -> Result<Vec<u8>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BackendError::new(self.name, "unavailable"))
            } else {
                Ok(self.name.as_bytes().to_vec())
            }
        }
    }

    #[test]
    fn backends_produce_identical_pixels() {
        let p = page(100, 80);
        let rect = CanonicalRect {
            x: 40,
            y: 30,
            width: 20,
            height: 20,
        };
        let a = image::load_from_memory(&ImageBackend.crop(&p, rect).unwrap()).unwrap();
        let b = image::load_from_memory(&RawPngBackend.crop(&p, rect).unwrap()).unwrap();
        assert_eq!((a.width(), a.height()), (20, 20));
        assert_eq!(a.to_rgba8().as_raw(), b.to_rgba8().as_raw());
        assert_eq!(a.to_rgba8().get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn out_of_bounds_rect_is_refused() {
        let p = page(20, 20);
        let rect = CanonicalRect {
            x: 15,
            y: 0,
            width: 10,
            height: 10,
        };
        assert!(ImageBackend.crop(&p, rect).is_err());
        assert!(RawPngBackend.crop(&p, rect).is_err());
    }

    #[test]
    fn crop_normalizes_fractional_box() {
        let cropper = RegionCropper::new(
            Arc::new(ImageBackend),
            Arc::new(RawPngBackend),
            Arc::new(BackendPreference::new()),
        );
        let out = cropper
            .crop(&page(1000, 800), &BoundingBox::origin(0.1, 0.2, 0.5, 0.3))
            .unwrap();
        assert_eq!(
            out.rect,
            CanonicalRect {
                x: 100,
                y: 160,
                width: 500,
                height: 240
            }
        );
        let decoded = image::load_from_memory(&out.png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (500, 240));
    }

    #[test]
    fn failover_is_sticky() {
        let primary = FlakyBackend::new("primary", true);
        let alternate = FlakyBackend::new("alternate", false);
        let pref = Arc::new(BackendPreference::new());
        let cropper = RegionCropper::new(primary.clone(), alternate.clone(), pref.clone());
        let p = page(100, 100);
        let bbox = BoundingBox::origin(0.0, 0.0, 0.5, 0.5);

        assert!(!pref.prefers_alternate());
        assert_eq!(cropper.crop(&p, &bbox).unwrap().backend, "alternate");
        assert!(pref.prefers_alternate());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);

        for _ in 0..3 {
            assert_eq!(cropper.crop(&p, &bbox).unwrap().backend, "alternate");
        }
        // Primary is never tried again.
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(alternate.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn preference_is_shared_between_croppers() {
        let pref = Arc::new(BackendPreference::new());
        let broken = RegionCropper::new(
            FlakyBackend::new("primary", true),
            FlakyBackend::new("alternate", false),
            pref.clone(),
        );
        broken.crop(&page(50, 50), &BoundingBox::origin(0.0, 0.0, 1.0, 1.0)).unwrap();

        let primary = FlakyBackend::new("primary", false);
        let other = RegionCropper::new(primary.clone(), FlakyBackend::new("alternate", false), pref);
        assert_eq!(
            other.crop(&page(50, 50), &BoundingBox::origin(0.0, 0.0, 1.0, 1.0)).unwrap().backend,
            "alternate"
        );
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn alternate_failing_later_falls_back_without_resetting() {
        let pref = Arc::new(BackendPreference::new());
        pref.switch_to_alternate();
        let cropper = RegionCropper::new(
            FlakyBackend::new("primary", false),
            FlakyBackend::new("alternate", true),
            pref.clone(),
        );
        let out = cropper.crop(&page(50, 50), &BoundingBox::origin(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert_eq!(out.backend, "primary");
        assert!(pref.prefers_alternate());
    }

    #[test]
    fn both_failing_is_terminal() {
        let cropper = RegionCropper::new(
            FlakyBackend::new("primary", true),
            FlakyBackend::new("alternate", true),
            Arc::new(BackendPreference::new()),
        );
        let err = cropper
            .crop(&page(50, 50), &BoundingBox::origin(0.0, 0.0, 1.0, 1.0))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("primary backend: unavailable"), "{msg}");
        assert!(msg.contains("alternate backend: unavailable"), "{msg}");
    }

    #[test]
    fn crop_all_preserves_order() {
        let cropper = RegionCropper::new(
            Arc::new(ImageBackend),
            Arc::new(RawPngBackend),
            Arc::new(BackendPreference::new()),
        );
        let boxes = [
            BoundingBox::origin(0.0, 0.0, 30.0, 20.0),
            BoundingBox::corners(10.0, 10.0, 60.0, 70.0),
        ];
        let out = cropper.crop_all(&page(100, 100), &boxes).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].rect.width, out[0].rect.height), (30, 20));
        assert_eq!((out[1].rect.width, out[1].rect.height), (50, 60));
    }
}
