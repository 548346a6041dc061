//! The filter engine: per-pixel color transforms with adjustable intensity.
//!
//! Filters are a cosmetic extra, never a dependency of the print. The
//! contract is therefore lopsided:
//!
//! - [`apply_filter`] is pure: it copies the source, transforms the copy and
//!   returns it. The input is never touched.
//! - [`apply_filter_with_deadline`] runs a [`PixelFilter`] on a worker and
//!   returns the *original* image if the worker times out, panics, or reports
//!   an error.
//!
//! | Kind | Per-pixel formula (f = intensity / 100) |
//! |---|---|
//! | grayscale | `C' = C(1-f) + avg·f` |
//! | sepia | classic sepia matrix, blended by `f` |
//! | vintage / warm / cool | flat color overlay, alpha scaled by `f` |
//! | highContrast | `128 + (C-128)(1+f)` |
//! | lowContrast | `128 + (C-128)(1-0.5f)` |
//! | brighten / darken | `C ± 30f` |
//! | saturate / desaturate | push away from / pull toward luma |
//! | red/green/blueTint | `+30f` on one channel |
//!
//! Alpha is never modified. All results are rounded and clamped to `[0, 255]`.

use crate::deadline;
use crate::types::{FilterKind, FilterSpec};
use image::RgbaImage;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("image has no pixels")]
    Empty,
    #[error("filter failed: {0}")]
    Failed(String),
}

/// Something that can turn an image into a filtered copy.
///
/// The production implementation is [`FilterEngine`]; tests swap in filters
/// that stall or fail to exercise the fallback paths.
pub trait PixelFilter: Send + Sync {
    fn apply(&self, image: &RgbaImage, spec: FilterSpec) -> Result<RgbaImage, FilterError>;
}

/// The booth's built-in filters.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterEngine;

impl PixelFilter for FilterEngine {
    fn apply(&self, image: &RgbaImage, spec: FilterSpec) -> Result<RgbaImage, FilterError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FilterError::Empty);
        }
        Ok(apply_filter(image, spec))
    }
}

/// Flat overlay color and base alpha for the overlay-style filters.
fn overlay_for(kind: FilterKind) -> Option<([f32; 3], f32)> {
    match kind {
        FilterKind::Vintage => Some(([255.0, 210.0, 170.0], 0.3)),
        FilterKind::Warm => Some(([255.0, 160.0, 60.0], 0.2)),
        FilterKind::Cool => Some(([100.0, 170.0, 255.0], 0.2)),
        _ => None,
    }
}

#[inline]
fn to_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Transform one RGB triple. Returned values are unclamped floats.
fn transform(kind: FilterKind, f: f32, [r, g, b]: [f32; 3]) -> [f32; 3] {
    let luma = |r: f32, g: f32, b: f32| 0.3 * r + 0.59 * g + 0.11 * b;
    match kind {
        FilterKind::None => [r, g, b],
        FilterKind::Grayscale => {
            let avg = (r + g + b) / 3.0;
            [
                r * (1.0 - f) + avg * f,
                g * (1.0 - f) + avg * f,
                b * (1.0 - f) + avg * f,
            ]
        }
        FilterKind::Sepia => {
            let sr = (r * 0.393 + g * 0.769 + b * 0.189).min(255.0);
            let sg = (r * 0.349 + g * 0.686 + b * 0.168).min(255.0);
            let sb = (r * 0.272 + g * 0.534 + b * 0.131).min(255.0);
            [
                r * (1.0 - f) + sr * f,
                g * (1.0 - f) + sg * f,
                b * (1.0 - f) + sb * f,
            ]
        }
        FilterKind::Vintage | FilterKind::Warm | FilterKind::Cool => {
            let Some((color, base_alpha)) = overlay_for(kind) else {
                return [r, g, b];
            };
            let a = base_alpha * f;
            [
                r * (1.0 - a) + color[0] * a,
                g * (1.0 - a) + color[1] * a,
                b * (1.0 - a) + color[2] * a,
            ]
        }
        FilterKind::HighContrast => {
            let k = 1.0 + f;
            [
                128.0 + (r - 128.0) * k,
                128.0 + (g - 128.0) * k,
                128.0 + (b - 128.0) * k,
            ]
        }
        FilterKind::LowContrast => {
            let k = 1.0 - 0.5 * f;
            [
                128.0 + (r - 128.0) * k,
                128.0 + (g - 128.0) * k,
                128.0 + (b - 128.0) * k,
            ]
        }
        FilterKind::Brighten => [r + 30.0 * f, g + 30.0 * f, b + 30.0 * f],
        FilterKind::Darken => [r - 30.0 * f, g - 30.0 * f, b - 30.0 * f],
        FilterKind::Saturate => {
            let gray = luma(r, g, b);
            let k = 1.0 + f;
            [
                gray + (r - gray) * k,
                gray + (g - gray) * k,
                gray + (b - gray) * k,
            ]
        }
        FilterKind::Desaturate => {
            let gray = luma(r, g, b);
            [r + (gray - r) * f, g + (gray - g) * f, b + (gray - b) * f]
        }
        FilterKind::RedTint => [r + 30.0 * f, g, b],
        FilterKind::GreenTint => [r, g + 30.0 * f, b],
        FilterKind::BlueTint => [r, g, b + 30.0 * f],
    }
}

/// Apply `spec` to a copy of `image`.
///
/// `FilterKind::None` returns a verbatim copy regardless of intensity.
pub fn apply_filter(image: &RgbaImage, spec: FilterSpec) -> RgbaImage {
    let mut out = image.clone();
    if spec.is_identity() {
        return out;
    }
    let f = spec.factor();
    let kind = spec.kind;
    out.par_chunks_mut(4).for_each(|px| {
        let rgb = [f32::from(px[0]), f32::from(px[1]), f32::from(px[2])];
        let [r, g, b] = transform(kind, f, rgb);
        px[0] = to_channel(r);
        px[1] = to_channel(g);
        px[2] = to_channel(b);
    });
    out
}

/// Run `filter` on a worker, bounded by `timeout`.
///
/// Any failure yields the original `Arc` back, so callers never need an
/// error path.
pub fn apply_filter_with_deadline(
    filter: Arc<dyn PixelFilter>,
    image: Arc<RgbaImage>,
    spec: FilterSpec,
    timeout: Duration,
) -> Arc<RgbaImage> {
    if spec.is_identity() {
        return image;
    }
    let source = Arc::clone(&image);
    let result = deadline::run_with_deadline("filter", timeout, move || {
        filter.apply(&source, spec)
    });
    match result {
        Ok(Ok(filtered)) => Arc::new(filtered),
        Ok(Err(e)) => {
            warn!(filter = %spec.kind, error = %e, "filter failed; using original image");
            image
        }
        Err(e) => {
            warn!(filter = %spec.kind, error = %e, "filter did not finish; using original image");
            image
        }
    }
}
