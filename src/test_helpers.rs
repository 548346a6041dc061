//! Shared test utilities for the snapbooth test suite.
//!
//! Provides synthetic images, misbehaving collaborators for the fallback
//! paths, and a [`RecordingSurface`] that logs draw calls instead of painting
//! so composition can be asserted structurally.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut surface = RecordingSurface::new(CanvasSize::PREVIEW);
//! compositor.compose(&mut surface, &request).unwrap();
//! assert_eq!(surface.images().len(), 8);
//! assert!(surface.texts().iter().any(|t| t.text == "Tanauan Clicks"));
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::{Rgba, RgbaImage};

use crate::imaging::canvas::{LinearGradient, Rotation, Surface, TextStyle};
use crate::imaging::filters::{FilterError, PixelFilter, apply_filter};
use crate::imaging::qr::{QrError, QrProvider};
use crate::types::{CanvasSize, FilterSpec, Rect};

// =========================================================================
// Synthetic images
// =========================================================================

pub fn solid_image(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color)
}

/// A deterministic image whose channels vary across both axes.
pub fn gradient_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let b = ((x + y) * 127 / (width + height).max(1)) as u8;
        Rgba([r, g, b, 255])
    })
}

/// Four visibly different solid photos, wrapped for the compositor.
pub fn four_photos() -> Vec<Arc<RgbaImage>> {
    [
        Rgba([220, 40, 40, 255]),
        Rgba([40, 200, 60, 255]),
        Rgba([40, 60, 220, 255]),
        Rgba([230, 200, 40, 255]),
    ]
    .into_iter()
    .map(|c| Arc::new(solid_image(64, 48, c)))
    .collect()
}

// =========================================================================
// Misbehaving collaborators
// =========================================================================

/// A filter that sleeps before doing the real work.
#[derive(Debug, Clone, Copy)]
pub struct StallingFilter {
    delay: Duration,
}

impl StallingFilter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl PixelFilter for StallingFilter {
    fn apply(&self, image: &RgbaImage, spec: FilterSpec) -> Result<RgbaImage, FilterError> {
        thread::sleep(self.delay);
        Ok(apply_filter(image, spec))
    }
}

/// A filter that always reports failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingFilter;

impl PixelFilter for FailingFilter {
    fn apply(&self, _image: &RgbaImage, _spec: FilterSpec) -> Result<RgbaImage, FilterError> {
        Err(FilterError::Failed("injected failure".into()))
    }
}

/// A QR provider that always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingQr;

impl QrProvider for FailingQr {
    fn render(&self, _payload: &str, _size: u32) -> Result<RgbaImage, QrError> {
        Err(QrError::Encode("injected failure".into()))
    }
}

/// A QR provider that never answers in time.
#[derive(Debug, Clone, Copy)]
pub struct StallingQr {
    delay: Duration,
}

impl StallingQr {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl QrProvider for StallingQr {
    fn render(&self, _payload: &str, size: u32) -> Result<RgbaImage, QrError> {
        thread::sleep(self.delay);
        Ok(solid_image(size, size, Rgba([0, 0, 0, 255])))
    }
}

/// A QR provider that returns a flat marker color, so stamps can be located.
#[derive(Debug, Clone, Copy)]
pub struct MarkerQr(pub Rgba<u8>);

impl QrProvider for MarkerQr {
    fn render(&self, _payload: &str, size: u32) -> Result<RgbaImage, QrError> {
        Ok(solid_image(size, size, self.0))
    }
}

// =========================================================================
// Recording surface
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedText {
    pub text: String,
    pub anchor: (f32, f32),
    pub style: TextStyle,
    pub rotation: Rotation,
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    FillRect {
        rect: Rect,
        color: Rgba<u8>,
    },
    Gradient(LinearGradient),
    DashedLine {
        x: f32,
        width: f32,
        dash: f32,
        color: Rgba<u8>,
    },
    Triangle {
        points: [(f32, f32); 3],
        color: Rgba<u8>,
    },
    Image {
        rect: Rect,
        /// Top-left pixel of the drawn image, to tell photos apart.
        sample: Rgba<u8>,
        dimensions: (u32, u32),
    },
    Text(RecordedText),
}

/// A [`Surface`] that records every call in order.
#[derive(Debug)]
pub struct RecordingSurface {
    size: CanvasSize,
    pub ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new(size: CanvasSize) -> Self {
        Self {
            size,
            ops: Vec::new(),
        }
    }

    pub fn images(&self) -> Vec<(Rect, Rgba<u8>)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Image { rect, sample, .. } => Some((*rect, *sample)),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<&RecordedText> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Index of the first op matching `pred`. Panics if none does.
    pub fn position(&self, what: &str, pred: impl Fn(&DrawOp) -> bool) -> usize {
        self.ops
            .iter()
            .position(pred)
            .unwrap_or_else(|| panic!("no {what} op recorded. Ops: {:#?}", self.ops))
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> CanvasSize {
        self.size
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }

    fn fill_gradient(&mut self, gradient: &LinearGradient) {
        self.ops.push(DrawOp::Gradient(*gradient));
    }

    fn dashed_vline(&mut self, x: f32, width: f32, dash: f32, color: Rgba<u8>) {
        self.ops.push(DrawOp::DashedLine {
            x,
            width,
            dash,
            color,
        });
    }

    fn fill_triangle(&mut self, points: [(f32, f32); 3], color: Rgba<u8>) {
        self.ops.push(DrawOp::Triangle { points, color });
    }

    fn draw_image(&mut self, image: &RgbaImage, rect: Rect) {
        let sample = image
            .get_pixel_checked(0, 0)
            .copied()
            .unwrap_or(Rgba([0, 0, 0, 0]));
        self.ops.push(DrawOp::Image {
            rect,
            sample,
            dimensions: image.dimensions(),
        });
    }

    fn draw_text(&mut self, text: &str, anchor: (f32, f32), style: &TextStyle, rotation: Rotation) {
        self.ops.push(DrawOp::Text(RecordedText {
            text: text.to_string(),
            anchor,
            style: *style,
            rotation,
        }));
    }
}
