//! The composition engine: photos, frame, captions and QR in, print out.
//!
//! A render is a pure function of its [`RenderRequest`]. Each call paints onto
//! a fresh [`Surface`]; nothing is shared between renders except the optional
//! [`FilterCache`]. Drawing happens in a fixed order:
//!
//! ```text
//! 1. background     frame palette (solid / gradient / film strip / untouched)
//! 2. divider        dashed center line + two cut-guide triangles
//! 3. slots          white backing + filtered photo, per placement
//! 4. side captions  vertical text beside every slot, rotated ±90°
//! 5. bottom         korean headline + bottom text under each half
//! 6. watermarks     top text in both top corners
//! 7. QR             export only, two stamps above the caption row
//! ```
//!
//! Every collaborator that can be slow or fail is bounded. Slot preparation
//! (filter + resample) runs on workers under the slot deadline; the filter
//! inside it has its own deadline and falls back to the unfiltered photo.
//! A slot that still fails is left as its white backing. A QR provider that
//! fails or stalls skips the QR step. If composition itself blows up, the
//! caller gets a white canvas carrying an error caption instead of nothing.

use crate::cache::{FilterCache, hash_image, hash_slot_params};
use crate::deadline::{self, Pending};
use crate::imaging::calculations::{
    DASH_LENGTH, FONT_BOTTOM, FONT_ERROR, FONT_HEADLINE, FONT_VERTICAL, FONT_WATERMARK, Layout,
    pixel_bounds,
};
use crate::imaging::canvas::{Align, RasterCanvas, Rotation, Surface, TextStyle};
use crate::imaging::filters::{FilterEngine, PixelFilter, apply_filter_with_deadline};
use crate::imaging::frames::paint_background;
use crate::imaging::qr::{QrCodeProvider, QrProvider};
use crate::imaging::text::{Fonts, Weight};
use crate::types::{
    CanvasSize, FilterSpec, FrameStyle, GRID_COLS, Placement, Rect, SLOT_COUNT, TextBlock,
};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Caption shown on the fallback canvas.
pub const ERROR_CAPTION: &str = "Preview generation error - please try again";

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("canvas has no pixels ({width}x{height})")]
    EmptyCanvas { width: u32, height: u32 },
    #[error("surface is {actual:?} but the request is for {requested:?}")]
    SizeMismatch {
        requested: CanvasSize,
        actual: CanvasSize,
    },
}

/// Upper bounds on the slow parts of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTimeouts {
    pub filter: Duration,
    pub slot: Duration,
    pub qr: Duration,
}

impl Default for RenderTimeouts {
    fn default() -> Self {
        Self {
            filter: Duration::from_millis(3000),
            slot: Duration::from_millis(5000),
            qr: Duration::from_millis(2000),
        }
    }
}

/// Everything a render depends on.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// One entry per slot, row-major. `None` leaves the slot empty.
    pub slots: Vec<Option<Arc<RgbaImage>>>,
    pub placements: Vec<Placement>,
    pub frame: FrameStyle,
    pub text: TextBlock,
    pub filter: FilterSpec,
    pub size: CanvasSize,
    /// Present only for exports.
    pub qr_payload: Option<String>,
}

impl RenderRequest {
    /// A request with default decoration, each photo shown in both columns.
    pub fn new(images: &[Arc<RgbaImage>], size: CanvasSize) -> Self {
        let loaded: Vec<_> = images.iter().cloned().map(Some).collect();
        let slots = duplicate_for_slots(&loaded);
        let placements = (0..slots.len()).map(Placement::default_for_slot).collect();
        Self {
            slots,
            placements,
            frame: FrameStyle::default(),
            text: TextBlock::default(),
            filter: FilterSpec::default(),
            size,
            qr_payload: None,
        }
    }

    /// The placement for slot `index`, falling back when missing or invalid.
    pub fn placement(&self, index: usize) -> Placement {
        match self.placements.get(index) {
            Some(p) if p.is_valid() => *p,
            Some(p) => {
                warn!(slot = index, placement = ?p, "invalid placement; using fallback");
                Placement::fallback_for_slot(index)
            }
            None => Placement::fallback_for_slot(index),
        }
    }
}

/// Lay photos out so each one fills a whole row: `[a, a, b, b, ...]`.
///
/// A photo that failed to load leaves its whole row empty. Never produces
/// more than [`SLOT_COUNT`] slots.
pub fn duplicate_for_slots(images: &[Option<Arc<RgbaImage>>]) -> Vec<Option<Arc<RgbaImage>>> {
    images
        .iter()
        .flat_map(|img| std::iter::repeat_n(img.clone(), GRID_COLS))
        .take(SLOT_COUNT)
        .collect()
}

/// The composition engine with its collaborators.
#[derive(Clone)]
pub struct Compositor {
    filter: Arc<dyn PixelFilter>,
    qr: Arc<dyn QrProvider>,
    fonts: Arc<Fonts>,
    cache: Option<Arc<FilterCache>>,
    timeouts: RenderTimeouts,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("fonts", &self.fonts)
            .field("cache", &self.cache.is_some())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Compositor {
    pub fn new(fonts: Arc<Fonts>) -> Self {
        Self {
            filter: Arc::new(FilterEngine),
            qr: Arc::new(QrCodeProvider),
            fonts,
            cache: None,
            timeouts: RenderTimeouts::default(),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn PixelFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_qr(mut self, qr: Arc<dyn QrProvider>) -> Self {
        self.qr = qr;
        self
    }

    pub fn with_cache(mut self, cache: Arc<FilterCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_timeouts(mut self, timeouts: RenderTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn cache(&self) -> Option<&Arc<FilterCache>> {
        self.cache.as_ref()
    }

    /// Render onto a fresh raster canvas. Always returns an image.
    pub fn render(&self, request: &RenderRequest) -> RgbaImage {
        let started = Instant::now();
        let mut canvas = RasterCanvas::new(request.size, Arc::clone(&self.fonts));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.compose(&mut canvas, request)));
        match outcome {
            Ok(Ok(())) => {
                debug!(
                    width = request.size.width,
                    height = request.size.height,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "render complete"
                );
                canvas.into_image()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "render failed; drawing error canvas");
                self.error_canvas(request.size)
            }
            Err(_) => {
                warn!("render panicked; drawing error canvas");
                self.error_canvas(request.size)
            }
        }
    }

    /// White canvas with a centered error caption.
    pub fn error_canvas(&self, size: CanvasSize) -> RgbaImage {
        let size = CanvasSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let mut canvas = RasterCanvas::new(size, Arc::clone(&self.fonts));
        draw_error_caption(&mut canvas);
        canvas.into_image()
    }

    /// Stamp QR codes onto an already rendered export.
    ///
    /// Exports are uploaded without the QR first, so the QR can carry the
    /// uploaded URL; this adds it afterwards.
    pub fn stamp_qr_onto(&self, image: RgbaImage, payload: &str) -> RgbaImage {
        let size = CanvasSize {
            width: image.width(),
            height: image.height(),
        };
        let mut canvas = RasterCanvas::from_image(image, Arc::clone(&self.fonts));
        self.stamp_qr(&mut canvas, &Layout::new(size), payload);
        canvas.into_image()
    }

    /// Paint the full print onto `surface`.
    pub fn compose(&self, surface: &mut impl Surface, request: &RenderRequest) -> Result<(), ComposeError> {
        let size = request.size;
        if size.width == 0 || size.height == 0 {
            return Err(ComposeError::EmptyCanvas {
                width: size.width,
                height: size.height,
            });
        }
        if surface.size() != size {
            return Err(ComposeError::SizeMismatch {
                requested: size,
                actual: surface.size(),
            });
        }

        let layout = Layout::new(size);
        let ink = request.frame.ink();

        // Start the slow work first so it overlaps the cheap drawing.
        let pending = self.prepare_slots(request, &layout);

        paint_background(surface, &layout, request.frame);
        draw_divider(surface, &layout, ink);
        self.draw_slots(surface, pending);
        draw_side_captions(surface, &layout, request, ink);
        draw_bottom_captions(surface, &layout, &request.text, ink);
        draw_watermarks(surface, &layout, &request.text, ink);

        if let Some(payload) = &request.qr_payload {
            self.stamp_qr(surface, &layout, payload);
        }
        Ok(())
    }

    /// Kick off filter + resample for every occupied slot.
    fn prepare_slots(&self, request: &RenderRequest, layout: &Layout) -> Vec<PreparedSlot> {
        request
            .slots
            .iter()
            .enumerate()
            .take(SLOT_COUNT)
            .filter_map(|(index, slot)| {
                let image = slot.as_ref()?;
                let rect = layout.photo_rect(index, &request.placement(index));
                let (_, _, width, height) = pixel_bounds(rect);
                let work = SlotWork {
                    image: Arc::clone(image),
                    spec: request.filter,
                    width,
                    height,
                    filter: Arc::clone(&self.filter),
                    cache: self.cache.clone(),
                    filter_timeout: self.timeouts.filter,
                };
                Some(PreparedSlot {
                    index,
                    rect,
                    pending: deadline::spawn("slot", move || work.run()),
                })
            })
            .collect()
    }

    fn draw_slots(&self, surface: &mut impl Surface, pending: Vec<PreparedSlot>) {
        let deadline = Instant::now() + self.timeouts.slot;
        for slot in pending {
            surface.fill_rect(slot.rect, WHITE);
            match slot.pending.wait_until(deadline) {
                Ok(image) => surface.draw_image(&image, slot.rect),
                Err(e) => warn!(slot = slot.index, error = %e, "skipping slot"),
            }
        }
    }

    fn stamp_qr(&self, surface: &mut impl Surface, layout: &Layout, payload: &str) {
        let rects = layout.qr_rects();
        let (_, _, side, _) = pixel_bounds(rects[0]);
        let qr = Arc::clone(&self.qr);
        let payload = payload.to_string();
        match deadline::run_with_deadline("qr", self.timeouts.qr, move || qr.render(&payload, side)) {
            Ok(Ok(code)) => {
                for rect in rects {
                    surface.draw_image(&code, rect);
                }
            }
            Ok(Err(e)) => warn!(error = %e, "QR generation failed; skipping QR"),
            Err(e) => warn!(error = %e, "QR generation did not finish; skipping QR"),
        }
    }
}

/// A slot whose image is being prepared on a worker.
struct PreparedSlot {
    index: usize,
    rect: Rect,
    pending: Pending<Arc<RgbaImage>>,
}

/// Everything a slot worker needs, owned.
struct SlotWork {
    image: Arc<RgbaImage>,
    spec: FilterSpec,
    width: u32,
    height: u32,
    filter: Arc<dyn PixelFilter>,
    cache: Option<Arc<FilterCache>>,
    filter_timeout: Duration,
}

impl SlotWork {
    fn run(self) -> Arc<RgbaImage> {
        let keys = self.cache.as_ref().map(|cache| {
            let keys = (
                hash_image(&self.image),
                hash_slot_params(self.spec, self.width, self.height),
            );
            (Arc::clone(cache), keys)
        });
        if let Some((cache, (source, params))) = &keys
            && let Some(hit) = cache.get(source, params)
        {
            return hit;
        }

        let filtered = apply_filter_with_deadline(
            self.filter,
            Arc::clone(&self.image),
            self.spec,
            self.filter_timeout,
        );
        // The original coming back for a real filter means the filter gave up.
        let filter_failed = !self.spec.is_identity() && Arc::ptr_eq(&filtered, &self.image);

        let prepared = if filtered.dimensions() == (self.width, self.height) {
            filtered
        } else {
            Arc::new(imageops::resize(
                filtered.as_ref(),
                self.width,
                self.height,
                FilterType::Triangle,
            ))
        };

        if !filter_failed && let Some((cache, (source, params))) = keys {
            cache.insert(&source, &params, Arc::clone(&prepared));
        }
        prepared
    }
}

fn draw_divider(surface: &mut impl Surface, layout: &Layout, ink: Rgba<u8>) {
    let w = surface.size().width as f32;
    surface.dashed_vline(w / 2.0, layout.divider_width(), DASH_LENGTH, ink);
    for triangle in layout.guide_triangles() {
        surface.fill_triangle(triangle, ink);
    }
}

fn draw_side_captions(surface: &mut impl Surface, layout: &Layout, request: &RenderRequest, ink: Rgba<u8>) {
    let text = &request.text.vertical_text;
    if text.is_empty() {
        return;
    }
    let style = TextStyle {
        size: layout.px(FONT_VERTICAL),
        weight: Weight::Regular,
        align: Align::Center,
        color: ink,
    };
    for (index, slot) in request.slots.iter().enumerate().take(SLOT_COUNT) {
        if slot.is_none() {
            continue;
        }
        let rotation = if index % GRID_COLS == 0 {
            Rotation::CounterClockwise
        } else {
            Rotation::Clockwise
        };
        surface.draw_text(text, layout.vertical_caption_anchor(index), &style, rotation);
    }
}

fn draw_bottom_captions(surface: &mut impl Surface, layout: &Layout, text: &TextBlock, ink: Rgba<u8>) {
    let baseline = layout.caption_baseline();
    let headline = TextStyle {
        size: layout.px(FONT_HEADLINE),
        weight: Weight::Bold,
        align: Align::Center,
        color: ink,
    };
    let footer = TextStyle {
        size: layout.px(FONT_BOTTOM),
        weight: Weight::Regular,
        ..headline
    };
    for x in layout.column_centers() {
        if !text.korean_text.is_empty() {
            surface.draw_text(&text.korean_text, (x, baseline), &headline, Rotation::None);
        }
        if !text.bottom_text.is_empty() {
            surface.draw_text(
                &text.bottom_text,
                (x, baseline + layout.px(40.0)),
                &footer,
                Rotation::None,
            );
        }
    }
}

fn draw_watermarks(surface: &mut impl Surface, layout: &Layout, text: &TextBlock, ink: Rgba<u8>) {
    if text.top_text.is_empty() {
        return;
    }
    let [right, left] = layout.watermark_anchors();
    let style = TextStyle {
        size: layout.px(FONT_WATERMARK),
        weight: Weight::Regular,
        align: Align::Right,
        color: ink,
    };
    surface.draw_text(&text.top_text, right, &style, Rotation::None);
    let style = TextStyle {
        align: Align::Left,
        ..style
    };
    surface.draw_text(&text.top_text, left, &style, Rotation::None);
}

fn draw_error_caption(surface: &mut impl Surface) {
    let size = surface.size();
    let layout = Layout::new(size);
    let (w, h) = (size.width as f32, size.height as f32);
    surface.fill_rect(Rect::new(0.0, 0.0, w, h), WHITE);
    let style = TextStyle {
        size: layout.px(FONT_ERROR),
        weight: Weight::Regular,
        align: Align::Center,
        color: BLACK,
    };
    surface.draw_text(ERROR_CAPTION, (w / 2.0, h / 2.0), &style, Rotation::None);
}
