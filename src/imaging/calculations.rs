//! Pure layout math for the print template.
//!
//! All functions here are pure and testable without any pixels. Every length
//! is expressed in preview units (a 600×900 canvas) and multiplied by
//! [`Layout::scale`], so the export canvas is an exact 2× of the preview.

use crate::types::{CanvasSize, GRID_COLS, GRID_ROWS, Placement, Rect};

/// Margin around the photo grid, in preview pixels.
const PADDING: f32 = 50.0;
/// Height reserved under the grid for the bottom captions.
const CAPTION_ROW: f32 = 100.0;
/// Dash and gap length of the center divider. Not scaled.
pub const DASH_LENGTH: f32 = 10.0;

/// Font sizes, in preview pixels.
pub const FONT_VERTICAL: f32 = 16.0;
pub const FONT_HEADLINE: f32 = 22.0;
pub const FONT_BOTTOM: f32 = 17.0;
pub const FONT_WATERMARK: f32 = 20.0;
pub const FONT_ERROR: f32 = 20.0;

/// Side of a QR stamp, in preview pixels.
const QR_SIZE: f32 = 60.0;

/// Film-strip perforation geometry, in preview pixels.
const PERF_SIZE: f32 = 30.0;
const PERF_INSET: f32 = 20.0;
const PERF_SPACING: f32 = 60.0;

/// Resolved geometry for one canvas size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub size: CanvasSize,
    pub scale: f32,
}

impl Layout {
    pub fn new(size: CanvasSize) -> Self {
        Self {
            size,
            scale: size.scale(),
        }
    }

    fn w(&self) -> f32 {
        self.size.width as f32
    }

    fn h(&self) -> f32 {
        self.size.height as f32
    }

    /// Scale a preview-unit length to this canvas.
    pub fn px(&self, preview_units: f32) -> f32 {
        preview_units * self.scale
    }

    pub fn padding(&self) -> f32 {
        self.px(PADDING)
    }

    pub fn caption_row(&self) -> f32 {
        self.px(CAPTION_ROW)
    }

    pub fn cell_width(&self) -> f32 {
        (self.w() - self.padding() * 2.0) / GRID_COLS as f32
    }

    pub fn cell_height(&self) -> f32 {
        (self.h() - self.padding() * 2.0 - self.caption_row()) / GRID_ROWS as f32
    }

    /// Grid cell bounds for slot `index` (row-major, two columns).
    pub fn cell(&self, index: usize) -> Rect {
        let row = index / GRID_COLS;
        let col = index % GRID_COLS;
        let (cw, ch) = (self.cell_width(), self.cell_height());
        Rect::new(
            self.padding() + col as f32 * cw,
            self.padding() + row as f32 * ch,
            cw,
            ch,
        )
    }

    /// Destination rectangle of a photo inside its cell.
    pub fn photo_rect(&self, index: usize, placement: &Placement) -> Rect {
        placement_rect(self.cell(index), placement)
    }

    /// Baseline of the headline caption row.
    pub fn caption_baseline(&self) -> f32 {
        self.h() - self.caption_row() / 2.0
    }

    /// Horizontal centers of the two print halves.
    pub fn column_centers(&self) -> [f32; 2] {
        [self.w() / 4.0, self.w() / 4.0 * 3.0]
    }

    /// Anchor for the rotated side caption of slot `index`.
    pub fn vertical_caption_anchor(&self, index: usize) -> (f32, f32) {
        let cell = self.cell(index);
        let y = cell.y + cell.height / 2.0;
        if index % GRID_COLS == 0 {
            (cell.x - self.px(15.0), y)
        } else {
            (cell.right() + self.px(15.0), y)
        }
    }

    /// Right- and left-aligned watermark anchors (right first).
    pub fn watermark_anchors(&self) -> [(f32, f32); 2] {
        let y = self.px(30.0);
        [(self.w() - self.px(20.0), y), (self.px(20.0), y)]
    }

    /// Square QR stamps above the caption row: left-of-center and right edge.
    pub fn qr_rects(&self) -> [Rect; 2] {
        let size = self.px(QR_SIZE);
        let y = self.caption_baseline() - self.px(50.0);
        let offset = self.px(70.0);
        [
            Rect::new(self.w() / 2.0 - offset, y, size, size),
            Rect::new(self.w() - offset, y, size, size),
        ]
    }

    /// Cut-guide triangles at the bottom corners.
    pub fn guide_triangles(&self) -> [[(f32, f32); 3]; 2] {
        let (w, h) = (self.w(), self.h());
        let (a, b, c) = (self.px(18.0), self.px(28.0), self.px(23.0));
        [
            [(a, h - a), (b, h - a), (c, h - b)],
            [(w - a, h - a), (w - b, h - a), (w - c, h - b)],
        ]
    }

    /// Stroke width of the center divider, at least one pixel.
    pub fn divider_width(&self) -> f32 {
        self.px(1.2).round().max(1.0)
    }

    /// Film-strip perforations: left column offset by one spacing, right by two.
    pub fn perforations(&self) -> Vec<Rect> {
        let size = self.px(PERF_SIZE);
        let inset = self.px(PERF_INSET);
        let spacing = self.px(PERF_SPACING);
        let mut holes = Vec::new();
        let mut y = spacing;
        while y < self.h() {
            holes.push(Rect::new(inset, y, size, size));
            y += spacing * 2.0;
        }
        let mut y = spacing * 2.0;
        while y < self.h() {
            holes.push(Rect::new(self.w() - inset - size, y, size, size));
            y += spacing * 2.0;
        }
        holes
    }
}

/// Resolve a percentage placement against a cell.
///
/// A positive `right` anchors the rectangle's right edge at
/// `cell.right() - right% * cell.width`, ignoring `left`.
pub fn placement_rect(cell: Rect, placement: &Placement) -> Rect {
    let width = cell.width * placement.width / 100.0;
    let height = cell.height * placement.height / 100.0;
    let x = match placement.right_anchor() {
        Some(right) => cell.right() - cell.width * right / 100.0 - width,
        None => cell.x + cell.width * placement.left / 100.0,
    };
    let y = cell.y + cell.height * placement.top / 100.0;
    Rect::new(x, y, width, height)
}

/// Snap a float rectangle to whole pixels: `(x, y, width, height)`.
///
/// Width and height are at least one pixel.
pub fn pixel_bounds(rect: Rect) -> (i64, i64, u32, u32) {
    let x0 = rect.x.round();
    let y0 = rect.y.round();
    let x1 = rect.right().round();
    let y1 = rect.bottom().round();
    let w = (x1 - x0).max(1.0) as u32;
    let h = (y1 - y0).max(1.0) as u32;
    (x0 as i64, y0 as i64, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview() -> Layout {
        Layout::new(CanvasSize::PREVIEW)
    }

    fn export() -> Layout {
        Layout::new(CanvasSize::EXPORT)
    }

    #[test]
    fn preview_cells_have_expected_size() {
        let l = preview();
        assert_eq!(l.cell_width(), 250.0);
        assert_eq!(l.cell_height(), 175.0);
        assert_eq!(l.cell(0), Rect::new(50.0, 50.0, 250.0, 175.0));
        assert_eq!(l.cell(1), Rect::new(300.0, 50.0, 250.0, 175.0));
        assert_eq!(l.cell(7), Rect::new(300.0, 575.0, 250.0, 175.0));
    }

    #[test]
    fn export_geometry_is_exactly_double() {
        let (p, e) = (preview(), export());
        for i in 0..8 {
            let (a, b) = (p.cell(i), e.cell(i));
            assert_eq!(b, Rect::new(a.x * 2.0, a.y * 2.0, a.width * 2.0, a.height * 2.0));
        }
        assert_eq!(e.qr_rects()[0].width, p.qr_rects()[0].width * 2.0);
        assert_eq!(e.caption_baseline(), p.caption_baseline() * 2.0);
        assert_eq!(e.px(FONT_HEADLINE), p.px(FONT_HEADLINE) * 2.0);
        assert_eq!(e.watermark_anchors()[0].0, p.watermark_anchors()[0].0 * 2.0);
    }

    #[test]
    fn export_qr_positions() {
        let [left, right] = export().qr_rects();
        assert_eq!(left, Rect::new(460.0, 1600.0, 120.0, 120.0));
        assert_eq!(right, Rect::new(1060.0, 1600.0, 120.0, 120.0));
    }

    #[test]
    fn left_anchored_placement() {
        let cell = Rect::new(50.0, 50.0, 250.0, 175.0);
        let p = Placement::default_for_slot(0);
        let r = placement_rect(cell, &p);
        assert_eq!(r, Rect::new(57.5, 57.0, 212.5, 148.75));
    }

    #[test]
    fn right_anchor_ignores_left() {
        let cell = Rect::new(300.0, 50.0, 250.0, 175.0);
        let base = Placement {
            width: 80.0,
            height: 80.0,
            top: 0.0,
            left: 42.0,
            right: Some(10.0),
        };
        let moved = Placement { left: 3.0, ..base };
        let a = placement_rect(cell, &base);
        let b = placement_rect(cell, &moved);
        assert_eq!(a, b);
        // Right edge sits at cell_right - 10% of cell width
        assert!((a.right() - (550.0 - 25.0)).abs() < 1e-3);
    }

    #[test]
    fn zero_right_falls_back_to_left() {
        let cell = Rect::new(0.0, 0.0, 100.0, 100.0);
        let p = Placement {
            width: 50.0,
            height: 50.0,
            top: 0.0,
            left: 20.0,
            right: Some(0.0),
        };
        assert_eq!(placement_rect(cell, &p).x, 20.0);
    }

    #[test]
    fn vertical_caption_anchors_sit_outside_cells() {
        let l = preview();
        assert_eq!(l.vertical_caption_anchor(0), (35.0, 137.5));
        assert_eq!(l.vertical_caption_anchor(1), (565.0, 137.5));
    }

    #[test]
    fn perforations_alternate_sides() {
        let holes = preview().perforations();
        let left: Vec<_> = holes.iter().filter(|r| r.x == 20.0).collect();
        let right: Vec<_> = holes.iter().filter(|r| r.x == 550.0).collect();
        assert_eq!(left.first().map(|r| r.y), Some(60.0));
        assert_eq!(right.first().map(|r| r.y), Some(120.0));
        assert_eq!(left.len() + right.len(), holes.len());
        assert!(holes.iter().all(|r| r.y < 900.0));
    }

    #[test]
    fn divider_is_never_thinner_than_a_pixel() {
        assert_eq!(preview().divider_width(), 1.0);
        assert_eq!(export().divider_width(), 2.0);
    }

    #[test]
    fn pixel_bounds_rounds_edges() {
        let (x, y, w, h) = pixel_bounds(Rect::new(57.5, 57.0, 212.5, 148.75));
        assert_eq!((x, y), (58, 57));
        assert_eq!((w, h), (212, 149));
    }

    #[test]
    fn pixel_bounds_never_zero_sized() {
        let (_, _, w, h) = pixel_bounds(Rect::new(0.2, 0.2, 0.1, 0.1));
        assert_eq!((w, h), (1, 1));
    }
}
