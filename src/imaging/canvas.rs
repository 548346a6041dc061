//! Drawing surfaces for the compositor.
//!
//! [`Surface`] is the seam between layout and pixels, in the same spirit as an
//! image backend: [`RasterCanvas`] paints into an `RgbaImage`, while tests use
//! a recording surface that only logs the calls. A surface is created fresh for
//! every render, so no paint state survives from one render to the next.

use super::calculations::pixel_bounds;
use super::text::{Fonts, GlyphMask, Weight, rasterize_line};
use crate::types::{CanvasSize, Rect};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Text direction relative to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    /// -90°: reads bottom to top.
    CounterClockwise,
    /// +90°: reads top to bottom.
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub weight: Weight,
    pub align: Align,
    pub color: Rgba<u8>,
}

/// Two-stop linear gradient between two canvas points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearGradient {
    pub start: (f32, f32),
    pub end: (f32, f32),
    pub from: Rgba<u8>,
    pub to: Rgba<u8>,
}

impl LinearGradient {
    /// Color at canvas point `(x, y)`, projected onto the gradient axis.
    pub fn color_at(&self, x: f32, y: f32) -> Rgba<u8> {
        let (dx, dy) = (self.end.0 - self.start.0, self.end.1 - self.start.1);
        let len2 = dx * dx + dy * dy;
        let t = if len2 <= f32::EPSILON {
            0.0
        } else {
            (((x - self.start.0) * dx + (y - self.start.1) * dy) / len2).clamp(0.0, 1.0)
        };
        let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
        Rgba([
            mix(self.from[0], self.to[0]),
            mix(self.from[1], self.to[1]),
            mix(self.from[2], self.to[2]),
            mix(self.from[3], self.to[3]),
        ])
    }
}

/// Drawing operations needed by the print template.
pub trait Surface {
    fn size(&self) -> CanvasSize;
    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>);
    fn fill_gradient(&mut self, gradient: &LinearGradient);
    /// Vertical dashed line centered on `x`, `dash` pixels on then `dash` off.
    fn dashed_vline(&mut self, x: f32, width: f32, dash: f32, color: Rgba<u8>);
    fn fill_triangle(&mut self, points: [(f32, f32); 3], color: Rgba<u8>);
    /// Stretch `image` into `rect`.
    fn draw_image(&mut self, image: &RgbaImage, rect: Rect);
    /// Draw one line of text. `anchor` is on the baseline, at the start,
    /// middle or end of the line depending on `style.align`.
    fn draw_text(&mut self, text: &str, anchor: (f32, f32), style: &TextStyle, rotation: Rotation);
}

/// Source-over blend of `color` into `dst`, scaled by `coverage` (0–255).
fn blend(dst: &mut Rgba<u8>, color: Rgba<u8>, coverage: u8) {
    let a = f32::from(coverage) / 255.0 * f32::from(color[3]) / 255.0;
    if a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let v = f32::from(dst[c]) * (1.0 - a) + f32::from(color[c]) * a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    let out_alpha = f32::from(dst[3]) + (255.0 - f32::from(dst[3])) * a;
    dst[3] = out_alpha.round().clamp(0.0, 255.0) as u8;
}

/// An in-memory RGBA canvas that starts out opaque white.
pub struct RasterCanvas {
    pixels: RgbaImage,
    fonts: Arc<Fonts>,
}

impl RasterCanvas {
    pub fn new(size: CanvasSize, fonts: Arc<Fonts>) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(size.width, size.height, Rgba([255, 255, 255, 255])),
            fonts,
        }
    }

    /// Continue painting on an existing image.
    pub fn from_image(pixels: RgbaImage, fonts: Arc<Fonts>) -> Self {
        Self { pixels, fonts }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Clip a float rect to the canvas, in whole pixels: `(x0, y0, x1, y1)`.
    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let (x, y, w, h) = pixel_bounds(rect);
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + i64::from(w)).min(i64::from(self.pixels.width()));
        let y1 = (y + i64::from(h)).min(i64::from(self.pixels.height()));
        (x0 < x1 && y0 < y1).then_some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    fn blend_mask(&mut self, mask: &image::GrayImage, left: i64, top: i64, color: Rgba<u8>) {
        let (cw, ch) = (i64::from(self.pixels.width()), i64::from(self.pixels.height()));
        for (mx, my, cov) in mask.enumerate_pixels() {
            if cov[0] == 0 {
                continue;
            }
            let (x, y) = (left + i64::from(mx), top + i64::from(my));
            if x < 0 || y < 0 || x >= cw || y >= ch {
                continue;
            }
            blend(self.pixels.get_pixel_mut(x as u32, y as u32), color, cov[0]);
        }
    }
}

/// Where the anchor falls along the line of text.
fn along(mask: &GlyphMask, align: Align) -> f32 {
    match align {
        Align::Left => 0.0,
        Align::Center => mask.width() as f32 / 2.0,
        Align::Right => mask.width() as f32,
    }
}

impl Surface for RasterCanvas {
    fn size(&self) -> CanvasSize {
        CanvasSize {
            width: self.pixels.width(),
            height: self.pixels.height(),
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                blend(self.pixels.get_pixel_mut(x, y), color, 255);
            }
        }
    }

    fn fill_gradient(&mut self, gradient: &LinearGradient) {
        let width = self.pixels.width() as usize;
        if width == 0 {
            return;
        }
        self.pixels
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_mut(4).enumerate() {
                    let c = gradient.color_at(x as f32 + 0.5, y as f32 + 0.5);
                    px.copy_from_slice(&c.0);
                }
            });
    }

    fn dashed_vline(&mut self, x: f32, width: f32, dash: f32, color: Rgba<u8>) {
        let left = (x - width / 2.0).round();
        let Some((x0, _, x1, _)) = self.clip(Rect::new(left, 0.0, width, 1.0)) else {
            return;
        };
        let period = dash.max(1.0);
        for y in 0..self.pixels.height() {
            if (y as f32 / period) as u32 % 2 != 0 {
                continue;
            }
            for px in x0..x1 {
                blend(self.pixels.get_pixel_mut(px, y), color, 255);
            }
        }
    }

    fn fill_triangle(&mut self, points: [(f32, f32); 3], color: Rgba<u8>) {
        let [a, b, c] = points;
        let min_x = a.0.min(b.0).min(c.0);
        let max_x = a.0.max(b.0).max(c.0);
        let min_y = a.1.min(b.1).min(c.1);
        let max_y = a.1.max(b.1).max(c.1);
        let Some((x0, y0, x1, y1)) = self.clip(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
        else {
            return;
        };
        let edge = |p: (f32, f32), q: (f32, f32), x: f32, y: f32| {
            (q.0 - p.0) * (y - p.1) - (q.1 - p.1) * (x - p.0)
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let e0 = edge(a, b, px, py);
                let e1 = edge(b, c, px, py);
                let e2 = edge(c, a, px, py);
                let inside = (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0)
                    || (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0);
                if inside {
                    blend(self.pixels.get_pixel_mut(x, y), color, 255);
                }
            }
        }
    }

    fn draw_image(&mut self, image: &RgbaImage, rect: Rect) {
        if image.width() == 0 || image.height() == 0 {
            return;
        }
        let (x, y, w, h) = pixel_bounds(rect);
        if (image.width(), image.height()) == (w, h) {
            imageops::overlay(&mut self.pixels, image, x, y);
        } else {
            let resized = imageops::resize(image, w, h, FilterType::Triangle);
            imageops::overlay(&mut self.pixels, &resized, x, y);
        }
    }

    fn draw_text(&mut self, text: &str, anchor: (f32, f32), style: &TextStyle, rotation: Rotation) {
        let Some((font, embolden)) = self.fonts.face(style.weight) else {
            debug!(text, "no font loaded; skipping caption");
            return;
        };
        let Some(mask) = rasterize_line(font, text, style.size, embolden) else {
            return;
        };
        let offset = along(&mask, style.align);
        let baseline = mask.baseline as f32;
        let (ax, ay) = anchor;

        match rotation {
            Rotation::None => {
                let left = (ax - offset).round() as i64;
                let top = (ay - baseline).round() as i64;
                self.blend_mask(&mask.coverage, left, top, style.color);
            }
            Rotation::CounterClockwise => {
                // (mx, my) -> (my, W - 1 - mx)
                let rotated = imageops::rotate270(&mask.coverage);
                let left = (ax - baseline).round() as i64;
                let top = (ay - (mask.width() as f32 - offset)).round() as i64;
                self.blend_mask(&rotated, left, top, style.color);
            }
            Rotation::Clockwise => {
                // (mx, my) -> (H - 1 - my, mx)
                let rotated = imageops::rotate90(&mask.coverage);
                let left = (ax - (mask.height() as f32 - baseline)).round() as i64;
                let top = (ay - offset).round() as i64;
                self.blend_mask(&rotated, left, top, style.color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(w: u32, h: u32) -> RasterCanvas {
        RasterCanvas::new(
            CanvasSize {
                width: w,
                height: h,
            },
            Arc::new(Fonts::none()),
        )
    }

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn new_canvas_is_white() {
        let c = canvas(4, 4);
        assert!(c.image().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn fill_rect_clips_to_canvas() {
        let mut c = canvas(10, 10);
        c.fill_rect(Rect::new(-5.0, 8.0, 20.0, 20.0), RED);
        assert_eq!(*c.image().get_pixel(0, 9), RED);
        assert_eq!(*c.image().get_pixel(9, 8), RED);
        assert_eq!(*c.image().get_pixel(0, 7), WHITE);
    }

    #[test]
    fn vertical_gradient_runs_top_to_bottom() {
        let mut c = canvas(4, 100);
        c.fill_gradient(&LinearGradient {
            start: (0.0, 0.0),
            end: (0.0, 100.0),
            from: BLACK,
            to: WHITE,
        });
        let top = c.image().get_pixel(2, 0)[0];
        let mid = c.image().get_pixel(2, 50)[0];
        let bottom = c.image().get_pixel(2, 99)[0];
        assert!(top < 5);
        assert!((120..=135).contains(&mid));
        assert!(bottom > 250);
        // Constant across a row
        assert_eq!(c.image().get_pixel(0, 50), c.image().get_pixel(3, 50));
    }

    #[test]
    fn degenerate_gradient_uses_start_color() {
        let g = LinearGradient {
            start: (1.0, 1.0),
            end: (1.0, 1.0),
            from: RED,
            to: WHITE,
        };
        assert_eq!(g.color_at(50.0, 50.0), RED);
    }

    #[test]
    fn dashed_line_alternates_every_dash() {
        let mut c = canvas(20, 40);
        c.dashed_vline(10.0, 2.0, 10.0, BLACK);
        let img = c.image();
        assert_eq!(*img.get_pixel(9, 0), BLACK);
        assert_eq!(*img.get_pixel(10, 9), BLACK);
        assert_eq!(*img.get_pixel(10, 10), WHITE);
        assert_eq!(*img.get_pixel(10, 19), WHITE);
        assert_eq!(*img.get_pixel(10, 20), BLACK);
        assert_eq!(*img.get_pixel(5, 0), WHITE);
    }

    #[test]
    fn triangle_fills_interior_only() {
        let mut c = canvas(20, 20);
        c.fill_triangle([(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)], RED);
        assert_eq!(*c.image().get_pixel(2, 2), RED);
        assert_eq!(*c.image().get_pixel(18, 18), WHITE);
    }

    #[test]
    fn draw_image_stretches_into_rect() {
        let mut c = canvas(20, 20);
        let src = RgbaImage::from_pixel(2, 2, RED);
        c.draw_image(&src, Rect::new(5.0, 5.0, 10.0, 4.0));
        assert_eq!(*c.image().get_pixel(5, 5), RED);
        assert_eq!(*c.image().get_pixel(14, 8), RED);
        assert_eq!(*c.image().get_pixel(15, 5), WHITE);
        assert_eq!(*c.image().get_pixel(5, 9), WHITE);
    }

    #[test]
    fn text_without_fonts_is_a_no_op() {
        let mut c = canvas(50, 50);
        let style = TextStyle {
            size: 16.0,
            weight: Weight::Bold,
            align: Align::Center,
            color: BLACK,
        };
        c.draw_text("hello", (25.0, 25.0), &style, Rotation::Clockwise);
        assert!(c.image().pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn blend_respects_coverage() {
        let mut px = WHITE;
        blend(&mut px, BLACK, 0);
        assert_eq!(px, WHITE);
        blend(&mut px, BLACK, 255);
        assert_eq!(px, BLACK);
    }
}
