//! Frame palettes: what each [`FrameStyle`] paints behind the photos.

use super::calculations::Layout;
use super::canvas::{LinearGradient, Surface};
use crate::types::{FrameStyle, Rect};
use image::Rgba;

const fn rgb(hex: u32) -> Rgba<u8> {
    Rgba([(hex >> 16) as u8, (hex >> 8) as u8, hex as u8, 255])
}

/// Perforation color on the film strip.
pub const PERFORATION: Rgba<u8> = rgb(0x333333);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientDirection {
    /// Top edge to bottom edge.
    Vertical,
    /// Top-left corner to bottom-right corner.
    Diagonal,
}

/// Resolved background treatment for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    /// Leave the white canvas as it is.
    Untouched,
    Solid(Rgba<u8>),
    Gradient {
        from: Rgba<u8>,
        to: Rgba<u8>,
        direction: GradientDirection,
    },
    FilmStrip,
}

pub fn background_for(frame: FrameStyle) -> Background {
    use Background::*;
    let gradient = |from: u32, to: u32| Gradient {
        from: rgb(from),
        to: rgb(to),
        direction: GradientDirection::Diagonal,
    };
    match frame {
        FrameStyle::None | FrameStyle::Polaroid => Untouched,
        FrameStyle::Simple => Solid(rgb(0xFFFFFF)),
        FrameStyle::Black => Solid(rgb(0x000000)),
        FrameStyle::Vintage => Solid(rgb(0xF5F0E5)),
        FrameStyle::Modern => Solid(rgb(0xE0E0E0)),
        FrameStyle::Amber => Solid(rgb(0xF59E0B)),
        FrameStyle::Emerald => Solid(rgb(0x10B981)),
        FrameStyle::Ruby => Solid(rgb(0xDC2626)),
        FrameStyle::Sapphire => Solid(rgb(0x2563EB)),
        FrameStyle::GradientVertical => Gradient {
            from: rgb(0xFF61D2),
            to: rgb(0x7353E5),
            direction: GradientDirection::Vertical,
        },
        FrameStyle::GradientHorizontal => gradient(0xFF61D2, 0x7353E5),
        FrameStyle::Neon => gradient(0x8B5CF6, 0xEC4899),
        FrameStyle::Nature => gradient(0xA7F3D0, 0x10B981),
        FrameStyle::Ocean => gradient(0xBFDBFE, 0x2563EB),
        FrameStyle::Sunset => gradient(0xFDBA74, 0xEC4899),
        FrameStyle::Lavender => gradient(0xE9D5FF, 0xC084FC),
        FrameStyle::Mint => gradient(0xD1FAE5, 0x6EE7B7),
        FrameStyle::Rose => gradient(0xFECDD3, 0xFB7185),
        FrameStyle::Sky => gradient(0xE0F2FE, 0x38BDF8),
        FrameStyle::FilmStrip => FilmStrip,
    }
}

/// Paint the background for `frame` onto the whole surface.
pub fn paint_background(surface: &mut impl Surface, layout: &Layout, frame: FrameStyle) {
    let size = surface.size();
    let (w, h) = (size.width as f32, size.height as f32);
    match background_for(frame) {
        Background::Untouched => {}
        Background::Solid(color) => surface.fill_rect(Rect::new(0.0, 0.0, w, h), color),
        Background::Gradient {
            from,
            to,
            direction,
        } => {
            let end = match direction {
                GradientDirection::Vertical => (0.0, h),
                GradientDirection::Diagonal => (w, h),
            };
            surface.fill_gradient(&LinearGradient {
                start: (0.0, 0.0),
                end,
                from,
                to,
            });
        }
        Background::FilmStrip => {
            surface.fill_rect(Rect::new(0.0, 0.0, w, h), rgb(0x000000));
            for hole in layout.perforations() {
                surface.fill_rect(hole, PERFORATION);
            }
        }
    }
}
