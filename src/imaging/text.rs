//! Font loading and single-line glyph rasterization (`fontdue`).
//!
//! Text is rendered into a coverage mask ([`GlyphMask`]) which the canvas
//! then rotates, aligns and blends. Fonts are optional: a booth without a
//! usable font still prints, it just prints without captions.

use fontdue::{Font, FontSettings};
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum FontError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse font {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Well-known locations of a regular and bold sans face, tried in order.
const SYSTEM_FONTS: &[(&str, &str)] = &[
    (
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    ),
    (
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    ),
    (
        "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    ),
    (
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    ),
    ("C:\\Windows\\Fonts\\arial.ttf", "C:\\Windows\\Fonts\\arialbd.ttf"),
];

/// Font weight requested by a caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

/// The faces available to the compositor.
#[derive(Default)]
pub struct Fonts {
    regular: Option<Font>,
    bold: Option<Font>,
}

impl std::fmt::Debug for Fonts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fonts")
            .field("regular", &self.regular.is_some())
            .field("bold", &self.bold.is_some())
            .finish()
    }
}

/// Read and parse a font file.
pub fn load_font(path: &Path) -> Result<Font, FontError> {
    let bytes = std::fs::read(path).map_err(|source| FontError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Font::from_bytes(bytes, FontSettings::default()).map_err(|reason| FontError::Parse {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    })
}

impl Fonts {
    /// No fonts at all; every caption is skipped.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_fonts(regular: Option<Font>, bold: Option<Font>) -> Self {
        Self { regular, bold }
    }

    /// Load configured fonts, falling back to well-known system faces.
    ///
    /// Never fails: a font that cannot be read is logged and skipped.
    pub fn discover(regular: Option<&Path>, bold: Option<&Path>) -> Self {
        let try_load = |path: &Path| match load_font(path) {
            Ok(font) => Some(font),
            Err(e) => {
                warn!(error = %e, "skipping font");
                None
            }
        };

        let mut regular_font = regular.and_then(try_load);
        let mut bold_font = bold.and_then(try_load);

        if regular_font.is_none() {
            for (reg, b) in SYSTEM_FONTS {
                let reg = Path::new(reg);
                if !reg.exists() {
                    continue;
                }
                regular_font = try_load(reg);
                if bold_font.is_none() && Path::new(b).exists() {
                    bold_font = try_load(Path::new(b));
                }
                if regular_font.is_some() {
                    debug!(path = %reg.display(), "using system font");
                    break;
                }
            }
        }

        if regular_font.is_none() {
            warn!("no usable font found; captions will not be drawn");
        }
        Self::from_fonts(regular_font, bold_font)
    }

    pub fn is_empty(&self) -> bool {
        self.regular.is_none() && self.bold.is_none()
    }

    /// Pick a face for `weight`. The flag is true when bold must be faked.
    pub fn face(&self, weight: Weight) -> Option<(&Font, bool)> {
        match weight {
            Weight::Bold => match (&self.bold, &self.regular) {
                (Some(bold), _) => Some((bold, false)),
                (None, Some(regular)) => Some((regular, true)),
                (None, None) => None,
            },
            Weight::Regular => self.regular.as_ref().or(self.bold.as_ref()).map(|f| (f, false)),
        }
    }
}

/// A rasterized line of text: coverage per pixel plus baseline row.
#[derive(Debug, Clone)]
pub struct GlyphMask {
    pub coverage: GrayImage,
    /// Distance from the top of the mask to the baseline, in pixels.
    pub baseline: u32,
}

impl GlyphMask {
    pub fn width(&self) -> u32 {
        self.coverage.width()
    }

    pub fn height(&self) -> u32 {
        self.coverage.height()
    }
}

/// Rasterize `text` on a single line at `size` pixels.
///
/// `embolden` smears coverage sideways to fake a bold face.
pub fn rasterize_line(font: &Font, text: &str, size: f32, embolden: bool) -> Option<GlyphMask> {
    if text.is_empty() || size <= 0.0 {
        return None;
    }

    let glyphs: Vec<_> = text.chars().map(|ch| font.rasterize(ch, size)).collect();

    let (ascent, descent) = match font.horizontal_line_metrics(size) {
        Some(m) => (m.ascent, m.descent),
        None => {
            let ascent = glyphs
                .iter()
                .map(|(m, _)| (m.height as i32 + m.ymin) as f32)
                .fold(0.0, f32::max);
            let descent = glyphs.iter().map(|(m, _)| m.ymin as f32).fold(0.0, f32::min);
            (ascent, descent)
        }
    };

    let smear = if embolden { (size / 22.0).round().max(1.0) as u32 } else { 0 };
    let advance: f32 = glyphs.iter().map(|(m, _)| m.advance_width).sum();
    let width = (advance.ceil() as u32 + smear).max(1);
    let baseline = ascent.ceil().max(0.0) as u32;
    let height = (baseline as f32 - descent).ceil().max(1.0) as u32;

    let mut coverage = GrayImage::new(width, height);
    let mut pen = 0.0f32;
    for (metrics, bitmap) in &glyphs {
        let gx = pen.round() as i32 + metrics.xmin;
        let gy = baseline as i32 - (metrics.height as i32 + metrics.ymin);
        for row in 0..metrics.height {
            for col in 0..metrics.width {
                let value = bitmap[row * metrics.width + col];
                if value == 0 {
                    continue;
                }
                for dx in 0..=smear as i32 {
                    let px = gx + col as i32 + dx;
                    let py = gy + row as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }
                    let cell = coverage.get_pixel_mut(px as u32, py as u32);
                    *cell = Luma([cell[0].max(value)]);
                }
            }
        }
        pen += metrics.advance_width;
    }

    Some(GlyphMask { coverage, baseline })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fonts_have_no_faces() {
        let fonts = Fonts::none();
        assert!(fonts.is_empty());
        assert!(fonts.face(Weight::Regular).is_none());
        assert!(fonts.face(Weight::Bold).is_none());
    }

    #[test]
    fn missing_font_file_is_io_error() {
        let err = load_font(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(matches!(err, FontError::Io { .. }));
    }

    #[test]
    fn garbage_font_file_is_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        let err = load_font(&path).unwrap_err();
        assert!(matches!(err, FontError::Parse { .. }));
    }

    #[test]
    fn discover_with_bad_paths_never_panics() {
        let fonts = Fonts::discover(
            Some(Path::new("/nonexistent/regular.ttf")),
            Some(Path::new("/nonexistent/bold.ttf")),
        );
        // Whether a system font exists depends on the host; only the
        // absence of a panic is guaranteed.
        let _ = fonts.is_empty();
    }
}
