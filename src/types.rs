//! Shared value types used by the session, the compositor and the CLI.
//!
//! Everything here is plain data: serializable, cheap to clone, and free of
//! I/O. Identifiers serialize to the same kebab/camel ids the booth has always
//! stored (`"highContrast"`, `"gradient-vertical"`), so session files written
//! by older builds keep loading.

use image::Rgba;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length (in characters) of [`TextBlock::bottom_text`].
pub const BOTTOM_TEXT_LIMIT: usize = 25;

/// Rows × columns of the print template.
pub const GRID_ROWS: usize = 4;
pub const GRID_COLS: usize = 2;
pub const SLOT_COUNT: usize = GRID_ROWS * GRID_COLS;

// =============================================================================
// Filters
// =============================================================================

/// Named color transform. `None` is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKind {
    #[default]
    None,
    Grayscale,
    Sepia,
    Vintage,
    Warm,
    Cool,
    HighContrast,
    LowContrast,
    Brighten,
    Darken,
    Saturate,
    Desaturate,
    RedTint,
    GreenTint,
    BlueTint,
}

impl FilterKind {
    pub const ALL: [FilterKind; 15] = [
        FilterKind::None,
        FilterKind::Grayscale,
        FilterKind::Sepia,
        FilterKind::Vintage,
        FilterKind::Warm,
        FilterKind::Cool,
        FilterKind::HighContrast,
        FilterKind::LowContrast,
        FilterKind::Brighten,
        FilterKind::Darken,
        FilterKind::Saturate,
        FilterKind::Desaturate,
        FilterKind::RedTint,
        FilterKind::GreenTint,
        FilterKind::BlueTint,
    ];

    pub fn id(self) -> &'static str {
        match self {
            FilterKind::None => "none",
            FilterKind::Grayscale => "grayscale",
            FilterKind::Sepia => "sepia",
            FilterKind::Vintage => "vintage",
            FilterKind::Warm => "warm",
            FilterKind::Cool => "cool",
            FilterKind::HighContrast => "highContrast",
            FilterKind::LowContrast => "lowContrast",
            FilterKind::Brighten => "brighten",
            FilterKind::Darken => "darken",
            FilterKind::Saturate => "saturate",
            FilterKind::Desaturate => "desaturate",
            FilterKind::RedTint => "redTint",
            FilterKind::GreenTint => "greenTint",
            FilterKind::BlueTint => "blueTint",
        }
    }

    /// Parse a filter id. Unknown ids are the identity filter.
    pub fn from_id(id: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(id))
            .unwrap_or(FilterKind::None)
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A filter plus how strongly it is blended over the original (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub intensity: u8,
}

impl FilterSpec {
    pub fn new(kind: FilterKind, intensity: u32) -> Self {
        Self {
            kind,
            intensity: intensity.min(100) as u8,
        }
    }

    pub fn none() -> Self {
        Self::new(FilterKind::None, 100)
    }

    /// Intensity as a blend factor in `[0, 1]`.
    pub fn factor(self) -> f32 {
        f32::from(self.intensity.min(100)) / 100.0
    }

    pub fn is_identity(self) -> bool {
        self.kind == FilterKind::None
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::none()
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Background treatment for the whole print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameStyle {
    None,
    Simple,
    #[default]
    Black,
    GradientVertical,
    GradientHorizontal,
    #[serde(rename = "filmstrip")]
    FilmStrip,
    Vintage,
    Modern,
    Neon,
    Nature,
    Ocean,
    Sunset,
    Lavender,
    Mint,
    Rose,
    Sky,
    Amber,
    Emerald,
    Ruby,
    Sapphire,
    /// Light-ink style with no palette of its own; the canvas stays white.
    Polaroid,
}

impl FrameStyle {
    pub const ALL: [FrameStyle; 21] = [
        FrameStyle::None,
        FrameStyle::Simple,
        FrameStyle::Black,
        FrameStyle::GradientVertical,
        FrameStyle::GradientHorizontal,
        FrameStyle::FilmStrip,
        FrameStyle::Vintage,
        FrameStyle::Modern,
        FrameStyle::Neon,
        FrameStyle::Nature,
        FrameStyle::Ocean,
        FrameStyle::Sunset,
        FrameStyle::Lavender,
        FrameStyle::Mint,
        FrameStyle::Rose,
        FrameStyle::Sky,
        FrameStyle::Amber,
        FrameStyle::Emerald,
        FrameStyle::Ruby,
        FrameStyle::Sapphire,
        FrameStyle::Polaroid,
    ];

    pub fn id(self) -> &'static str {
        match self {
            FrameStyle::None => "none",
            FrameStyle::Simple => "simple",
            FrameStyle::Black => "black",
            FrameStyle::GradientVertical => "gradient-vertical",
            FrameStyle::GradientHorizontal => "gradient-horizontal",
            FrameStyle::FilmStrip => "filmstrip",
            FrameStyle::Vintage => "vintage",
            FrameStyle::Modern => "modern",
            FrameStyle::Neon => "neon",
            FrameStyle::Nature => "nature",
            FrameStyle::Ocean => "ocean",
            FrameStyle::Sunset => "sunset",
            FrameStyle::Lavender => "lavender",
            FrameStyle::Mint => "mint",
            FrameStyle::Rose => "rose",
            FrameStyle::Sky => "sky",
            FrameStyle::Amber => "amber",
            FrameStyle::Emerald => "emerald",
            FrameStyle::Ruby => "ruby",
            FrameStyle::Sapphire => "sapphire",
            FrameStyle::Polaroid => "polaroid",
        }
    }

    /// Parse a frame id. Unknown ids fall back to `None` (plain white).
    pub fn from_id(id: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|f| f.id().eq_ignore_ascii_case(id))
            .unwrap_or(FrameStyle::None)
    }

    /// Light frames get black ink for the divider and captions; all others white.
    pub fn is_light(self) -> bool {
        matches!(
            self,
            FrameStyle::Simple | FrameStyle::Polaroid | FrameStyle::Vintage | FrameStyle::Modern
        )
    }

    pub fn ink(self) -> Rgba<u8> {
        if self.is_light() {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    }
}

impl fmt::Display for FrameStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// =============================================================================
// Placement
// =============================================================================

/// Where a photo sits inside its grid cell, in percent of the cell.
///
/// When `right` is present and positive it anchors the rectangle from the
/// cell's right edge and `left` is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub width: f32,
    pub height: f32,
    pub top: f32,
    pub left: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<f32>,
}

impl Placement {
    /// Default placement for a freshly captured slot.
    pub fn default_for_slot(index: usize) -> Self {
        Self {
            width: 85.0,
            height: 85.0,
            top: 4.0,
            left: if index % GRID_COLS == 1 { 11.5 } else { 3.0 },
            right: None,
        }
    }

    /// Placement used when a slot has no stored entry at all.
    pub fn fallback_for_slot(index: usize) -> Self {
        Self {
            width: 85.0,
            height: 85.0,
            top: 4.0,
            left: if index % GRID_COLS == 1 { 5.0 } else { 3.0 },
            right: Some(0.0),
        }
    }

    /// Check the percentage ranges: sizes in `(0, 100]`, offsets in `[0, 100]`.
    pub fn is_valid(&self) -> bool {
        let size_ok = |v: f32| v > 0.0 && v <= 100.0;
        let offset_ok = |v: f32| (0.0..=100.0).contains(&v);
        size_ok(self.width)
            && size_ok(self.height)
            && offset_ok(self.top)
            && offset_ok(self.left)
            && self.right.is_none_or(offset_ok)
    }

    /// The right-edge anchor, if it is in effect.
    pub fn right_anchor(&self) -> Option<f32> {
        self.right.filter(|r| *r > 0.0)
    }
}

/// Partial update applied to one or more placements.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlacementPatch {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub top: Option<f32>,
    pub left: Option<f32>,
    pub right: Option<f32>,
}

impl PlacementPatch {
    pub fn apply(&self, base: Placement) -> Placement {
        Placement {
            width: self.width.unwrap_or(base.width),
            height: self.height.unwrap_or(base.height),
            top: self.top.unwrap_or(base.top),
            left: self.left.unwrap_or(base.left),
            right: self.right.or(base.right),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// Text
// =============================================================================

/// Every caption string printed on the strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextBlock {
    pub top_text: String,
    pub korean_text: String,
    pub bottom_text: String,
    pub vertical_text: String,
    /// Stored and edited but not drawn anywhere on the print.
    pub middle_text: String,
    pub remaining_chars: usize,
}

impl Default for TextBlock {
    fn default() -> Self {
        Self {
            top_text: "Tanauan Clicks".to_string(),
            korean_text: "타나우안 클릭스".to_string(),
            bottom_text: "Thank you!".to_string(),
            vertical_text: "tanauan clicks".to_string(),
            middle_text: "tanauan clicks".to_string(),
            remaining_chars: BOTTOM_TEXT_LIMIT - "Thank you!".chars().count(),
        }
    }
}

/// Which caption a text edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TextField {
    Top,
    Korean,
    Bottom,
    Vertical,
    Middle,
}

// =============================================================================
// Canvas geometry
// =============================================================================

/// Pixel size of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    /// On-screen preview.
    pub const PREVIEW: CanvasSize = CanvasSize {
        width: 600,
        height: 900,
    };
    /// 4×6 in at 300 DPI.
    pub const EXPORT: CanvasSize = CanvasSize {
        width: 1200,
        height: 1800,
    };

    /// Layout scale relative to the 900px-tall preview.
    pub fn scale(self) -> f32 {
        self.height as f32 / Self::PREVIEW.height as f32
    }
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_ids_round_trip_through_from_id() {
        for kind in FilterKind::ALL {
            assert_eq!(FilterKind::from_id(kind.id()), kind);
        }
    }

    #[test]
    fn unknown_filter_id_is_identity() {
        assert_eq!(FilterKind::from_id("posterize"), FilterKind::None);
    }

    #[test]
    fn filter_serializes_to_camel_case_ids() {
        let json = serde_json::to_string(&FilterKind::HighContrast).unwrap();
        assert_eq!(json, "\"highContrast\"");
    }

    #[test]
    fn intensity_is_clamped_to_100() {
        assert_eq!(FilterSpec::new(FilterKind::Sepia, 250).intensity, 100);
    }

    #[test]
    fn frame_serializes_to_kebab_ids() {
        let json = serde_json::to_string(&FrameStyle::GradientVertical).unwrap();
        assert_eq!(json, "\"gradient-vertical\"");
        let json = serde_json::to_string(&FrameStyle::FilmStrip).unwrap();
        assert_eq!(json, "\"filmstrip\"");
    }

    #[test]
    fn frame_ids_match_serde_names() {
        for frame in FrameStyle::ALL {
            let json = serde_json::to_string(&frame).unwrap();
            assert_eq!(json, format!("\"{}\"", frame.id()));
        }
    }

    #[test]
    fn light_frames_use_black_ink() {
        for frame in [
            FrameStyle::Simple,
            FrameStyle::Polaroid,
            FrameStyle::Vintage,
            FrameStyle::Modern,
        ] {
            assert_eq!(frame.ink(), Rgba([0, 0, 0, 255]), "{frame}");
        }
        assert_eq!(FrameStyle::Black.ink(), Rgba([255, 255, 255, 255]));
        assert_eq!(FrameStyle::None.ink(), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn default_placements_alternate_columns() {
        assert_eq!(Placement::default_for_slot(0).left, 3.0);
        assert_eq!(Placement::default_for_slot(1).left, 11.5);
        assert_eq!(Placement::default_for_slot(6).left, 3.0);
        assert!(Placement::default_for_slot(3).right.is_none());
    }

    #[test]
    fn placement_validation_bounds() {
        let ok = Placement::default_for_slot(0);
        assert!(ok.is_valid());
        assert!(!Placement { width: 0.0, ..ok }.is_valid());
        assert!(Placement { width: 100.0, ..ok }.is_valid());
        assert!(!Placement { height: 100.5, ..ok }.is_valid());
        assert!(!Placement { top: -1.0, ..ok }.is_valid());
        assert!(!Placement { right: Some(101.0), ..ok }.is_valid());
    }

    #[test]
    fn zero_right_does_not_anchor() {
        let p = Placement::fallback_for_slot(1);
        assert_eq!(p.right_anchor(), None);
    }

    #[test]
    fn patch_overrides_only_given_fields() {
        let base = Placement::default_for_slot(0);
        let patch = PlacementPatch {
            top: Some(10.0),
            ..Default::default()
        };
        let out = patch.apply(base);
        assert_eq!(out.top, 10.0);
        assert_eq!(out.width, base.width);
    }

    #[test]
    fn default_text_remaining_chars_matches_bottom_text() {
        let text = TextBlock::default();
        assert_eq!(text.remaining_chars, 25 - text.bottom_text.chars().count());
    }

    #[test]
    fn export_is_twice_preview() {
        assert_eq!(CanvasSize::PREVIEW.scale(), 1.0);
        assert_eq!(CanvasSize::EXPORT.scale(), 2.0);
    }
}
