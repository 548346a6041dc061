//! Pixel work — pure Rust, no system image libraries.
//!
//! | Concern | Crate / function |
//! |---|---|
//! | **Filters** | per-pixel transforms over `rayon::par_chunks_mut` |
//! | **Layout** | pure geometry, no pixels |
//! | **Drawing** | `image::imageops` (overlay, resize, rotate) |
//! | **Text** | `fontdue` glyph rasterization |
//! | **QR** | `qrcode` module matrix, scaled to a square |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for template geometry (unit testable)
//! - **Canvas**: [`Surface`] trait + [`RasterCanvas`]
//! - **Filters**: [`PixelFilter`] trait + [`FilterEngine`]
//! - **Frames**: palette lookup and background painting
//! - **Text / QR**: font loading and QR stamps

pub mod calculations;
pub mod canvas;
pub mod filters;
pub mod frames;
pub mod qr;
pub mod text;

pub use calculations::Layout;
pub use canvas::{RasterCanvas, Surface};
pub use filters::{FilterEngine, FilterError, PixelFilter, apply_filter, apply_filter_with_deadline};
pub use qr::{QrCodeProvider, QrError, QrProvider};
pub use text::{FontError, Fonts};
