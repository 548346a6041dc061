//! QR stamps for the exported print.

use image::{Rgba, RgbaImage};
use qrcode::{Color, QrCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QrError {
    #[error("QR payload is empty")]
    EmptyPayload,
    #[error("could not encode QR payload: {0}")]
    Encode(String),
    #[error("QR size must be at least one pixel per module ({modules} modules, {size}px)")]
    TooSmall { modules: u32, size: u32 },
}

/// Renders a payload into a square bitmap of the requested side.
pub trait QrProvider: Send + Sync {
    fn render(&self, payload: &str, size: u32) -> Result<RgbaImage, QrError>;
}

/// Black-on-white QR via the `qrcode` crate, without a quiet zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrCodeProvider;

impl QrProvider for QrCodeProvider {
    fn render(&self, payload: &str, size: u32) -> Result<RgbaImage, QrError> {
        if payload.is_empty() {
            return Err(QrError::EmptyPayload);
        }
        let code = QrCode::new(payload.as_bytes()).map_err(|e| QrError::Encode(e.to_string()))?;
        let modules = code.width() as u32;
        if size < modules {
            return Err(QrError::TooSmall { modules, size });
        }
        let colors = code.to_colors();

        // Nearest-module sampling stretches the code over the whole square
        // even when `size` is not a multiple of the module count.
        let image = RgbaImage::from_fn(size, size, |x, y| {
            let mx = (x * modules / size) as usize;
            let my = (y * modules / size) as usize;
            match colors[my * modules as usize + mx] {
                Color::Dark => Rgba([0, 0, 0, 255]),
                Color::Light => Rgba([255, 255, 255, 255]),
            }
        });
        Ok(image)
    }
}

/// Payload printed into the QR: prefix plus the uploaded or fallback URL.
pub fn qr_payload(prefix: &str, uploaded: Option<&str>, placeholder: &str) -> String {
    format!("{prefix}{}", uploaded.unwrap_or(placeholder))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_requested_square() {
        let img = QrCodeProvider.render("https://example.com/p/1", 120).unwrap();
        assert_eq!(img.dimensions(), (120, 120));
        // Finder pattern corner is dark, no quiet zone
        assert_eq!(*img.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert!(img.pixels().any(|p| p[0] == 255));
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(
            QrCodeProvider.render("", 60),
            Err(QrError::EmptyPayload)
        ));
    }

    #[test]
    fn too_small_is_rejected() {
        assert!(matches!(
            QrCodeProvider.render("hello", 5),
            Err(QrError::TooSmall { .. })
        ));
    }

    #[test]
    fn payload_prefers_uploaded_url() {
        assert_eq!(
            qr_payload("booth:", Some("https://x/1.png"), "https://home"),
            "booth:https://x/1.png"
        );
        assert_eq!(qr_payload("", None, "https://home"), "https://home");
    }
}
