//! Booth configuration module.
//!
//! Handles loading, validating, and merging `booth.toml`. Stock defaults are
//! overridden by the user's file; the user file only needs the keys it wants
//! to change.
//!
//! ## Config File Location
//!
//! ```text
//! <config-dir>/
//! └── booth.toml      # overrides stock defaults
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! dir = "prints"                  # Where exported prints are written
//! file_prefix = "tanauan-clicks"  # <file_prefix>-YYYY-MM-DD.png
//!
//! [render]
//! # font_path = "/path/to/Regular.ttf"
//! # bold_font_path = "/path/to/Bold.ttf"
//! filter_timeout_ms = 3000
//! slot_timeout_ms = 5000
//! qr_timeout_ms = 2000
//!
//! [export]
//! upload_timeout_ms = 10000
//! # share_dir = "/srv/booth/share"
//! # share_base_url = "https://booth.example/share/"
//! retention_secs = 172800
//! qr_prefix = ""
//! placeholder_url = "https://tanauan-clicks-qr-placeholder.com/"
//!
//! [preview]
//! debounce_ms = 500
//!
//! [capture]
//! countdown_tick_ms = 1000
//! between_shots_ms = 500
//!
//! [developer]
//! passphrase = "test123"
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::compose::RenderTimeouts;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File name of the booth config inside the config directory.
pub const CONFIG_FILENAME: &str = "booth.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Booth configuration loaded from `booth.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoothConfig {
    pub output: OutputConfig,
    pub render: RenderConfig,
    pub export: ExportConfig,
    pub preview: PreviewConfig,
    pub capture: CaptureConfig,
    pub developer: DeveloperConfig,
    pub processing: ProcessingConfig,
}

impl BoothConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.file_prefix.trim().is_empty() {
            return Err(ConfigError::Validation(
                "output.file_prefix must not be empty".into(),
            ));
        }
        if self
            .output
            .file_prefix
            .contains(|c: char| c == '/' || c == '\\')
        {
            return Err(ConfigError::Validation(
                "output.file_prefix must not contain path separators".into(),
            ));
        }
        for (name, value) in [
            ("render.filter_timeout_ms", self.render.filter_timeout_ms),
            ("render.slot_timeout_ms", self.render.slot_timeout_ms),
            ("render.qr_timeout_ms", self.render.qr_timeout_ms),
            ("export.upload_timeout_ms", self.export.upload_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }
        if self.export.share_dir.is_some() != self.export.share_base_url.is_some() {
            return Err(ConfigError::Validation(
                "export.share_dir and export.share_base_url must be set together".into(),
            ));
        }
        if self.developer.passphrase.is_empty() {
            return Err(ConfigError::Validation(
                "developer.passphrase must not be empty".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Render deadlines as durations.
    pub fn render_timeouts(&self) -> RenderTimeouts {
        RenderTimeouts {
            filter: Duration::from_millis(self.render.filter_timeout_ms),
            slot: Duration::from_millis(self.render.slot_timeout_ms),
            qr: Duration::from_millis(self.render.qr_timeout_ms),
        }
    }
}

/// Where and how exported prints are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Output directory, relative to the working directory unless absolute.
    pub dir: String,
    /// Prefix of the dated file name.
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "prints".to_string(),
            file_prefix: "tanauan-clicks".to_string(),
        }
    }
}

/// Fonts and per-step render deadlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Regular face. When absent, well-known system fonts are tried.
    pub font_path: Option<String>,
    /// Bold face for the headline. When absent, bold is faked.
    pub bold_font_path: Option<String>,
    pub filter_timeout_ms: u64,
    pub slot_timeout_ms: u64,
    pub qr_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            bold_font_path: None,
            filter_timeout_ms: 3000,
            slot_timeout_ms: 5000,
            qr_timeout_ms: 2000,
        }
    }
}

/// Upload and QR settings for exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub upload_timeout_ms: u64,
    /// Directory the share uploader publishes into. Unset disables upload.
    pub share_dir: Option<String>,
    /// Public URL prefix under which `share_dir` is served.
    pub share_base_url: Option<String>,
    /// Shared prints older than this are pruned.
    pub retention_secs: u64,
    /// Prepended to the URL encoded in the QR code.
    pub qr_prefix: String,
    /// QR target used when nothing was uploaded.
    pub placeholder_url: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            upload_timeout_ms: 10_000,
            share_dir: None,
            share_base_url: None,
            retention_secs: 172_800,
            qr_prefix: String::new(),
            placeholder_url: "https://tanauan-clicks-qr-placeholder.com/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Quiet period before a burst of edits triggers one preview render.
    pub debounce_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Length of one countdown step.
    pub countdown_tick_ms: u64,
    /// Pause after each shot except the last.
    pub between_shots_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            countdown_tick_ms: 1000,
            between_shots_ms: 500,
        }
    }
}

/// The developer-mode toggle. Not access control: anyone who can read this
/// file, or the session, can flip it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeveloperConfig {
    pub passphrase: String,
}

impl Default for DeveloperConfig {
    fn default() -> Self {
        Self {
            passphrase: "test123".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of rayon workers for pixel loops.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BoothConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `booth.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BoothConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BoothConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `booth.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<BoothConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `booth.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Snapbooth Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Exported prints
# ---------------------------------------------------------------------------
[output]
# Directory exported prints are written to.
dir = "prints"

# Prints are named <file_prefix>-YYYY-MM-DD.png
file_prefix = "tanauan-clicks"

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
# TrueType/OpenType faces for captions. When unset, common system fonts are
# tried; without any font the print is rendered without captions.
# font_path = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
# bold_font_path = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"

# Give up on a filter after this long and use the unfiltered photo.
filter_timeout_ms = 3000

# Give up on preparing a slot (filter + resize) after this long.
slot_timeout_ms = 5000

# Give up on QR generation after this long and print without it.
qr_timeout_ms = 2000

# ---------------------------------------------------------------------------
# Export / sharing
# ---------------------------------------------------------------------------
[export]
# Give up on uploading after this long.
upload_timeout_ms = 10000

# Publish each print into share_dir, reachable at share_base_url + file name.
# Both must be set to enable sharing.
# share_dir = "/srv/booth/share"
# share_base_url = "https://booth.example/share/"

# Shared prints older than this many seconds are removed (2 days).
retention_secs = 172800

# Text prepended to the URL in the QR code.
qr_prefix = ""

# QR target when nothing was uploaded.
placeholder_url = "https://tanauan-clicks-qr-placeholder.com/"

# ---------------------------------------------------------------------------
# Live preview
# ---------------------------------------------------------------------------
[preview]
# Quiet period after the last edit before the preview re-renders.
debounce_ms = 500

# ---------------------------------------------------------------------------
# Capture timing
# ---------------------------------------------------------------------------
[capture]
# Length of one countdown step.
countdown_tick_ms = 1000

# Pause between consecutive shots.
between_shots_ms = 500

# ---------------------------------------------------------------------------
# Developer mode
# ---------------------------------------------------------------------------
[developer]
# Unlocks placement editing. This is a convenience toggle, not security.
passphrase = "test123"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel pixel-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
