//! Session state: what has been captured and how the print is decorated.
//!
//! One [`SessionConfig`] is loaded from `session.json` at startup, mutated
//! through [`Session`]'s operations, and written back atomically after every
//! change. Every invariant the compositor relies on is enforced here, before
//! any pixels are touched:
//!
//! - a print needs images, and after a retake it needs a confirmed final
//!   selection of exactly four;
//! - only one retake per capture session;
//! - `bottom_text` never exceeds [`BOTTOM_TEXT_LIMIT`] characters;
//! - placements are always valid percentages, two per image.
//!
//! ## Tolerant loading
//!
//! The session file is read field by field. A missing or malformed field
//! falls back to its default with a warning instead of discarding the whole
//! session, so one bad value never loses a guest's photos.
//!
//! ## Developer mode
//!
//! Placement editing is hidden behind a passphrase. This is a UI toggle to
//! keep guests from fiddling with the layout, **not** access control: the
//! passphrase is plain config and the flag is plain session state.

use crate::compose::{RenderRequest, duplicate_for_slots};
use crate::types::{
    BOTTOM_TEXT_LIMIT, CanvasSize, FilterKind, FilterSpec, FrameStyle, GRID_COLS, Placement,
    PlacementPatch, SLOT_COUNT, TextBlock, TextField,
};
use image::RgbaImage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// File name of the persisted session inside the state directory.
pub const SESSION_FILENAME: &str = "session.json";

/// Number of photos on a finished print.
pub const FINAL_SELECTION_SIZE: usize = 4;

pub const MAX_SHOTS: u8 = 4;
pub const MAX_TIMER_DELAY: u8 = 10;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("a retake has already been used for this session")]
    AlreadyRetaken,
    #[error("nothing to retake: no photos have been captured yet")]
    NoOriginalCapture,
    #[error("no photos to print")]
    NoImages,
    #[error("photos were retaken: choose the final {FINAL_SELECTION_SIZE} before exporting")]
    SelectionRequired,
    #[error("invalid final selection: {0}")]
    InvalidSelection(String),
    #[error("bottom text is {len} characters; the limit is {limit}")]
    TextTooLong { len: usize, limit: usize },
    #[error("placement editing requires developer mode")]
    DeveloperModeRequired,
    #[error("wrong developer passphrase")]
    WrongPassphrase,
    #[error("slot {index} does not exist ({slots} slots)")]
    SlotOutOfRange { index: usize, slots: usize },
    #[error("placement out of range: {0:?}")]
    InvalidPlacement(Placement),
    #[error("shot count must be 1-{MAX_SHOTS}, got {0}")]
    InvalidShotCount(u8),
    #[error("timer delay must be 1-{MAX_TIMER_DELAY} seconds, got {0}")]
    InvalidTimerDelay(u8),
}

// =============================================================================
// Persisted state
// =============================================================================

/// Everything the booth remembers between commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Shots per capture (1–4).
    pub shot_count: u8,
    /// Countdown before each shot, in ticks (1–10).
    pub timer_delay: u8,
    pub camera_id: Option<String>,
    pub placements: Vec<Placement>,
    pub text: TextBlock,
    pub filter: FilterKind,
    pub filter_intensity: u8,
    pub frame: FrameStyle,
    pub developer_mode: bool,
    /// Images the next print uses.
    pub current_images: Vec<PathBuf>,
    /// The first capture of this session.
    pub original_images: Vec<PathBuf>,
    pub retake_images: Vec<PathBuf>,
    pub has_retaken: bool,
    pub final_selection_confirmed: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shot_count: 4,
            timer_delay: 3,
            camera_id: None,
            placements: Vec::new(),
            text: TextBlock::default(),
            filter: FilterKind::None,
            filter_intensity: 100,
            frame: FrameStyle::Black,
            developer_mode: false,
            current_images: Vec::new(),
            original_images: Vec::new(),
            retake_images: Vec::new(),
            has_retaken: false,
            final_selection_confirmed: false,
        }
    }
}

/// Read one field, falling back to `default` when missing or malformed.
fn field<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str, default: T) -> T {
    match obj.get(key) {
        None => default,
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(v) => v,
            Err(e) => {
                warn!(field = key, error = %e, "malformed session field; using default");
                default
            }
        },
    }
}

/// Read an id field through a lenient parser that maps unknown ids to a
/// fallback variant.
fn id_field<T: Copy>(
    obj: &Map<String, Value>,
    key: &str,
    default: T,
    parse: fn(&str) -> T,
    id: fn(T) -> &'static str,
) -> T {
    match obj.get(key) {
        None => default,
        Some(Value::String(s)) => {
            let parsed = parse(s);
            if !id(parsed).eq_ignore_ascii_case(s) {
                warn!(field = key, value = %s, fallback = id(parsed), "unknown id in session file");
            }
            parsed
        }
        Some(other) => {
            warn!(field = key, value = %other, "malformed session field; using default");
            default
        }
    }
}

impl SessionConfig {
    /// Build a config from parsed JSON, field by field.
    pub fn from_json(value: &Value) -> Self {
        let d = Self::default();
        let Some(obj) = value.as_object() else {
            warn!("session file is not a JSON object; starting fresh");
            return d;
        };

        let mut config = Self {
            shot_count: field(obj, "shot_count", d.shot_count),
            timer_delay: field(obj, "timer_delay", d.timer_delay),
            camera_id: field(obj, "camera_id", d.camera_id),
            placements: field(obj, "placements", d.placements),
            text: field(obj, "text", d.text),
            filter: id_field(obj, "filter", d.filter, FilterKind::from_id, FilterKind::id),
            filter_intensity: field(obj, "filter_intensity", d.filter_intensity),
            frame: id_field(obj, "frame", d.frame, FrameStyle::from_id, FrameStyle::id),
            developer_mode: field(obj, "developer_mode", d.developer_mode),
            current_images: field(obj, "current_images", d.current_images),
            original_images: field(obj, "original_images", d.original_images),
            retake_images: field(obj, "retake_images", d.retake_images),
            has_retaken: field(obj, "has_retaken", d.has_retaken),
            final_selection_confirmed: field(
                obj,
                "final_selection_confirmed",
                d.final_selection_confirmed,
            ),
        };
        config.repair();
        config
    }

    /// Clamp values a hand-edited or older file may have left out of range.
    fn repair(&mut self) {
        let defaults = Self::default();
        if !(1..=MAX_SHOTS).contains(&self.shot_count) {
            warn!(value = self.shot_count, "shot_count out of range; using default");
            self.shot_count = defaults.shot_count;
        }
        if !(1..=MAX_TIMER_DELAY).contains(&self.timer_delay) {
            warn!(value = self.timer_delay, "timer_delay out of range; using default");
            self.timer_delay = defaults.timer_delay;
        }
        if self.filter_intensity > 100 {
            warn!(value = self.filter_intensity, "filter_intensity above 100; clamping");
            self.filter_intensity = 100;
        }
        if self.text.bottom_text.chars().count() > BOTTOM_TEXT_LIMIT {
            warn!("bottom_text too long; using default");
            self.text.bottom_text = defaults.text.bottom_text;
        }
        self.text.remaining_chars = BOTTOM_TEXT_LIMIT - self.text.bottom_text.chars().count();

        let expected = slot_count_for(self.current_images.len());
        if self.placements.len() != expected {
            if !self.placements.is_empty() {
                warn!(
                    found = self.placements.len(),
                    expected, "placement count does not match images; regenerating"
                );
            }
            self.placements = default_placements(expected);
        }
        for (i, p) in self.placements.iter_mut().enumerate() {
            if !p.is_valid() {
                warn!(slot = i, placement = ?p, "invalid placement; using default");
                *p = Placement::default_for_slot(i);
            }
        }
    }

    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec::new(self.filter, u32::from(self.filter_intensity))
    }
}

fn slot_count_for(images: usize) -> usize {
    (images * GRID_COLS).min(SLOT_COUNT)
}

fn default_placements(slots: usize) -> Vec<Placement> {
    (0..slots).map(Placement::default_for_slot).collect()
}

/// Load the session file, tolerating damage.
///
/// A missing file is a fresh session. Unparseable JSON is logged and also
/// treated as fresh. Only unreadable files are errors.
pub fn load_session(path: &Path) -> Result<SessionConfig, SessionError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no session file; starting fresh");
            return Ok(SessionConfig::default());
        }
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => Ok(SessionConfig::from_json(&value)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "session file is not valid JSON; starting fresh");
            Ok(SessionConfig::default())
        }
    }
}

/// Write the session file atomically (temp file + rename).
pub fn save_session(path: &Path, config: &SessionConfig) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// =============================================================================
// Placement targets
// =============================================================================

/// Which slots a placement edit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementTarget {
    Slot(usize),
    LeftColumn,
    RightColumn,
    All,
}

impl PlacementTarget {
    fn includes(self, index: usize) -> bool {
        match self {
            PlacementTarget::Slot(i) => i == index,
            PlacementTarget::LeftColumn => index % GRID_COLS == 0,
            PlacementTarget::RightColumn => index % GRID_COLS == 1,
            PlacementTarget::All => true,
        }
    }
}

impl FromStr for PlacementTarget {
    type Err = String;

    /// `left`, `right`, `all`, or a slot number counted from 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(PlacementTarget::LeftColumn),
            "right" => Ok(PlacementTarget::RightColumn),
            "all" => Ok(PlacementTarget::All),
            other => other
                .trim_start_matches("slot:")
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .map(PlacementTarget::Slot)
                .ok_or_else(|| format!("expected left, right, all or a slot number from 1, got '{s}'")),
        }
    }
}

impl fmt::Display for PlacementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementTarget::Slot(i) => write!(f, "slot {}", i + 1),
            PlacementTarget::LeftColumn => f.write_str("left column"),
            PlacementTarget::RightColumn => f.write_str("right column"),
            PlacementTarget::All => f.write_str("all slots"),
        }
    }
}

// =============================================================================
// Session operations
// =============================================================================

/// The session state machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn into_config(self) -> SessionConfig {
        self.config
    }

    pub fn slot_count(&self) -> usize {
        slot_count_for(self.config.current_images.len())
    }

    fn reset_placements(&mut self) {
        self.config.placements = default_placements(self.slot_count());
    }

    /// A brand-new capture. Forgets any previous retake and selection.
    pub fn record_capture(&mut self, images: Vec<PathBuf>) -> Result<(), SessionError> {
        if images.is_empty() {
            return Err(SessionError::NoImages);
        }
        self.config.original_images = images.clone();
        self.config.current_images = images;
        self.config.retake_images.clear();
        self.config.has_retaken = false;
        self.config.final_selection_confirmed = false;
        self.reset_placements();
        Ok(())
    }

    pub fn can_retake(&self) -> bool {
        self.check_retake().is_ok()
    }

    /// Why a retake would be refused right now, if it would.
    pub fn check_retake(&self) -> Result<(), SessionError> {
        if self.config.has_retaken {
            return Err(SessionError::AlreadyRetaken);
        }
        if self.config.original_images.is_empty() {
            return Err(SessionError::NoOriginalCapture);
        }
        Ok(())
    }

    /// The single retake allowed per capture session.
    pub fn record_retake(&mut self, images: Vec<PathBuf>) -> Result<(), SessionError> {
        self.check_retake()?;
        if images.is_empty() {
            return Err(SessionError::NoImages);
        }
        self.config.retake_images = images.clone();
        self.config.current_images = images;
        self.config.has_retaken = true;
        self.config.final_selection_confirmed = false;
        self.reset_placements();
        Ok(())
    }

    /// Every photo the final selection may pick from: original, then retake.
    pub fn candidates(&self) -> Vec<PathBuf> {
        self.config
            .original_images
            .iter()
            .chain(self.config.retake_images.iter())
            .cloned()
            .collect()
    }

    /// Indices into [`Session::candidates`] preselected for the final pick.
    ///
    /// The retake wins when it is a full set; otherwise the original does.
    pub fn default_final_selection(&self) -> Vec<usize> {
        let originals = self.config.original_images.len();
        let retakes = self.config.retake_images.len();
        if retakes == FINAL_SELECTION_SIZE {
            (originals..originals + retakes).collect()
        } else {
            (0..originals.min(FINAL_SELECTION_SIZE)).collect()
        }
    }

    /// Confirm the photos to print, by index into the candidates.
    pub fn select_final(&mut self, indices: &[usize]) -> Result<(), SessionError> {
        let candidates = self.candidates();
        if indices.len() != FINAL_SELECTION_SIZE {
            return Err(SessionError::InvalidSelection(format!(
                "pick exactly {FINAL_SELECTION_SIZE} photos, got {}",
                indices.len()
            )));
        }
        for (n, &i) in indices.iter().enumerate() {
            if i >= candidates.len() {
                return Err(SessionError::InvalidSelection(format!(
                    "photo {i} does not exist ({} candidates)",
                    candidates.len()
                )));
            }
            if indices[..n].contains(&i) {
                return Err(SessionError::InvalidSelection(format!(
                    "photo {i} picked twice"
                )));
            }
        }
        self.config.current_images = indices.iter().map(|&i| candidates[i].clone()).collect();
        self.config.final_selection_confirmed = true;
        self.reset_placements();
        Ok(())
    }

    /// The photos to print, once the session allows printing.
    pub fn export_images(&self) -> Result<&[PathBuf], SessionError> {
        if self.config.current_images.is_empty() {
            return Err(SessionError::NoImages);
        }
        if self.config.has_retaken && !self.config.final_selection_confirmed {
            return Err(SessionError::SelectionRequired);
        }
        Ok(&self.config.current_images)
    }

    /// Change one caption. Over-long bottom text is refused untouched.
    pub fn set_text(&mut self, field: TextField, value: &str) -> Result<(), SessionError> {
        let text = &mut self.config.text;
        match field {
            TextField::Bottom => {
                let len = value.chars().count();
                if len > BOTTOM_TEXT_LIMIT {
                    return Err(SessionError::TextTooLong {
                        len,
                        limit: BOTTOM_TEXT_LIMIT,
                    });
                }
                text.bottom_text = value.to_string();
                text.remaining_chars = BOTTOM_TEXT_LIMIT - len;
            }
            TextField::Top => text.top_text = value.to_string(),
            TextField::Korean => text.korean_text = value.to_string(),
            TextField::Vertical => text.vertical_text = value.to_string(),
            TextField::Middle => text.middle_text = value.to_string(),
        }
        Ok(())
    }

    pub fn set_filter(&mut self, kind: FilterKind, intensity: u32) {
        let spec = FilterSpec::new(kind, intensity);
        self.config.filter = spec.kind;
        self.config.filter_intensity = spec.intensity;
    }

    pub fn set_frame(&mut self, frame: FrameStyle) {
        self.config.frame = frame;
    }

    pub fn set_shot_count(&mut self, shots: u8) -> Result<(), SessionError> {
        if !(1..=MAX_SHOTS).contains(&shots) {
            return Err(SessionError::InvalidShotCount(shots));
        }
        self.config.shot_count = shots;
        Ok(())
    }

    pub fn set_timer_delay(&mut self, seconds: u8) -> Result<(), SessionError> {
        if !(1..=MAX_TIMER_DELAY).contains(&seconds) {
            return Err(SessionError::InvalidTimerDelay(seconds));
        }
        self.config.timer_delay = seconds;
        Ok(())
    }

    pub fn set_camera(&mut self, camera_id: Option<String>) {
        self.config.camera_id = camera_id;
    }

    fn require_developer(&self) -> Result<(), SessionError> {
        if self.config.developer_mode {
            Ok(())
        } else {
            Err(SessionError::DeveloperModeRequired)
        }
    }

    fn check_slot(&self, index: usize) -> Result<Placement, SessionError> {
        self.config
            .placements
            .get(index)
            .copied()
            .ok_or(SessionError::SlotOutOfRange {
                index,
                slots: self.config.placements.len(),
            })
    }

    /// Patch the placement of every slot in `target`.
    ///
    /// All-or-nothing: if any patched placement is invalid, nothing changes.
    pub fn set_placement(
        &mut self,
        target: PlacementTarget,
        patch: PlacementPatch,
    ) -> Result<usize, SessionError> {
        self.require_developer()?;
        if let PlacementTarget::Slot(i) = target {
            self.check_slot(i)?;
        }
        let updated: Vec<Placement> = self
            .config
            .placements
            .iter()
            .enumerate()
            .map(|(i, p)| if target.includes(i) { patch.apply(*p) } else { *p })
            .collect();
        if let Some(bad) = updated.iter().find(|p| !p.is_valid()) {
            return Err(SessionError::InvalidPlacement(*bad));
        }
        let changed = (0..updated.len()).filter(|&i| target.includes(i)).count();
        self.config.placements = updated;
        Ok(changed)
    }

    /// Copy slot `index`'s placement to every slot in its column.
    pub fn apply_to_column(&mut self, index: usize) -> Result<(), SessionError> {
        self.require_developer()?;
        let source = self.check_slot(index)?;
        let column = index % GRID_COLS;
        for (i, p) in self.config.placements.iter_mut().enumerate() {
            if i % GRID_COLS == column {
                *p = source;
            }
        }
        Ok(())
    }

    /// Copy slot `index`'s placement to every slot.
    pub fn apply_to_all(&mut self, index: usize) -> Result<(), SessionError> {
        self.require_developer()?;
        let source = self.check_slot(index)?;
        self.config.placements.fill(source);
        Ok(())
    }

    /// Turn developer mode on if `attempt` matches the configured passphrase.
    pub fn unlock_developer_mode(&mut self, attempt: &str, passphrase: &str) -> Result<(), SessionError> {
        if attempt != passphrase {
            return Err(SessionError::WrongPassphrase);
        }
        self.config.developer_mode = true;
        Ok(())
    }

    pub fn lock_developer_mode(&mut self) {
        self.config.developer_mode = false;
    }

    /// Reset after a successful export, ready for the next guest.
    pub fn complete(&mut self) {
        let c = &mut self.config;
        c.current_images.clear();
        c.original_images.clear();
        c.retake_images.clear();
        c.has_retaken = false;
        c.final_selection_confirmed = false;
        c.frame = FrameStyle::Black;
        c.placements.clear();
    }

    /// Describe the print for decoded `images` (aligned with the current list).
    ///
    /// `None` marks a photo that could not be loaded; its slots stay empty.
    pub fn render_request(&self, images: &[Option<Arc<RgbaImage>>], size: CanvasSize) -> RenderRequest {
        RenderRequest {
            slots: duplicate_for_slots(images),
            placements: self.config.placements.clone(),
            frame: self.config.frame,
            text: self.config.text.clone(),
            filter: self.config.filter_spec(),
            size,
            qr_payload: None,
        }
    }
}
