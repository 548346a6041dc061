//! Taking the photos.
//!
//! A [`Camera`] hands out one frame per call. [`run_capture`] drives it
//! through the booth's countdown: `timer_delay` ticks before every shot and a
//! short pause between shots, strictly one shot at a time. Each frame is
//! written to `<state_dir>/captures/NNN-<kind>.png` and the saved paths are
//! returned for the session to record.
//!
//! The only camera shipped is [`DirectoryCamera`], which replays a folder of
//! images in `NNN-` order. It stands in for a webcam at events and in tests.

use crate::config::CaptureConfig;
use crate::naming::{compare_numbered, shot_file_name};
use image::RgbaImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Directory under the state dir that receives captured frames.
pub const CAPTURES_DIR: &str = "captures";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("camera directory not readable: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("no images found in camera directory {0}")]
    NoFrames(PathBuf),
    #[error("camera ran out of frames after {taken} of {available}")]
    Exhausted { taken: usize, available: usize },
    #[error("camera error: {0}")]
    Device(String),
}

/// A source of frames.
pub trait Camera: Send {
    /// Grab the next frame.
    fn next_frame(&mut self) -> Result<RgbaImage, CaptureError>;
}

/// Replays the images of a directory tree, ordered by `NNN-` prefix then name.
#[derive(Debug)]
pub struct DirectoryCamera {
    frames: Vec<PathBuf>,
    next: usize,
}

impl DirectoryCamera {
    pub fn open(dir: &Path) -> Result<Self, CaptureError> {
        let mut frames = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry?;
            if entry.file_type().is_file() && is_image(entry.path()) {
                frames.push(entry.into_path());
            }
        }
        if frames.is_empty() {
            return Err(CaptureError::NoFrames(dir.to_path_buf()));
        }
        frames.sort_by(|a, b| compare_numbered(a, b));
        debug!(dir = %dir.display(), frames = frames.len(), "opened directory camera");
        Ok(Self { frames, next: 0 })
    }

    /// Skip frames already used by earlier runs.
    pub fn starting_at(mut self, offset: usize) -> Self {
        self.next = offset;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.next)
    }
}

impl Camera for DirectoryCamera {
    fn next_frame(&mut self) -> Result<RgbaImage, CaptureError> {
        let Some(path) = self.frames.get(self.next) else {
            return Err(CaptureError::Exhausted {
                taken: self.next,
                available: self.frames.len(),
            });
        };
        let frame = image::open(path)?.to_rgba8();
        debug!(path = %path.display(), "frame read");
        self.next += 1;
        Ok(frame)
    }
}

fn is_image(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// Whether a run is the first capture or the session's retake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotKind {
    Original,
    Retake,
}

impl ShotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ShotKind::Original => "original",
            ShotKind::Retake => "retake",
        }
    }
}

/// Pacing of a capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    /// Countdown ticks before each shot.
    pub countdown: u8,
    pub tick: Duration,
    pub between_shots: Duration,
}

impl CaptureTiming {
    pub fn new(config: &CaptureConfig, timer_delay: u8) -> Self {
        Self {
            countdown: timer_delay,
            tick: Duration::from_millis(config.countdown_tick_ms),
            between_shots: Duration::from_millis(config.between_shots_ms),
        }
    }

    /// No waiting at all.
    pub fn instant(countdown: u8) -> Self {
        Self {
            countdown,
            tick: Duration::ZERO,
            between_shots: Duration::ZERO,
        }
    }
}

/// Progress reported while capturing. Shots are numbered from 1.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Countdown { shot: usize, remaining: u8 },
    Shot { shot: usize, path: PathBuf },
    Pause { after_shot: usize },
}

/// Take `shots` photos, saving each under `dest`.
///
/// Stops at the first camera error; frames already saved stay on disk but are
/// not returned, so a failed run never reaches the session.
pub fn run_capture(
    camera: &mut dyn Camera,
    shots: usize,
    timing: &CaptureTiming,
    dest: &Path,
    kind: ShotKind,
    mut on_event: impl FnMut(&CaptureEvent),
) -> Result<Vec<PathBuf>, CaptureError> {
    fs::create_dir_all(dest)?;
    let mut saved = Vec::with_capacity(shots);

    for shot in 1..=shots {
        for remaining in (1..=timing.countdown).rev() {
            on_event(&CaptureEvent::Countdown { shot, remaining });
            thread::sleep(timing.tick);
        }

        let frame = camera.next_frame()?;
        let path = dest.join(shot_file_name(shot, kind.as_str()));
        frame.save(&path)?;
        on_event(&CaptureEvent::Shot {
            shot,
            path: path.clone(),
        });
        saved.push(path);

        if shot < shots {
            on_event(&CaptureEvent::Pause { after_shot: shot });
            thread::sleep(timing.between_shots);
        }
    }

    info!(shots = saved.len(), kind = kind.as_str(), "capture finished");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::solid_image;
    use image::Rgba;
    use tempfile::TempDir;

    fn feed_dir(names: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for (i, name) in names.iter().enumerate() {
            solid_image(8, 6, Rgba([i as u8 * 40, 0, 0, 255]))
                .save(tmp.path().join(name))
                .unwrap();
        }
        tmp
    }

    /// Camera that fails after a number of frames.
    struct FlakyCamera {
        left: usize,
    }

    impl Camera for FlakyCamera {
        fn next_frame(&mut self) -> Result<RgbaImage, CaptureError> {
            if self.left == 0 {
                return Err(CaptureError::Device("unplugged".into()));
            }
            self.left -= 1;
            Ok(solid_image(4, 4, Rgba([0, 0, 255, 255])))
        }
    }

    #[test]
    fn directory_camera_orders_by_number() {
        let feed = feed_dir(&["10-late.png", "2-early.png", "1-first.png"]);
        fs::write(feed.path().join("notes.txt"), "not a frame").unwrap();
        let mut cam = DirectoryCamera::open(feed.path()).unwrap();
        assert_eq!(cam.remaining(), 3);
        // Red channel encodes write order: 1-first=80, 2-early=40, 10-late=0
        assert_eq!(cam.next_frame().unwrap().get_pixel(0, 0)[0], 80);
        assert_eq!(cam.next_frame().unwrap().get_pixel(0, 0)[0], 40);
        assert_eq!(cam.next_frame().unwrap().get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn directory_camera_runs_out() {
        let feed = feed_dir(&["1-a.png"]);
        let mut cam = DirectoryCamera::open(feed.path()).unwrap();
        cam.next_frame().unwrap();
        assert!(matches!(
            cam.next_frame(),
            Err(CaptureError::Exhausted { taken: 1, available: 1 })
        ));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            DirectoryCamera::open(tmp.path()),
            Err(CaptureError::NoFrames(_))
        ));
    }

    #[test]
    fn starting_offset_skips_used_frames() {
        let feed = feed_dir(&["1-a.png", "2-b.png", "3-c.png"]);
        let cam = DirectoryCamera::open(feed.path()).unwrap().starting_at(2);
        assert_eq!(cam.remaining(), 1);
    }

    #[test]
    fn capture_saves_numbered_frames_with_countdown() {
        let feed = feed_dir(&["1-a.png", "2-b.png", "3-c.png"]);
        let out = TempDir::new().unwrap();
        let mut cam = DirectoryCamera::open(feed.path()).unwrap();
        let mut events = Vec::new();

        let paths = run_capture(
            &mut cam,
            2,
            &CaptureTiming::instant(3),
            out.path(),
            ShotKind::Retake,
            |e| events.push(e.clone()),
        )
        .unwrap();

        assert_eq!(
            paths,
            vec![out.path().join("001-retake.png"), out.path().join("002-retake.png")]
        );
        assert!(paths.iter().all(|p| p.exists()));

        let countdowns: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                CaptureEvent::Countdown { shot: 1, remaining } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(countdowns, vec![3, 2, 1]);
        // One pause, between the two shots
        let pauses = events
            .iter()
            .filter(|e| matches!(e, CaptureEvent::Pause { .. }))
            .count();
        assert_eq!(pauses, 1);
        assert!(matches!(events.last(), Some(CaptureEvent::Shot { shot: 2, .. })));
    }

    #[test]
    fn camera_failure_aborts_run() {
        let out = TempDir::new().unwrap();
        let mut cam = FlakyCamera { left: 1 };
        let result = run_capture(
            &mut cam,
            4,
            &CaptureTiming::instant(1),
            out.path(),
            ShotKind::Original,
            |_| {},
        );
        assert!(matches!(result, Err(CaptureError::Device(_))));
    }

    #[test]
    fn timing_from_config() {
        let config = CaptureConfig {
            countdown_tick_ms: 250,
            between_shots_ms: 100,
        };
        let t = CaptureTiming::new(&config, 5);
        assert_eq!(t.countdown, 5);
        assert_eq!(t.tick, Duration::from_millis(250));
    }
}
