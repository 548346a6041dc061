//! Producing the final 1200×1800 print.
//!
//! ```text
//! session ──► render (no QR) ──► PNG ──► upload (bounded) ──► stamp QR ──► save ──► complete
//! ```
//!
//! The QR is stamped *after* the upload so it can point at the uploaded copy.
//! When no uploader is configured, or the upload fails or runs past its
//! deadline, the QR carries the placeholder URL instead and the export still
//! succeeds. Only one export runs at a time: a second call while one is in
//! flight gets [`ExportError::Busy`].

use crate::compose::Compositor;
use crate::config::BoothConfig;
use crate::deadline;
use crate::imaging::qr::qr_payload;
use crate::session::{Session, SessionError};
use crate::types::CanvasSize;
use chrono::{Local, NaiveDate};
use image::{ImageFormat, RgbaImage};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no uploader configured")]
    Declined,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("an export is already in progress")]
    Busy,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Uploaders
// =============================================================================

/// Publishes a finished print and returns the URL it can be fetched from.
pub trait Uploader: Send + Sync {
    fn upload(&self, png: &[u8]) -> Result<String, UploadError>;
}

/// Uploader used when sharing is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUploader;

impl Uploader for NoUploader {
    fn upload(&self, _png: &[u8]) -> Result<String, UploadError> {
        Err(UploadError::Declined)
    }
}

/// Writes prints into a directory served at `base_url`.
///
/// Files are named by content hash, so re-exporting the same print reuses the
/// same URL. Files older than the retention window are pruned on each upload.
#[derive(Debug, Clone)]
pub struct ShareDirUploader {
    dir: PathBuf,
    base_url: String,
    retention: Duration,
}

impl ShareDirUploader {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>, retention: Duration) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into(),
            retention,
        }
    }

    /// Remove shared prints last modified before `now - retention`.
    pub fn prune(&self, now: SystemTime) -> Result<usize, UploadError> {
        let Some(cutoff) = now.checked_sub(self.retention) else {
            return Ok(0);
        };
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|e| e != "png") {
                continue;
            }
            let modified = fs::metadata(&path)?.modified()?;
            if modified < cutoff {
                fs::remove_file(&path)?;
                debug!(path = %path.display(), "pruned expired share");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Uploader for ShareDirUploader {
    fn upload(&self, png: &[u8]) -> Result<String, UploadError> {
        fs::create_dir_all(&self.dir)?;
        match self.prune(SystemTime::now()) {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "pruned expired shares"),
            Err(e) => warn!(error = %e, "share pruning failed"),
        }

        let hash = format!("{:x}", Sha256::digest(png));
        let name = format!("{}.png", &hash[..16]);
        let path = self.dir.join(&name);
        if !path.exists() {
            let tmp = self.dir.join(format!("{name}.tmp"));
            fs::write(&tmp, png)?;
            fs::rename(&tmp, &path)?;
        }
        Ok(format!("{}/{name}", self.base_url.trim_end_matches('/')))
    }
}

/// Pick the uploader `config` asks for. A relative `share_dir` is resolved
/// against `base`.
pub fn uploader_from_config(config: &BoothConfig, base: &Path) -> Arc<dyn Uploader> {
    match (&config.export.share_dir, &config.export.share_base_url) {
        (Some(dir), Some(url)) => Arc::new(ShareDirUploader::new(
            base.join(dir),
            url.clone(),
            Duration::from_secs(config.export.retention_secs),
        )),
        _ => Arc::new(NoUploader),
    }
}

// =============================================================================
// Export flow
// =============================================================================

/// Where and how prints are written.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    /// Per-photo decode deadline.
    pub load_timeout: Duration,
    pub upload_timeout: Duration,
    pub qr_prefix: String,
    pub placeholder_url: String,
}

impl ExportSettings {
    /// `output.dir` is resolved against `base` when relative.
    pub fn from_config(config: &BoothConfig, base: &Path) -> Self {
        Self {
            output_dir: base.join(&config.output.dir),
            file_prefix: config.output.file_prefix.clone(),
            load_timeout: config.render_timeouts().slot,
            upload_timeout: Duration::from_millis(config.export.upload_timeout_ms),
            qr_prefix: config.export.qr_prefix.clone(),
            placeholder_url: config.export.placeholder_url.clone(),
        }
    }
}

/// What an export produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub uploaded_url: Option<String>,
    pub qr_payload: String,
    pub elapsed: Duration,
}

/// Clears the busy flag when the export ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ExportError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(flag))
            .map_err(|_| ExportError::Busy)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Exporter {
    compositor: Arc<Compositor>,
    uploader: Arc<dyn Uploader>,
    settings: ExportSettings,
    busy: AtomicBool,
}

impl Exporter {
    pub fn new(compositor: Arc<Compositor>, uploader: Arc<dyn Uploader>, settings: ExportSettings) -> Self {
        Self {
            compositor,
            uploader,
            settings,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Export with today's date in the file name.
    pub fn export(&self, session: &mut Session) -> Result<ExportOutcome, ExportError> {
        self.export_on(session, Local::now().date_naive())
    }

    /// Render, upload, stamp and save the print, then reset the session.
    pub fn export_on(&self, session: &mut Session, date: NaiveDate) -> Result<ExportOutcome, ExportError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let started = Instant::now();

        let images = load_images(session.export_images()?, self.settings.load_timeout);
        let request = session.render_request(&images, CanvasSize::EXPORT);
        let print = self.compositor.render(&request);

        let uploaded_url = self.upload(&print);
        let payload = qr_payload(
            &self.settings.qr_prefix,
            uploaded_url.as_deref(),
            &self.settings.placeholder_url,
        );
        let print = self.compositor.stamp_qr_onto(print, &payload);

        fs::create_dir_all(&self.settings.output_dir)?;
        let path = available_path(&self.settings.output_dir, &self.settings.file_prefix, date);
        print.save(&path)?;
        session.complete();

        let elapsed = started.elapsed();
        info!(
            path = %path.display(),
            uploaded = uploaded_url.is_some(),
            elapsed_ms = elapsed.as_millis() as u64,
            "export saved"
        );
        Ok(ExportOutcome {
            path,
            uploaded_url,
            qr_payload: payload,
            elapsed,
        })
    }

    /// Upload the QR-less print. Any failure degrades to `None`.
    fn upload(&self, print: &RgbaImage) -> Option<String> {
        let mut png = Vec::new();
        if let Err(e) = print.write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
            warn!(error = %e, "could not encode print for upload");
            return None;
        }
        let uploader = Arc::clone(&self.uploader);
        match deadline::run_with_deadline("upload", self.settings.upload_timeout, move || {
            uploader.upload(&png)
        }) {
            Ok(Ok(url)) => Some(url),
            Ok(Err(UploadError::Declined)) => {
                debug!("no uploader; QR uses placeholder");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "upload failed; QR uses placeholder");
                None
            }
            Err(e) => {
                warn!(error = %e, "upload abandoned; QR uses placeholder");
                None
            }
        }
    }
}

/// Decode captured photos for rendering, all within `timeout`.
///
/// Output is aligned with `paths`. A photo that is missing, corrupt or slow to
/// decode becomes `None` and its slots are left empty.
pub fn load_images(paths: &[PathBuf], timeout: Duration) -> Vec<Option<Arc<RgbaImage>>> {
    let deadline = Instant::now() + timeout;
    let pending: Vec<_> = paths
        .iter()
        .map(|path| {
            let owned = path.clone();
            let work = deadline::spawn("decode", move || image::open(owned).map(|img| img.to_rgba8()));
            (path, work)
        })
        .collect();

    pending
        .into_iter()
        .map(|(path, work)| match work.wait_until(deadline) {
            Ok(Ok(img)) => Some(Arc::new(img)),
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "could not load photo; slot left empty");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "photo load abandoned; slot left empty");
                None
            }
        })
        .collect()
}

/// `<prefix>-YYYY-MM-DD.png`, or `<prefix>-YYYY-MM-DD-N.png` if taken.
pub fn export_file_name(prefix: &str, date: NaiveDate, copy: u32) -> String {
    let day = date.format("%Y-%m-%d");
    if copy <= 1 {
        format!("{prefix}-{day}.png")
    } else {
        format!("{prefix}-{day}-{copy}.png")
    }
}

fn available_path(dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    (1..)
        .map(|copy| dir.join(export_file_name(prefix, date, copy)))
        .find(|p| !p.exists())
        .unwrap_or_else(|| dir.join(export_file_name(prefix, date, 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Fonts;
    use crate::imaging::calculations::Layout;
    use crate::test_helpers::{MarkerQr, four_photos};
    use crate::types::{FrameStyle, Placement};
    use image::Rgba;
    use std::sync::Mutex;
    use std::thread;
    use tempfile::TempDir;

    const MARKER: Rgba<u8> = Rgba([255, 0, 0, 255]);

    struct FixedUploader(String);

    impl Uploader for FixedUploader {
        fn upload(&self, _png: &[u8]) -> Result<String, UploadError> {
            Ok(self.0.clone())
        }
    }

    struct SlowUploader(Duration);

    impl Uploader for SlowUploader {
        fn upload(&self, _png: &[u8]) -> Result<String, UploadError> {
            thread::sleep(self.0);
            Ok("https://too.late/x.png".into())
        }
    }

    /// Uploader that records the bytes it was given.
    #[derive(Default)]
    struct CapturingUploader(Mutex<Vec<u8>>);

    impl Uploader for CapturingUploader {
        fn upload(&self, png: &[u8]) -> Result<String, UploadError> {
            *self.0.lock().unwrap() = png.to_vec();
            Ok("https://share.example/p.png".into())
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn settings(dir: &Path) -> ExportSettings {
        ExportSettings {
            output_dir: dir.join("prints"),
            file_prefix: "tanauan-clicks".into(),
            load_timeout: Duration::from_secs(2),
            upload_timeout: Duration::from_millis(500),
            qr_prefix: "scan:".into(),
            placeholder_url: "https://placeholder.example/".into(),
        }
    }

    fn exporter(dir: &Path, uploader: Arc<dyn Uploader>) -> Exporter {
        let compositor = Compositor::new(Arc::new(Fonts::none())).with_qr(Arc::new(MarkerQr(MARKER)));
        Exporter::new(Arc::new(compositor), uploader, settings(dir))
    }

    fn captured_session(dir: &Path) -> Session {
        let mut paths = Vec::new();
        for (i, img) in four_photos().iter().enumerate() {
            let path = dir.join(format!("{:03}-original.png", i + 1));
            img.save(&path).unwrap();
            paths.push(path);
        }
        let mut session = Session::default();
        session.record_capture(paths).unwrap();
        session.set_frame(FrameStyle::Ocean);
        session
    }

    #[test]
    fn export_writes_dated_print_and_resets_session() {
        let tmp = TempDir::new().unwrap();
        let mut session = captured_session(tmp.path());
        let outcome = exporter(tmp.path(), Arc::new(NoUploader))
            .export_on(&mut session, date())
            .unwrap();

        assert_eq!(
            outcome.path,
            tmp.path().join("prints/tanauan-clicks-2026-03-14.png")
        );
        let print = image::open(&outcome.path).unwrap().to_rgba8();
        assert_eq!(print.dimensions(), (1200, 1800));
        // Both QR stamps present
        assert_eq!(*print.get_pixel(520, 1660), MARKER);
        assert_eq!(*print.get_pixel(1120, 1660), MARKER);

        assert_eq!(outcome.uploaded_url, None);
        assert_eq!(outcome.qr_payload, "scan:https://placeholder.example/");
        assert!(session.config().current_images.is_empty());
        assert_eq!(session.config().frame, FrameStyle::Black);
    }

    #[test]
    fn uploaded_url_goes_into_qr() {
        let tmp = TempDir::new().unwrap();
        let mut session = captured_session(tmp.path());
        let up = Arc::new(FixedUploader("https://share.example/abc.png".into()));
        let outcome = exporter(tmp.path(), up).export_on(&mut session, date()).unwrap();
        assert_eq!(outcome.qr_payload, "scan:https://share.example/abc.png");
        assert_eq!(outcome.uploaded_url.as_deref(), Some("https://share.example/abc.png"));
    }

    #[test]
    fn uploaded_copy_has_no_qr() {
        let tmp = TempDir::new().unwrap();
        let mut session = captured_session(tmp.path());
        let up = Arc::new(CapturingUploader::default());
        exporter(tmp.path(), up.clone()).export_on(&mut session, date()).unwrap();
        let bytes = up.0.lock().unwrap().clone();
        let uploaded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_ne!(*uploaded.get_pixel(520, 1660), MARKER);
    }

    #[test]
    fn slow_upload_falls_back_to_placeholder() {
        let tmp = TempDir::new().unwrap();
        let mut session = captured_session(tmp.path());
        let mut ex = exporter(tmp.path(), Arc::new(SlowUploader(Duration::from_secs(3))));
        ex.settings.upload_timeout = Duration::from_millis(50);
        let outcome = ex.export_on(&mut session, date()).unwrap();
        assert_eq!(outcome.uploaded_url, None);
        assert!(outcome.qr_payload.ends_with("placeholder.example/"));
        assert!(!ex.is_busy());
    }

    #[test]
    fn same_day_exports_do_not_overwrite() {
        let tmp = TempDir::new().unwrap();
        let ex = exporter(tmp.path(), Arc::new(NoUploader));
        let mut first = captured_session(tmp.path());
        let mut second = captured_session(tmp.path());
        let a = ex.export_on(&mut first, date()).unwrap();
        let b = ex.export_on(&mut second, date()).unwrap();
        assert_ne!(a.path, b.path);
        assert!(b.path.ends_with("tanauan-clicks-2026-03-14-2.png"));
    }

    #[test]
    fn export_refused_when_busy() {
        let tmp = TempDir::new().unwrap();
        let ex = exporter(tmp.path(), Arc::new(NoUploader));
        let mut session = captured_session(tmp.path());
        let _held = BusyGuard::acquire(&ex.busy).unwrap();
        assert!(matches!(ex.export_on(&mut session, date()), Err(ExportError::Busy)));
        // Session untouched
        assert_eq!(session.config().current_images.len(), 4);
    }

    #[test]
    fn busy_flag_clears_after_failure() {
        let tmp = TempDir::new().unwrap();
        let ex = exporter(tmp.path(), Arc::new(NoUploader));
        let mut empty = Session::default();
        assert!(matches!(
            ex.export_on(&mut empty, date()),
            Err(ExportError::Session(SessionError::NoImages))
        ));
        assert!(!ex.is_busy());
    }

    #[test]
    fn unselected_retake_blocks_export() {
        let tmp = TempDir::new().unwrap();
        let mut session = captured_session(tmp.path());
        let retakes = session.config().current_images.clone();
        session.record_retake(retakes).unwrap();
        let result = exporter(tmp.path(), Arc::new(NoUploader)).export_on(&mut session, date());
        assert!(matches!(
            result,
            Err(ExportError::Session(SessionError::SelectionRequired))
        ));
        assert!(!tmp.path().join("prints").exists());
    }

    #[test]
    fn corrupt_capture_leaves_its_row_blank() {
        let tmp = TempDir::new().unwrap();
        let mut session = captured_session(tmp.path());
        fs::write(tmp.path().join("003-original.png"), b"not a png").unwrap();
        session.set_frame(FrameStyle::Black);

        let outcome = exporter(tmp.path(), Arc::new(NoUploader))
            .export_on(&mut session, date())
            .unwrap();
        let print = image::open(&outcome.path).unwrap().to_rgba8();

        let layout = Layout::new(CanvasSize::EXPORT);
        let white = Rgba([255, 255, 255, 255]);
        let center = |slot: usize| {
            let r = layout.photo_rect(slot, &Placement::default_for_slot(slot));
            *print.get_pixel((r.x + r.width / 2.0) as u32, (r.y + r.height / 2.0) as u32)
        };
        // Third photo fills slots 4 and 5; only their white backing remains.
        assert_eq!(center(4), white);
        assert_eq!(center(5), white);
        assert_ne!(center(2), white);
        assert_ne!(center(6), white);
        assert!(session.config().current_images.is_empty());
    }

    #[test]
    fn missing_capture_file_does_not_abort_export() {
        let tmp = TempDir::new().unwrap();
        let mut session = Session::default();
        session.record_capture(vec![tmp.path().join("gone.png")]).unwrap();
        let outcome = exporter(tmp.path(), Arc::new(NoUploader)).export_on(&mut session, date());
        assert!(outcome.unwrap().path.exists());
    }

    #[test]
    fn load_images_keeps_alignment_with_paths() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("001-original.png");
        RgbaImage::from_pixel(3, 2, Rgba([9, 9, 9, 255])).save(&good).unwrap();
        let bad = tmp.path().join("002-original.png");
        fs::write(&bad, b"garbage").unwrap();
        let gone = tmp.path().join("003-original.png");

        let loaded = load_images(&[good, bad, gone], Duration::from_secs(2));
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].as_ref().map(|img| img.dimensions()), Some((3, 2)));
        assert!(loaded[1].is_none());
        assert!(loaded[2].is_none());
    }

    // =========================================================================
    // Share directory
    // =========================================================================

    #[test]
    fn share_dir_names_by_content() {
        let tmp = TempDir::new().unwrap();
        let up = ShareDirUploader::new(tmp.path(), "https://booth.local/s/", Duration::from_secs(60));
        let a = up.upload(b"print one").unwrap();
        let again = up.upload(b"print one").unwrap();
        let b = up.upload(b"print two").unwrap();
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert!(a.starts_with("https://booth.local/s/"));
        assert!(a.ends_with(".png"));
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[test]
    fn prune_removes_only_expired() {
        let tmp = TempDir::new().unwrap();
        let up = ShareDirUploader::new(tmp.path(), "https://x", Duration::from_secs(3600));
        up.upload(b"old").unwrap();
        fs::write(tmp.path().join("notes.txt"), "keep").unwrap();
        assert_eq!(up.prune(SystemTime::now()).unwrap(), 0);
        let later = SystemTime::now() + Duration::from_secs(7200);
        assert_eq!(up.prune(later).unwrap(), 1);
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn config_without_share_dir_uses_no_uploader() {
        let config = BoothConfig::default();
        let up = uploader_from_config(&config, Path::new("."));
        assert!(matches!(up.upload(b"x"), Err(UploadError::Declined)));
    }

    #[test]
    fn file_name_format() {
        assert_eq!(export_file_name("booth", date(), 1), "booth-2026-03-14.png");
        assert_eq!(export_file_name("booth", date(), 3), "booth-2026-03-14-3.png");
    }
}
