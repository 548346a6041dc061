//! CLI output formatting.
//!
//! Output is **information-first**: each entity (photo, slot, caption) leads
//! with its positional index or name, with file paths as indented `Source:`
//! context lines.
//!
//! ## Status
//!
//! ```text
//! Session
//!     Shots: 4 (timer 3s)
//!     Filter: sepia 50%
//!     Frame: black
//!     Developer mode: off
//! Photos (4)
//!     001 001-original.png
//!         Source: state/captures/001-original.png
//! Retake: available
//! Final selection: not needed
//! Text
//!     Top: Tanauan Clicks
//!     Bottom: Thank you! (15 left)
//! ```
//!
//! ## Capture
//!
//! ```text
//! Shot 1: 3...
//! Shot 1: 2...
//! Shot 1: 1...
//! 001 captured → captures/001-original.png
//! ```
//!
//! ## Export
//!
//! ```text
//! Saved prints/tanauan-clicks-2026-03-14.png
//!     QR: https://tanauan-clicks-qr-placeholder.com/ (placeholder)
//!     Filters: 8 filtered
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::cache::CacheStats;
use crate::capture::CaptureEvent;
use crate::export::ExportOutcome;
use crate::session::{FINAL_SELECTION_SIZE, Session};
use crate::types::{Placement, TextBlock};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Photo entry: index + file name, source path as context.
fn photo_lines(index: usize, path: &Path, marker: &str) -> Vec<String> {
    vec![
        format!("{}{} {}{}", indent(1), format_index(index), file_name(path), marker),
        format!("{}Source: {}", indent(2), path.display()),
    ]
}

/// `left 3% top 4% 85×85%`, or `right 5% ...` when right-anchored.
pub fn placement_summary(p: &Placement) -> String {
    let horizontal = match p.right_anchor() {
        Some(r) => format!("right {r}%"),
        None => format!("left {}%", p.left),
    };
    format!("{horizontal} top {}% {}\u{d7}{}%", p.top, p.width, p.height)
}

// ============================================================================
// Status
// ============================================================================

pub fn format_status(session: &Session) -> Vec<String> {
    let c = session.config();
    let mut lines = vec!["Session".to_string()];
    lines.push(format!(
        "{}Shots: {} (timer {}s)",
        indent(1),
        c.shot_count,
        c.timer_delay
    ));
    if let Some(camera) = &c.camera_id {
        lines.push(format!("{}Camera: {camera}", indent(1)));
    }
    let filter = c.filter_spec();
    if filter.is_identity() {
        lines.push(format!("{}Filter: none", indent(1)));
    } else {
        lines.push(format!("{}Filter: {} {}%", indent(1), filter.kind, filter.intensity));
    }
    lines.push(format!("{}Frame: {}", indent(1), c.frame));
    lines.push(format!(
        "{}Developer mode: {}",
        indent(1),
        if c.developer_mode { "on" } else { "off" }
    ));

    if c.current_images.is_empty() {
        lines.push("Photos: none".to_string());
    } else {
        lines.push(format!("Photos ({})", c.current_images.len()));
        for (i, path) in c.current_images.iter().enumerate() {
            lines.extend(photo_lines(i + 1, path, ""));
        }
    }

    let retake = if c.has_retaken {
        format!("used ({} photos)", c.retake_images.len())
    } else if session.can_retake() {
        "available".to_string()
    } else {
        "not available".to_string()
    };
    lines.push(format!("Retake: {retake}"));

    let selection = match (c.has_retaken, c.final_selection_confirmed) {
        (_, true) => "confirmed",
        (true, false) => "required",
        (false, false) => "not needed",
    };
    lines.push(format!("Final selection: {selection}"));

    lines.extend(format_text(&c.text));
    if c.developer_mode {
        lines.extend(format_placements(&c.placements));
    }
    lines
}

pub fn print_status(session: &Session) {
    for line in format_status(session) {
        println!("{}", line);
    }
}

pub fn format_text(text: &TextBlock) -> Vec<String> {
    vec![
        "Text".to_string(),
        format!("{}Top: {}", indent(1), text.top_text),
        format!("{}Korean: {}", indent(1), text.korean_text),
        format!(
            "{}Bottom: {} ({} left)",
            indent(1),
            text.bottom_text,
            text.remaining_chars
        ),
        format!("{}Vertical: {}", indent(1), text.vertical_text),
        format!("{}Middle: {} (not printed)", indent(1), text.middle_text),
    ]
}

pub fn format_placements(placements: &[Placement]) -> Vec<String> {
    let mut lines = vec![format!("Placements ({} slots)", placements.len())];
    for (i, p) in placements.iter().enumerate() {
        let column = if i % 2 == 0 { "left" } else { "right" };
        lines.push(format!(
            "{}{} {column}: {}",
            indent(1),
            format_index(i + 1),
            placement_summary(p)
        ));
    }
    lines
}

/// A list of ids with the current one marked, e.g. for `filter` with no name.
pub fn format_choices<'a>(
    title: &str,
    ids: impl IntoIterator<Item = &'a str>,
    current: &str,
) -> Vec<String> {
    let mut lines = vec![title.to_string()];
    for id in ids {
        let marker = if id == current { " (current)" } else { "" };
        lines.push(format!("{}{id}{marker}", indent(1)));
    }
    lines
}

pub fn print_choices<'a>(title: &str, ids: impl IntoIterator<Item = &'a str>, current: &str) {
    for line in format_choices(title, ids, current) {
        println!("{}", line);
    }
}

// ============================================================================
// Final selection
// ============================================================================

/// Candidates for the final pick, preselected ones marked with `*`.
pub fn format_candidates(session: &Session) -> Vec<String> {
    let preselected = session.default_final_selection();
    let candidates = session.candidates();
    let mut lines = vec![format!(
        "Choose {FINAL_SELECTION_SIZE} of {} photos (* = suggested)",
        candidates.len()
    )];
    for (i, path) in candidates.iter().enumerate() {
        let marker = if preselected.contains(&i) { " *" } else { "" };
        lines.extend(photo_lines(i + 1, path, marker));
    }
    lines
}

pub fn print_candidates(session: &Session) {
    for line in format_candidates(session) {
        println!("{}", line);
    }
}

// ============================================================================
// Capture
// ============================================================================

pub fn format_capture_event(event: &CaptureEvent) -> Vec<String> {
    match event {
        CaptureEvent::Countdown { shot, remaining } => {
            vec![format!("Shot {shot}: {remaining}...")]
        }
        CaptureEvent::Shot { shot, path } => {
            vec![format!(
                "{} captured \u{2192} {}",
                format_index(*shot),
                path.display()
            )]
        }
        CaptureEvent::Pause { .. } => Vec::new(),
    }
}

pub fn print_capture_event(event: &CaptureEvent) {
    for line in format_capture_event(event) {
        println!("{}", line);
    }
}

// ============================================================================
// Preview / export
// ============================================================================

pub fn format_preview_output(path: &Path, generation: u64, stats: Option<&CacheStats>) -> Vec<String> {
    let mut lines = vec![format!("Preview #{generation} \u{2192} {}", path.display())];
    if let Some(stats) = stats {
        lines.push(format!("{}Filters: {stats}", indent(1)));
    }
    lines
}

pub fn print_preview_output(path: &Path, generation: u64, stats: Option<&CacheStats>) {
    for line in format_preview_output(path, generation, stats) {
        println!("{}", line);
    }
}

pub fn format_export_output(outcome: &ExportOutcome, stats: Option<&CacheStats>) -> Vec<String> {
    let mut lines = vec![format!("Saved {}", outcome.path.display())];
    let source = if outcome.uploaded_url.is_some() {
        "uploaded"
    } else {
        "placeholder"
    };
    lines.push(format!("{}QR: {} ({source})", indent(1), outcome.qr_payload));
    if let Some(stats) = stats {
        lines.push(format!("{}Filters: {stats}", indent(1)));
    }
    lines.push(format!(
        "{}Took {:.1}s",
        indent(1),
        outcome.elapsed.as_secs_f32()
    ));
    lines
}

pub fn print_export_output(outcome: &ExportOutcome, stats: Option<&CacheStats>) {
    for line in format_export_output(outcome, stats) {
        println!("{}", line);
    }
}
