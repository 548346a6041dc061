//! # Snapbooth
//!
//! A photobooth print compositor. Guests take a short burst of photos, pick a
//! filter, a frame and captions, and get a 4×6 in print: a 4×2 grid where
//! every photo appears twice (once per column, so the strip can be cut in
//! half), with captions, watermarks and a QR code pointing at the shared copy.
//!
//! # Flow
//!
//! ```text
//! capture ──► session.json ──► edit (debounced preview) ──► export
//!    │            ▲   │                                         │
//!    └─ retake ───┘   └─ final selection (after a retake) ──────┘
//! ```
//!
//! Each CLI command loads the session, applies one operation, and saves it
//! back. Rendering is a pure function of the session plus the decoded photos.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`session`] | Capture/retake/selection state machine, edits, tolerant persistence |
//! | [`capture`] | `Camera` trait, directory camera, countdown-paced capture runs |
//! | [`compose`] | The compositor: paints a [`compose::RenderRequest`] onto a surface |
//! | [`preview`] | Single-slot trailing-debounce preview scheduler |
//! | [`export`] | Render → upload → QR stamp → save, one export at a time |
//! | [`imaging`] | Filters, layout geometry, canvas, frames, text and QR rendering |
//! | [`cache`] | In-memory content-addressed cache of filtered slot images |
//! | [`deadline`] | Run work on a worker thread with a time limit |
//! | [`config`] | `booth.toml` loading, stock defaults, merging and validation |
//! | [`types`] | Shared value types: filters, frames, placements, captions |
//! | [`naming`] | `NNN-name` filename convention used for captured frames |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Failures Degrade, They Don't Abort
//!
//! A guest is standing in front of the booth. A filter that stalls, a QR that
//! cannot be encoded, or an upload that never answers must not leave them
//! without a print. Every such step runs under a deadline
//! ([`deadline::run_with_deadline`]); on failure the step is skipped or
//! replaced (unfiltered photo, placeholder QR) and a warning is logged. Only
//! invariant violations (no photos, unselected retake, over-long text) are
//! refused, and those are checked by [`session::Session`] before rendering.
//!
//! ## Drawing Behind a Trait
//!
//! The compositor draws through [`imaging::Surface`]. Production uses the
//! raster canvas; tests use a recording surface and assert on the sequence of
//! draw calls, without fonts or pixels.

pub mod cache;
pub mod capture;
pub mod compose;
pub mod config;
pub mod deadline;
pub mod export;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod preview;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
