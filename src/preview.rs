//! Debounced live preview.
//!
//! Every edit produces a new [`RenderRequest`]. Rendering each one would
//! queue up stale work behind a fast-typing guest, so the [`PreviewScheduler`]
//! keeps a single pending request and a background worker that renders it
//! once edits have been quiet for the debounce window (trailing debounce).
//!
//! Each request gets a generation number. A render that finishes after a newer
//! request arrived is dropped, and [`PreviewSlot`] only ever accepts newer
//! frames, so the last writer wins.

use crate::compose::RenderRequest;
use image::RgbaImage;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A rendered preview tagged with the request generation it came from.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub generation: u64,
    pub image: Arc<RgbaImage>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the newest finished preview.
#[derive(Debug, Default)]
pub struct PreviewSlot {
    frame: Mutex<Option<PreviewFrame>>,
    updated: Condvar,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame` unless a newer one is already there.
    pub fn publish(&self, frame: PreviewFrame) -> bool {
        let mut current = lock(&self.frame);
        if current
            .as_ref()
            .is_some_and(|f| f.generation >= frame.generation)
        {
            return false;
        }
        *current = Some(frame);
        self.updated.notify_all();
        true
    }

    pub fn latest(&self) -> Option<PreviewFrame> {
        lock(&self.frame).clone()
    }

    /// Block until a frame of at least `generation` is published.
    pub fn wait_for(&self, generation: u64, timeout: Duration) -> Option<PreviewFrame> {
        let guard = lock(&self.frame);
        let (guard, _) = self
            .updated
            .wait_timeout_while(guard, timeout, |f| {
                f.as_ref().is_none_or(|f| f.generation < generation)
            })
            .unwrap_or_else(PoisonError::into_inner);
        guard.clone().filter(|f| f.generation >= generation)
    }
}

/// The one request waiting for the debounce to expire.
struct QueuedRequest {
    generation: u64,
    request: RenderRequest,
}

#[derive(Default)]
struct State {
    pending: Option<QueuedRequest>,
    /// Newest generation handed out.
    generation: u64,
    last_change: Option<Instant>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

type RenderFn = Box<dyn FnMut(&RenderRequest) -> RgbaImage + Send>;
type FrameFn = Box<dyn FnMut(&PreviewFrame) + Send>;

/// Single-slot, trailing-debounce render scheduler.
pub struct PreviewScheduler {
    shared: Arc<Shared>,
    slot: Arc<PreviewSlot>,
    worker: Option<JoinHandle<()>>,
}

impl PreviewScheduler {
    /// Start the worker. `render` runs on the worker thread.
    pub fn spawn(
        debounce: Duration,
        slot: Arc<PreviewSlot>,
        render: impl FnMut(&RenderRequest) -> RgbaImage + Send + 'static,
    ) -> Self {
        Self::spawn_with_listener(debounce, slot, render, |_| {})
    }

    /// Like [`PreviewScheduler::spawn`], calling `on_frame` for every frame
    /// that makes it into the slot.
    pub fn spawn_with_listener(
        debounce: Duration,
        slot: Arc<PreviewSlot>,
        render: impl FnMut(&RenderRequest) -> RgbaImage + Send + 'static,
        on_frame: impl FnMut(&PreviewFrame) + Send + 'static,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = {
            let shared = Arc::clone(&shared);
            let slot = Arc::clone(&slot);
            thread::Builder::new()
                .name("preview".into())
                .spawn(move || worker_loop(&shared, &slot, debounce, Box::new(render), Box::new(on_frame)))
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not start preview worker; previews disabled");
                None
            }
        };
        Self {
            shared,
            slot,
            worker,
        }
    }

    /// Replace the pending request. Returns its generation.
    pub fn request(&self, request: RenderRequest) -> u64 {
        let mut state = lock(&self.shared.state);
        state.generation += 1;
        let generation = state.generation;
        if state.pending.replace(QueuedRequest { generation, request }).is_some() {
            debug!(generation, "superseded pending preview");
        }
        state.last_change = Some(Instant::now());
        self.shared.wake.notify_all();
        generation
    }

    /// Newest generation requested so far.
    pub fn generation(&self) -> u64 {
        lock(&self.shared.state).generation
    }

    pub fn slot(&self) -> &Arc<PreviewSlot> {
        &self.slot
    }

    /// Stop the worker, dropping any request still waiting out its debounce.
    pub fn shutdown(&mut self) {
        lock(&self.shared.state).shutdown = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.worker.take()
            && handle.join().is_err()
        {
            warn!("preview worker panicked");
        }
    }
}

impl Drop for PreviewScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    shared: &Shared,
    slot: &PreviewSlot,
    debounce: Duration,
    mut render: RenderFn,
    mut on_frame: FrameFn,
) {
    loop {
        let QueuedRequest {
            generation,
            request,
        } = {
            let mut state = lock(&shared.state);
            loop {
                if state.shutdown {
                    return;
                }
                // Wait out the quiet period, restarting it on every change.
                match (state.pending.is_some(), state.last_change) {
                    (true, Some(changed)) => {
                        let due = changed + debounce;
                        let now = Instant::now();
                        if now >= due {
                            break;
                        }
                        state = shared
                            .wake
                            .wait_timeout(state, due - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    }
                    _ => {
                        state = shared
                            .wake
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                }
            }
            match state.pending.take() {
                Some(p) => p,
                None => continue,
            }
        };

        debug!(generation, "rendering preview");
        let image = render(&request);

        if lock(&shared.state).generation != generation {
            debug!(generation, "preview superseded while rendering; dropped");
            continue;
        }
        let frame = PreviewFrame {
            generation,
            image: Arc::new(image),
        };
        if slot.publish(frame.clone()) {
            on_frame(&frame);
        }
    }
}
