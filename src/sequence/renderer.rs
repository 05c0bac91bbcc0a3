use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::assets::decode::DecodedFrame;
use crate::assets::loader::{FrameLoad, FrameLoadResult};
use crate::cache::frame_cache::FrameCache;
use crate::foundation::core::{FrameIndex, FrameSpan, Viewport};
use crate::render::canvas::Canvas2d;
use crate::render::geometry::aspect_fill;

/// Why a paint attempt did not touch the canvas. Never surfaced as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Another attempt is waiting on a load; this request only moved the target.
    Busy,
    /// The target frame is loading; it is painted when the load lands, if still targeted.
    Pending,
    /// The frame could not be placed (empty image or canvas).
    Degenerate,
    /// The renderer was disposed.
    Disposed,
}

/// Result of a paint attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaintOutcome {
    Painted(FrameIndex),
    Skipped(SkipReason),
}

impl PaintOutcome {
    pub fn painted(self) -> Option<FrameIndex> {
        match self {
            Self::Painted(index) => Some(index),
            Self::Skipped(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub painted: u64,
    pub coalesced: u64,
    pub deferred: u64,
    pub failed_loads: u64,
}

struct RendererState<C> {
    canvas: C,
    // Latest requested frame. Overwritten, never queued.
    target: Option<FrameIndex>,
    // Frame the single in-progress attempt is waiting on.
    awaiting: Option<FrameIndex>,
    last_rendered: Option<FrameIndex>,
    disposed: bool,
    stats: RenderStats,
}

impl<C: Canvas2d> RendererState<C> {
    fn paint(&mut self, index: FrameIndex, frame: &DecodedFrame) -> PaintOutcome {
        let size = self.canvas.size();
        let Some(fill) = aspect_fill(size.to_size(), frame.size()) else {
            return PaintOutcome::Skipped(SkipReason::Degenerate);
        };
        self.canvas.clear();
        if !size.is_empty() {
            self.canvas.draw_image(frame, fill.dest);
        }
        self.last_rendered = Some(index);
        self.stats.painted += 1;
        tracing::debug!(%index, scale = fill.scale, "painted frame");
        PaintOutcome::Painted(index)
    }
}

enum Settle {
    Done(Option<FrameIndex>),
    Load(FrameIndex, FrameLoad),
}

/// Maps scroll progress to frames and paints them, one attempt at a time.
///
/// Requests arriving while an attempt waits on a load only move the target; when the load
/// lands, the attempt paints whatever is targeted *then*. Intermediate frames of a fast
/// scroll are skipped.
pub struct ScrollSyncRenderer<C> {
    state: Rc<RefCell<RendererState<C>>>,
    cache: FrameCache,
    spawner: Rc<dyn LocalSpawn>,
    prefetch_radius: u32,
}

impl<C> fmt::Debug for ScrollSyncRenderer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ScrollSyncRenderer")
            .field("target", &state.target)
            .field("awaiting", &state.awaiting)
            .field("last_rendered", &state.last_rendered)
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl<C: Canvas2d + 'static> ScrollSyncRenderer<C> {
    pub fn new(canvas: C, cache: FrameCache, spawner: Rc<dyn LocalSpawn>) -> Self {
        let prefetch_radius = cache.config().prefetch_radius;
        Self {
            state: Rc::new(RefCell::new(RendererState {
                canvas,
                target: None,
                awaiting: None,
                last_rendered: None,
                disposed: false,
                stats: RenderStats::default(),
            })),
            cache,
            spawner,
            prefetch_radius,
        }
    }

    pub fn span(&self) -> FrameSpan {
        self.cache.span()
    }

    pub fn canvas(&self) -> Ref<'_, C> {
        Ref::map(self.state.borrow(), |s| &s.canvas)
    }

    pub fn last_rendered(&self) -> Option<FrameIndex> {
        self.state.borrow().last_rendered
    }

    pub fn target(&self) -> Option<FrameIndex> {
        self.state.borrow().target
    }

    /// Whether an attempt is waiting on a frame load.
    pub fn is_busy(&self) -> bool {
        self.state.borrow().awaiting.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.borrow().disposed
    }

    pub fn stats(&self) -> RenderStats {
        self.state.borrow().stats
    }

    /// Paint the frame `progress` maps to.
    pub fn request_progress(&self, progress: f64) -> PaintOutcome {
        let index = self.span().frame_for_progress(progress);
        self.request_frame(i64::from(index.0))
    }

    /// Paint frame `raw`, clamped to the sequence range.
    pub fn request_frame(&self, raw: i64) -> PaintOutcome {
        let index = self.span().clamp(raw);
        let outcome = {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                return PaintOutcome::Skipped(SkipReason::Disposed);
            }
            state.target = Some(index);
            if state.awaiting.is_some() {
                state.stats.coalesced += 1;
                return PaintOutcome::Skipped(SkipReason::Busy);
            }
            match self.cache.get(index) {
                Some(frame) => state.paint(index, &frame),
                None => {
                    state.awaiting = Some(index);
                    state.stats.deferred += 1;
                    PaintOutcome::Skipped(SkipReason::Pending)
                }
            }
        };

        match outcome {
            PaintOutcome::Painted(index) => {
                self.cache.prefetch_around(index, self.prefetch_radius);
            }
            PaintOutcome::Skipped(SkipReason::Pending) => {
                let load = self.cache.get_or_load(index);
                self.spawn_settle(index, load);
            }
            PaintOutcome::Skipped(_) => {}
        }
        outcome
    }

    /// Resize the canvas backing store and repaint the last rendered frame.
    pub fn resize(&self, size: Viewport) -> PaintOutcome {
        let last = {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                return PaintOutcome::Skipped(SkipReason::Disposed);
            }
            state.canvas.set_size(size);
            state.last_rendered
        };
        let Some(last) = last else {
            return PaintOutcome::Skipped(SkipReason::Pending);
        };
        match self.cache.get(last) {
            Some(frame) => self.state.borrow_mut().paint(last, &frame),
            // Cache was cleared under us: fall back to a normal request.
            None => self.request_frame(i64::from(last.0)),
        }
    }

    /// Stop painting. Loads that land later are ignored.
    pub fn dispose(&self) {
        let mut state = self.state.borrow_mut();
        state.disposed = true;
        state.awaiting = None;
    }

    fn spawn_settle(&self, index: FrameIndex, load: FrameLoad) {
        let state = Rc::downgrade(&self.state);
        let cache = self.cache.clone();
        let radius = self.prefetch_radius;
        let task = async move {
            let mut index = index;
            let mut result = load.await;
            loop {
                match conclude_attempt(&state, &cache, index, result) {
                    Settle::Done(painted) => {
                        if let Some(painted) = painted {
                            cache.prefetch_around(painted, radius);
                        }
                        return;
                    }
                    Settle::Load(next, load) => {
                        index = next;
                        result = load.await;
                    }
                }
            }
        };
        if let Err(err) = self.spawner.spawn_local(task) {
            tracing::warn!(%index, error = %err, "could not spawn paint attempt");
            self.state.borrow_mut().awaiting = None;
        }
    }
}

// Conclude an attempt whose load for `loaded` finished. Paints the current target if it is
// available, otherwise hands back the load to wait on next.
fn conclude_attempt<C: Canvas2d>(
    state: &Weak<RefCell<RendererState<C>>>,
    cache: &FrameCache,
    loaded: FrameIndex,
    result: FrameLoadResult,
) -> Settle {
    let Some(shared) = state.upgrade() else {
        return Settle::Done(None);
    };
    let mut state = shared.borrow_mut();
    if state.disposed {
        tracing::debug!(index = %loaded, "frame landed after dispose");
        return Settle::Done(None);
    }

    let loaded_frame = match result {
        Ok(frame) => Some(frame),
        Err(err) => {
            state.stats.failed_loads += 1;
            tracing::warn!(
                index = %loaded,
                reason = %err.reason,
                "skipping paint of failed frame"
            );
            None
        }
    };

    let target = state.target.unwrap_or(loaded);
    let frame: Option<Arc<DecodedFrame>> = if target == loaded {
        loaded_frame
    } else {
        cache.get(target)
    };

    match frame {
        Some(frame) => {
            state.awaiting = None;
            Settle::Done(state.paint(target, &frame).painted())
        }
        None if target == loaded => {
            // Failed load of the current target: keep the stale frame on screen.
            state.awaiting = None;
            Settle::Done(None)
        }
        None => {
            state.awaiting = Some(target);
            drop(state);
            Settle::Load(target, cache.get_or_load(target))
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/renderer.rs"]
mod tests;
