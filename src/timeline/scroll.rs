//! Scroll-linked timeline: pins a region for a multiple of the viewport height and turns the
//! scroll position inside it into a progress value in `[0, 1]`.
//!
//! Bindings are tracked in a process-wide registry so that [`kill_all`] can tear every one of
//! them down at once. The registry must be created with [`register`] before the first binding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use crate::config::SequenceConfig;
use crate::foundation::error::{FramescrollError, FramescrollResult};
use crate::timeline::ease::Ease;

#[derive(Default)]
struct Registry {
    bindings: parking_lot::Mutex<Vec<Weak<AtomicBool>>>,
}

impl Registry {
    fn track(&self, killed: &Arc<AtomicBool>) {
        let mut bindings = self.bindings.lock();
        bindings.retain(|b| b.strong_count() > 0);
        bindings.push(Arc::downgrade(killed));
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Create the process-wide binding registry. Idempotent; returns `true` on the first call only.
pub fn register() -> bool {
    let mut first = false;
    REGISTRY.get_or_init(|| {
        first = true;
        tracing::debug!("scroll timeline registry initialized");
        Registry::default()
    });
    first
}

pub fn is_registered() -> bool {
    REGISTRY.get().is_some()
}

/// Kill every live binding. Returns how many were still alive.
pub fn kill_all() -> usize {
    let Some(registry) = REGISTRY.get() else {
        return 0;
    };
    let mut bindings = registry.bindings.lock();
    let mut killed = 0;
    for flag in bindings.drain(..).filter_map(|b| b.upgrade()) {
        if !flag.swap(true, Ordering::AcqRel) {
            killed += 1;
        }
    }
    tracing::debug!(killed, "killed all scroll timeline bindings");
    killed
}

/// Number of bindings that are alive and not killed.
pub fn live_bindings() -> usize {
    REGISTRY.get().map_or(0, |r| {
        r.bindings
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|f| !f.load(Ordering::Acquire))
            .count()
    })
}

/// Pinning and scrub options of one binding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollTimelineOpts {
    /// Document offset of the pinned container's top edge.
    pub start_offset: f64,
    /// Pinned scroll distance in viewport heights.
    pub pin_viewports: f64,
    /// Catch-up time of the smoothed progress. Zero follows the scroll exactly.
    pub scrub_secs: f64,
    pub ease: Ease,
}

impl ScrollTimelineOpts {
    pub fn from_config(config: &SequenceConfig, start_offset: f64) -> Self {
        Self {
            start_offset,
            pin_viewports: config.pin_viewports,
            scrub_secs: config.scrub_secs,
            ease: config.scrub_ease,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ScrubTween {
    from: f64,
    to: f64,
    elapsed: f64,
}

/// One pinned scroll binding.
#[derive(Debug)]
pub struct ScrollTimeline {
    opts: ScrollTimelineOpts,
    viewport_height: f64,
    scroll_y: f64,
    raw: f64,
    smoothed: f64,
    tween: Option<ScrubTween>,
    killed: Arc<AtomicBool>,
}

impl ScrollTimeline {
    /// Bind a new timeline. Fails if [`register`] was never called or the options are invalid.
    pub fn new(opts: ScrollTimelineOpts, viewport_height: f64) -> FramescrollResult<Self> {
        let Some(registry) = REGISTRY.get() else {
            return Err(FramescrollError::configuration(
                "scroll timeline used before register()",
            ));
        };
        if !(opts.pin_viewports.is_finite() && opts.pin_viewports > 0.0) {
            return Err(FramescrollError::configuration(
                "pin_viewports must be finite and > 0",
            ));
        }
        if !(opts.scrub_secs.is_finite() && opts.scrub_secs >= 0.0) {
            return Err(FramescrollError::configuration(
                "scrub_secs must be finite and >= 0",
            ));
        }

        let killed = Arc::new(AtomicBool::new(false));
        registry.track(&killed);
        Ok(Self {
            opts,
            viewport_height: viewport_height.max(0.0),
            scroll_y: opts.start_offset,
            raw: 0.0,
            smoothed: 0.0,
            tween: None,
            killed,
        })
    }

    pub fn opts(&self) -> ScrollTimelineOpts {
        self.opts
    }

    /// Scroll distance during which the container stays pinned.
    pub fn pin_distance(&self) -> f64 {
        self.opts.pin_viewports * self.viewport_height
    }

    pub fn pin_end(&self) -> f64 {
        self.opts.start_offset + self.pin_distance()
    }

    pub fn is_pinned(&self, scroll_y: f64) -> bool {
        scroll_y >= self.opts.start_offset && scroll_y <= self.pin_end()
    }

    /// Linear map of a scroll position to raw progress, clamped to `[0, 1]`.
    pub fn progress_for_scroll(&self, scroll_y: f64) -> f64 {
        let distance = self.pin_distance();
        if distance <= 0.0 {
            return if scroll_y < self.opts.start_offset {
                0.0
            } else {
                1.0
            };
        }
        ((scroll_y - self.opts.start_offset) / distance).clamp(0.0, 1.0)
    }

    /// Scroll position at which raw progress equals `progress`.
    pub fn scroll_for_progress(&self, progress: f64) -> f64 {
        self.opts.start_offset + progress.clamp(0.0, 1.0) * self.pin_distance()
    }

    /// Raw progress at the latest scroll position.
    pub fn raw_progress(&self) -> f64 {
        self.raw
    }

    /// Progress after scrub smoothing; this is what drives rendering.
    pub fn progress(&self) -> f64 {
        self.smoothed
    }

    pub fn is_settled(&self) -> bool {
        self.tween.is_none()
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    pub fn kill(&mut self) {
        self.killed.store(true, Ordering::Release);
        self.tween = None;
    }

    /// Feed a scroll position. Returns the new progress when it changes without scrubbing.
    pub fn set_scroll(&mut self, scroll_y: f64) -> Option<f64> {
        if self.is_killed() {
            return None;
        }
        self.scroll_y = scroll_y;
        self.retarget()
    }

    /// Move to `scroll_y` and skip the scrub catch-up.
    pub fn jump_to(&mut self, scroll_y: f64) -> Option<f64> {
        if self.is_killed() {
            return None;
        }
        self.scroll_y = scroll_y;
        self.raw = self.progress_for_scroll(scroll_y);
        self.tween = None;
        self.emit(self.raw)
    }

    /// Recompute the pin distance for a new viewport height, keeping the scroll position.
    pub fn set_viewport_height(&mut self, viewport_height: f64) -> Option<f64> {
        if self.is_killed() {
            return None;
        }
        self.viewport_height = viewport_height.max(0.0);
        self.retarget()
    }

    /// Advance the scrub tween by `dt`. Returns the new progress when it changes.
    pub fn tick(&mut self, dt: Duration) -> Option<f64> {
        if self.is_killed() {
            return None;
        }
        let mut tween = self.tween?;
        tween.elapsed += dt.as_secs_f64();
        let t = tween.elapsed / self.opts.scrub_secs;
        let value = if t >= 1.0 {
            self.tween = None;
            tween.to
        } else {
            self.tween = Some(tween);
            self.opts.ease.interpolate(tween.from, tween.to, t)
        };
        self.emit(value)
    }

    fn retarget(&mut self) -> Option<f64> {
        self.raw = self.progress_for_scroll(self.scroll_y);
        if self.opts.scrub_secs == 0.0 {
            self.tween = None;
            return self.emit(self.raw);
        }
        if self.raw == self.smoothed {
            self.tween = None;
            return None;
        }
        self.tween = Some(ScrubTween {
            from: self.smoothed,
            to: self.raw,
            elapsed: 0.0,
        });
        None
    }

    fn emit(&mut self, value: f64) -> Option<f64> {
        if value == self.smoothed {
            return None;
        }
        self.smoothed = value;
        Some(value)
    }
}

impl Drop for ScrollTimeline {
    fn drop(&mut self) {
        self.killed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/scroll.rs"]
mod tests;
