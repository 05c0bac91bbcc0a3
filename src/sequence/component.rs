use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::assets::loader::FrameLoader;
use crate::cache::frame_cache::FrameCache;
use crate::config::SequenceConfig;
use crate::foundation::core::{FrameIndex, FrameSpan, Viewport};
use crate::foundation::error::{FramescrollError, FramescrollResult};
use crate::render::canvas::Canvas2d;
use crate::sequence::renderer::{PaintOutcome, ScrollSyncRenderer};
use crate::timeline::scroll::{self, ScrollTimeline, ScrollTimelineOpts};

/// What the host should display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum View {
    /// Seed frames are still loading.
    Loading { percent: u8 },
    /// Canvas plus overlay caption.
    Ready { caption: String },
    /// Visible error state; the canvas is not shown.
    Error { message: String },
    Disposed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Phase {
    Loading,
    Ready,
    Failed(String),
    Disposed,
}

/// Outcome tally of the seed frame set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedProgress {
    pub total: usize,
    pub loaded: BTreeSet<FrameIndex>,
    pub failed: BTreeSet<FrameIndex>,
}

impl SeedProgress {
    pub fn is_complete(&self) -> bool {
        self.loaded.len() == self.total
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.loaded.len() as f64 / self.total as f64) * 100.0).round() as u8
    }
}

/// Where the pinned container sits and how large the viewport is at mount time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MountOpts {
    pub viewport: Viewport,
    /// Document offset of the container's top edge.
    pub container_offset: f64,
}

/// Scroll-driven image sequence: seed loading, then scroll-synchronised painting.
pub struct ImageSequence<C> {
    config: SequenceConfig,
    span: FrameSpan,
    cache: FrameCache,
    renderer: ScrollSyncRenderer<C>,
    spawner: Rc<dyn LocalSpawn>,
    timeline: Option<ScrollTimeline>,
    seeds: Vec<FrameIndex>,
    progress: Rc<RefCell<SeedProgress>>,
    phase: Phase,
    loading_elapsed: Duration,
    viewport: Viewport,
    container_offset: f64,
    // Scroll position seen while loading, applied when the timeline binds.
    scroll_y: f64,
}

impl<C> fmt::Debug for ImageSequence<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSequence")
            .field("span", &self.span)
            .field("phase", &self.phase)
            .field("viewport", &self.viewport)
            .field("cache", &self.cache)
            .field("renderer", &self.renderer)
            .finish()
    }
}

impl<C: Canvas2d + 'static> ImageSequence<C> {
    /// Validate `config`, size the canvas to the viewport and start loading seed frames.
    ///
    /// Fails fast with a configuration error for an empty sequence or a bad template.
    pub fn mount(
        config: SequenceConfig,
        loader: Rc<dyn FrameLoader>,
        mut canvas: C,
        spawner: Rc<dyn LocalSpawn>,
        opts: MountOpts,
    ) -> FramescrollResult<Self> {
        scroll::register();
        let span = config.validate()?;
        let cache = FrameCache::new(&config, loader, spawner.clone())?;
        canvas.set_size(opts.viewport);
        let renderer = ScrollSyncRenderer::new(canvas, cache.clone(), spawner.clone());
        let seeds = span.evenly_spaced(config.seed_count);

        let sequence = Self {
            config,
            span,
            cache,
            renderer,
            spawner,
            timeline: None,
            progress: Rc::new(RefCell::new(SeedProgress {
                total: seeds.len(),
                ..SeedProgress::default()
            })),
            seeds,
            phase: Phase::Loading,
            loading_elapsed: Duration::ZERO,
            viewport: opts.viewport,
            container_offset: opts.container_offset,
            scroll_y: opts.container_offset,
        };
        tracing::info!(
            frames = span.count(),
            seeds = sequence.seeds.len(),
            "mounting image sequence"
        );
        for seed in sequence.seeds.clone() {
            sequence.load_seed(seed)?;
        }
        Ok(sequence)
    }

    pub fn span(&self) -> FrameSpan {
        self.span
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn renderer(&self) -> &ScrollSyncRenderer<C> {
        &self.renderer
    }

    pub fn timeline(&self) -> Option<&ScrollTimeline> {
        self.timeline.as_ref()
    }

    pub fn seeds(&self) -> &[FrameIndex] {
        &self.seeds
    }

    pub fn seed_progress(&self) -> SeedProgress {
        self.progress.borrow().clone()
    }

    /// Current observable state. Promotes to ready first if the seed set just completed.
    pub fn view(&mut self) -> View {
        self.refresh_phase();
        match &self.phase {
            Phase::Loading => View::Loading {
                percent: self.progress.borrow().percent(),
            },
            Phase::Ready => View::Ready {
                caption: self.config.caption.clone(),
            },
            Phase::Failed(message) => View::Error {
                message: message.clone(),
            },
            Phase::Disposed => View::Disposed,
        }
    }

    pub fn is_ready(&mut self) -> bool {
        self.refresh_phase();
        self.phase == Phase::Ready
    }

    /// Feed a scroll position. Paints immediately when scrubbing is off.
    pub fn on_scroll(&mut self, scroll_y: f64) -> FramescrollResult<Option<PaintOutcome>> {
        self.ensure_live()?;
        self.scroll_y = scroll_y;
        self.refresh_phase();
        let progress = self.timeline.as_mut().and_then(|t| t.set_scroll(scroll_y));
        Ok(progress.map(|p| self.renderer.request_progress(p)))
    }

    /// Move to `scroll_y` without scrub smoothing and paint the resulting frame.
    pub fn seek(&mut self, scroll_y: f64) -> FramescrollResult<Option<PaintOutcome>> {
        self.ensure_live()?;
        self.scroll_y = scroll_y;
        self.refresh_phase();
        let Some(timeline) = self.timeline.as_mut() else {
            return Ok(None);
        };
        timeline.jump_to(scroll_y);
        Ok(Some(self.renderer.request_progress(timeline.progress())))
    }

    /// Seek to a progress value in `[0, 1]` of the pinned region.
    pub fn seek_progress(&mut self, progress: f64) -> FramescrollResult<Option<PaintOutcome>> {
        self.refresh_phase();
        let scroll_y = match &self.timeline {
            Some(t) => t.scroll_for_progress(progress),
            None => return self.ensure_live().map(|()| None),
        };
        self.seek(scroll_y)
    }

    /// Advance time: scrub smoothing while ready, the seed timeout while loading.
    pub fn tick(&mut self, dt: Duration) -> FramescrollResult<Option<PaintOutcome>> {
        self.ensure_live()?;
        self.refresh_phase();
        if self.phase == Phase::Loading {
            self.loading_elapsed += dt;
            self.check_seed_timeout();
            return Ok(None);
        }
        let progress = self.timeline.as_mut().and_then(|t| t.tick(dt));
        Ok(progress.map(|p| self.renderer.request_progress(p)))
    }

    /// Resize the canvas to the viewport and repaint the last frame.
    pub fn on_resize(&mut self, viewport: Viewport) -> FramescrollResult<PaintOutcome> {
        self.ensure_live()?;
        self.viewport = viewport;
        let outcome = self.renderer.resize(viewport);
        if let Some(timeline) = self.timeline.as_mut()
            && let Some(p) = timeline.set_viewport_height(f64::from(viewport.height))
        {
            return Ok(self.renderer.request_progress(p));
        }
        Ok(outcome)
    }

    /// Re-request seed frames whose load failed. Returns how many were retried.
    ///
    /// Retrying after the seed timeout fired puts the sequence back into the loading view with
    /// a fresh timeout window.
    pub fn retry_failed_seeds(&mut self) -> FramescrollResult<usize> {
        self.ensure_live()?;
        let failed: Vec<FrameIndex> = std::mem::take(&mut self.progress.borrow_mut().failed)
            .into_iter()
            .collect();
        if failed.is_empty() {
            return Ok(0);
        }
        if matches!(self.phase, Phase::Failed(_)) {
            self.phase = Phase::Loading;
        }
        self.loading_elapsed = Duration::ZERO;
        for &seed in &failed {
            self.load_seed(seed)?;
        }
        Ok(failed.len())
    }

    /// Tear down: unbind the timeline, stop painting and release every cached frame.
    pub fn dispose(&mut self) {
        if self.phase == Phase::Disposed {
            return;
        }
        if let Some(mut timeline) = self.timeline.take() {
            timeline.kill();
        }
        self.renderer.dispose();
        self.cache.clear();
        self.phase = Phase::Disposed;
        tracing::info!("image sequence disposed");
    }

    fn ensure_live(&self) -> FramescrollResult<()> {
        if self.phase == Phase::Disposed {
            return Err(FramescrollError::Disposed);
        }
        Ok(())
    }

    fn load_seed(&self, seed: FrameIndex) -> FramescrollResult<()> {
        let load = self.cache.get_or_load(seed);
        let progress = Rc::clone(&self.progress);
        self.spawner
            .spawn_local(async move {
                let ok = load.await.is_ok();
                let mut progress = progress.borrow_mut();
                if ok {
                    progress.loaded.insert(seed);
                } else {
                    progress.failed.insert(seed);
                }
            })
            .map_err(|e| anyhow::anyhow!("spawn seed load for frame {seed}: {e}"))?;
        Ok(())
    }

    fn refresh_phase(&mut self) {
        if self.phase != Phase::Loading || !self.progress.borrow().is_complete() {
            return;
        }
        let opts = ScrollTimelineOpts::from_config(&self.config, self.container_offset);
        let mut timeline = match ScrollTimeline::new(opts, f64::from(self.viewport.height)) {
            Ok(t) => t,
            Err(err) => {
                self.phase = Phase::Failed(err.to_string());
                return;
            }
        };
        timeline.jump_to(self.scroll_y);
        self.phase = Phase::Ready;
        tracing::info!(progress = timeline.progress(), "seed frames loaded, sequence ready");
        self.renderer.request_progress(timeline.progress());
        self.timeline = Some(timeline);
    }

    fn check_seed_timeout(&mut self) {
        let Some(limit) = self.config.seed_timeout_secs else {
            return;
        };
        if self.loading_elapsed.as_secs_f64() < limit {
            return;
        }
        let progress = self.progress.borrow();
        let message = format!(
            "seed frames did not load within {limit}s ({} of {} loaded, {} failed)",
            progress.loaded.len(),
            progress.total,
            progress.failed.len()
        );
        drop(progress);
        tracing::warn!(%message, "giving up on seed loading");
        self.phase = Phase::Failed(message);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/component.rs"]
mod tests;
