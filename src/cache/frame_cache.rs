use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use futures::future::{self, FutureExt, Shared};
use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::assets::decode::DecodedFrame;
use crate::assets::loader::{FrameLoad, FrameLoadResult, FrameLoader};
use crate::config::SequenceConfig;
use crate::foundation::core::{FrameIndex, FrameSpan};
use crate::foundation::error::{FramescrollResult, LoadFailure};

/// Counters describing cache traffic since construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from a retained frame.
    pub hits: u64,
    /// Requests that joined a load already in flight.
    pub joined: u64,
    /// Underlying loader invocations.
    pub loads_started: u64,
    /// Loads that finished with a failure.
    pub loads_failed: u64,
    /// Completions dropped because the cache was cleared while they were in flight.
    pub discarded: u64,
}

struct CacheInner {
    frames: HashMap<FrameIndex, Arc<DecodedFrame>>,
    in_flight: HashMap<FrameIndex, Shared<FrameLoad>>,
    // Bumped by `clear`; loads started under an older epoch must not repopulate the map.
    epoch: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn finish(&mut self, index: FrameIndex, epoch: u64, result: &FrameLoadResult) {
        if epoch != self.epoch {
            self.stats.discarded += 1;
            tracing::debug!(%index, "discarding frame load finished after clear");
            return;
        }
        self.in_flight.remove(&index);
        match result {
            Ok(frame) => {
                self.frames.insert(index, Arc::clone(frame));
            }
            Err(err) => {
                self.stats.loads_failed += 1;
                tracing::warn!(%index, reason = %err.reason, "frame load failed");
            }
        }
    }
}

/// Lazily populated map from frame index to decoded frame.
///
/// At most one load per index is in flight: concurrent requests share a single
/// [`Shared`] future. Successful loads are retained until [`FrameCache::clear`]; failures are
/// not cached, so the next request retries.
///
/// Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct FrameCache {
    inner: Rc<RefCell<CacheInner>>,
    loader: Rc<dyn FrameLoader>,
    spawner: Rc<dyn LocalSpawn>,
    config: Rc<SequenceConfig>,
    span: FrameSpan,
}

impl fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("FrameCache")
            .field("span", &self.span)
            .field("cached", &inner.frames.len())
            .field("in_flight", &inner.in_flight.len())
            .field("stats", &inner.stats)
            .finish()
    }
}

impl FrameCache {
    /// Build an empty cache. Loads are driven to completion on `spawner`.
    pub fn new(
        config: &SequenceConfig,
        loader: Rc<dyn FrameLoader>,
        spawner: Rc<dyn LocalSpawn>,
    ) -> FramescrollResult<Self> {
        let span = config.validate()?;
        Ok(Self {
            inner: Rc::new(RefCell::new(CacheInner {
                frames: HashMap::new(),
                in_flight: HashMap::new(),
                epoch: 0,
                stats: CacheStats::default(),
            })),
            loader,
            spawner,
            config: Rc::new(config.clone()),
            span,
        })
    }

    pub fn span(&self) -> FrameSpan {
        self.span
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    /// Synchronous membership check.
    pub fn has(&self, index: FrameIndex) -> bool {
        self.inner.borrow().frames.contains_key(&index)
    }

    /// Retained frame for `index`, without starting a load.
    pub fn get(&self, index: FrameIndex) -> Option<Arc<DecodedFrame>> {
        self.inner.borrow().frames.get(&index).cloned()
    }

    pub fn is_loading(&self, index: FrameIndex) -> bool {
        self.inner.borrow().in_flight.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.borrow().stats
    }

    /// Resolve `index`: immediately on a hit, otherwise by joining or starting its load.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_or_load(&self, index: FrameIndex) -> FrameLoad {
        if !self.span.contains(index) {
            let failure = LoadFailure::new(
                index,
                format!("outside sequence range 1..={}", self.span.count()),
            );
            return future::ready(Err(failure)).boxed_local();
        }

        let epoch = {
            let mut inner = self.inner.borrow_mut();
            if let Some(frame) = inner.frames.get(&index).cloned() {
                inner.stats.hits += 1;
                return future::ready(Ok(frame)).boxed_local();
            }
            if let Some(pending) = inner.in_flight.get(&index).cloned() {
                inner.stats.joined += 1;
                return pending.boxed_local();
            }
            inner.stats.loads_started += 1;
            inner.epoch
        };

        tracing::debug!(%index, "frame cache miss, starting load");
        let pending = self.start_load(index, epoch);
        self.inner
            .borrow_mut()
            .in_flight
            .insert(index, pending.clone());

        if let Err(err) = self.spawner.spawn_local(pending.clone().map(|_| ())) {
            // The load still completes if a caller polls the returned future.
            tracing::warn!(%index, error = %err, "could not spawn frame load driver");
        }
        pending.boxed_local()
    }

    /// Advisory load of `index`. Returns whether a new load was started; failures are swallowed.
    pub fn prefetch(&self, index: FrameIndex) -> bool {
        if !self.span.contains(index) || self.has(index) || self.is_loading(index) {
            return false;
        }
        drop(self.get_or_load(index));
        true
    }

    /// Prefetch the `radius` frames on each side of `center`. Returns how many loads started.
    pub fn prefetch_around(&self, center: FrameIndex, radius: u32) -> usize {
        self.span
            .neighborhood(center, radius)
            .into_iter()
            .filter(|&i| self.prefetch(i))
            .count()
    }

    /// Release every retained frame. Loads still in flight finish but are not retained.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.epoch += 1;
        inner.frames.clear();
        inner.in_flight.clear();
        tracing::debug!(epoch = inner.epoch, "frame cache cleared");
    }

    fn start_load(&self, index: FrameIndex, epoch: u64) -> Shared<FrameLoad> {
        let locator = self.config.frame_path(index);
        let load = self.loader.load(index, &locator);
        let inner = Rc::downgrade(&self.inner);
        async move {
            let result = load.await;
            if let Some(inner) = inner.upgrade() {
                inner.borrow_mut().finish(index, epoch, &result);
            }
            result
        }
        .boxed_local()
        .shared()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/frame_cache.rs"]
mod tests;
