use std::cell::{Cell, RefCell};

use futures::channel::oneshot;
use futures::executor::LocalPool;

use super::*;

/// Loader whose loads finish only when the test says so.
#[derive(Default)]
struct ManualLoader {
    calls: Cell<usize>,
    locators: RefCell<Vec<String>>,
    pending: RefCell<HashMap<FrameIndex, oneshot::Sender<FrameLoadResult>>>,
}

impl ManualLoader {
    fn complete(&self, index: FrameIndex, result: FrameLoadResult) {
        let tx = self
            .pending
            .borrow_mut()
            .remove(&index)
            .expect("no pending load for index");
        let _ = tx.send(result);
    }

    fn succeed(&self, index: FrameIndex) {
        self.complete(index, Ok(Arc::new(DecodedFrame::solid(2, 2, [9, 9, 9, 255]))));
    }

    fn fail(&self, index: FrameIndex) {
        self.complete(index, Err(LoadFailure::new(index, "boom")));
    }
}

impl FrameLoader for ManualLoader {
    fn load(&self, index: FrameIndex, locator: &str) -> FrameLoad {
        self.calls.set(self.calls.get() + 1);
        self.locators.borrow_mut().push(locator.to_string());
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().insert(index, tx);
        async move {
            rx.await
                .unwrap_or_else(|_| Err(LoadFailure::new(index, "loader dropped")))
        }
        .boxed_local()
    }
}

fn setup(frame_count: i64) -> (LocalPool, Rc<ManualLoader>, FrameCache) {
    let pool = LocalPool::new();
    let loader = Rc::new(ManualLoader::default());
    let cache = FrameCache::new(
        &SequenceConfig::new(frame_count, "/seq", "f_"),
        loader.clone(),
        Rc::new(pool.spawner()),
    )
    .unwrap();
    (pool, loader, cache)
}

#[test]
fn new_rejects_empty_sequence() {
    let pool = LocalPool::new();
    let err = FrameCache::new(
        &SequenceConfig::new(0, "/seq", "f_"),
        Rc::new(ManualLoader::default()),
        Rc::new(pool.spawner()),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        crate::foundation::error::FramescrollError::Configuration(_)
    ));
}

#[test]
fn concurrent_requests_share_one_load() {
    let (mut pool, loader, cache) = setup(10);

    let a = cache.get_or_load(FrameIndex(3));
    let b = cache.get_or_load(FrameIndex(3));
    assert_eq!(loader.calls.get(), 1);
    assert!(cache.is_loading(FrameIndex(3)));
    assert_eq!(loader.locators.borrow()[0], "/seq/f_0003.webp");

    loader.succeed(FrameIndex(3));
    let (ra, rb) = pool.run_until(futures::future::join(a, b));
    assert!(Arc::ptr_eq(&ra.unwrap(), &rb.unwrap()));

    assert!(cache.has(FrameIndex(3)));
    assert!(!cache.is_loading(FrameIndex(3)));
    let stats = cache.stats();
    assert_eq!(stats.loads_started, 1);
    assert_eq!(stats.joined, 1);
}

#[test]
fn hit_resolves_without_loader() {
    let (mut pool, loader, cache) = setup(10);
    drop(cache.get_or_load(FrameIndex(1)));
    loader.succeed(FrameIndex(1));
    pool.run_until_stalled();
    assert!(cache.has(FrameIndex(1)));

    let frame = pool.run_until(cache.get_or_load(FrameIndex(1))).unwrap();
    assert_eq!(frame.width, 2);
    assert_eq!(loader.calls.get(), 1);
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn failed_load_is_not_cached_and_retries() {
    let (mut pool, loader, cache) = setup(10);

    let first = cache.get_or_load(FrameIndex(4));
    loader.fail(FrameIndex(4));
    let err = pool.run_until(first).unwrap_err();
    assert_eq!(err.index, FrameIndex(4));
    assert!(!cache.has(FrameIndex(4)));
    assert!(!cache.is_loading(FrameIndex(4)));
    assert_eq!(cache.stats().loads_failed, 1);

    let retry = cache.get_or_load(FrameIndex(4));
    assert_eq!(loader.calls.get(), 2);
    loader.succeed(FrameIndex(4));
    assert!(pool.run_until(retry).is_ok());
    assert!(cache.has(FrameIndex(4)));
}

#[test]
fn load_completes_even_when_callers_drop_the_future() {
    let (mut pool, loader, cache) = setup(10);
    drop(cache.get_or_load(FrameIndex(2)));
    loader.succeed(FrameIndex(2));
    pool.run_until_stalled();
    assert!(cache.has(FrameIndex(2)));
}

#[test]
fn out_of_range_request_fails_without_loading() {
    let (mut pool, loader, cache) = setup(5);
    let err = pool.run_until(cache.get_or_load(FrameIndex(6))).unwrap_err();
    assert_eq!(err.index, FrameIndex(6));
    assert!(pool.run_until(cache.get_or_load(FrameIndex(0))).is_err());
    assert_eq!(loader.calls.get(), 0);
}

#[test]
fn prefetch_skips_cached_and_in_flight_frames() {
    let (mut pool, loader, cache) = setup(20);
    drop(cache.get_or_load(FrameIndex(11)));
    loader.succeed(FrameIndex(11));
    pool.run_until_stalled();
    drop(cache.get_or_load(FrameIndex(9)));

    let started = cache.prefetch_around(FrameIndex(10), 2);
    // 11 cached, 9 in flight: only 12 and 8 start.
    assert_eq!(started, 2);
    assert!(cache.is_loading(FrameIndex(12)));
    assert!(cache.is_loading(FrameIndex(8)));
    assert!(!cache.prefetch(FrameIndex(11)));
    assert!(!cache.prefetch(FrameIndex(21)));
}

#[test]
fn prefetch_failures_are_swallowed() {
    let (mut pool, loader, cache) = setup(10);
    assert!(cache.prefetch(FrameIndex(5)));
    loader.fail(FrameIndex(5));
    pool.run_until_stalled();
    assert!(!cache.has(FrameIndex(5)));
    assert!(!cache.is_loading(FrameIndex(5)));
    assert!(cache.prefetch(FrameIndex(5)));
}

#[test]
fn clear_drops_frames_and_ignores_late_completions() {
    let (mut pool, loader, cache) = setup(10);
    drop(cache.get_or_load(FrameIndex(1)));
    loader.succeed(FrameIndex(1));
    pool.run_until_stalled();
    let late = cache.get_or_load(FrameIndex(2));

    cache.clear();
    assert!(cache.is_empty());
    assert!(!cache.is_loading(FrameIndex(2)));

    loader.succeed(FrameIndex(2));
    assert!(pool.run_until(late).is_ok());
    assert!(!cache.has(FrameIndex(2)));
    assert_eq!(cache.stats().discarded, 1);
}
