use std::cell::Cell;
use std::sync::Arc;

use futures::executor::LocalPool;
use futures::future::{self, FutureExt};

use super::*;
use crate::assets::decode::DecodedFrame;
use crate::assets::loader::FrameLoad;
use crate::foundation::error::LoadFailure;
use crate::render::canvas::PixelCanvas;
use crate::sequence::renderer::SkipReason;

#[derive(Default)]
struct InstantLoader {
    failing: RefCell<BTreeSet<FrameIndex>>,
    calls: Cell<usize>,
}

impl FrameLoader for InstantLoader {
    fn load(&self, index: FrameIndex, _locator: &str) -> FrameLoad {
        self.calls.set(self.calls.get() + 1);
        let result = if self.failing.borrow().contains(&index) {
            Err(LoadFailure::new(index, "missing"))
        } else {
            Ok(Arc::new(DecodedFrame::solid(4, 4, [index.0 as u8, 0, 0, 255])))
        };
        future::ready(result).boxed_local()
    }
}

fn config(frame_count: i64) -> SequenceConfig {
    let mut cfg = SequenceConfig::new(frame_count, "/seq", "f");
    cfg.seed_count = 4;
    cfg.scrub_secs = 0.0;
    cfg.prefetch_radius = 1;
    cfg
}

const OPTS: MountOpts = MountOpts {
    viewport: Viewport {
        width: 8,
        height: 10,
    },
    container_offset: 50.0,
};

fn mount(
    cfg: SequenceConfig,
    loader: &Rc<InstantLoader>,
) -> (LocalPool, ImageSequence<PixelCanvas>) {
    let pool = LocalPool::new();
    let seq = ImageSequence::mount(
        cfg,
        loader.clone(),
        PixelCanvas::new(Viewport::default()),
        Rc::new(pool.spawner()),
        OPTS,
    )
    .unwrap();
    (pool, seq)
}

#[test]
fn empty_sequence_fails_fast() {
    let pool = LocalPool::new();
    let err = ImageSequence::mount(
        config(0),
        Rc::new(InstantLoader::default()),
        PixelCanvas::new(Viewport::default()),
        Rc::new(pool.spawner()),
        OPTS,
    )
    .unwrap_err();
    assert!(matches!(err, FramescrollError::Configuration(_)));
}

#[test]
fn seeds_load_then_first_frame_paints() {
    let loader = Rc::new(InstantLoader::default());
    let (mut pool, mut seq) = mount(config(10), &loader);
    assert_eq!(
        seq.seeds(),
        &[FrameIndex(1), FrameIndex(4), FrameIndex(7), FrameIndex(10)]
    );
    assert_eq!(seq.view(), View::Loading { percent: 0 });
    assert_eq!(seq.renderer().canvas().size(), OPTS.viewport);

    pool.run_until_stalled();
    assert_eq!(
        seq.view(),
        View::Ready {
            caption: "Next Gen Animation".to_string()
        }
    );
    assert_eq!(seq.renderer().last_rendered(), Some(FrameIndex(1)));
    assert_eq!(seq.renderer().canvas().pixel(0, 0), Some([1, 0, 0, 255]));
}

#[test]
fn scroll_maps_through_pinned_region() {
    let loader = Rc::new(InstantLoader::default());
    let (mut pool, mut seq) = mount(config(10), &loader);
    pool.run_until_stalled();
    assert!(seq.is_ready());

    // Pin distance is 3 viewports (30px) starting at 50: 65 is halfway, frame 6.
    let outcome = seq.on_scroll(65.0).unwrap();
    assert_eq!(outcome, Some(PaintOutcome::Skipped(SkipReason::Pending)));
    pool.run_until_stalled();
    assert_eq!(seq.renderer().last_rendered(), Some(FrameIndex(6)));

    // Seed frame 10 is cached: the end of the region paints synchronously.
    assert_eq!(
        seq.on_scroll(500.0).unwrap(),
        Some(PaintOutcome::Painted(FrameIndex(10)))
    );
    assert_eq!(seq.on_scroll(600.0).unwrap(), None);
}

#[test]
fn scroll_while_loading_is_applied_once_ready() {
    let loader = Rc::new(InstantLoader::default());
    let (mut pool, mut seq) = mount(config(10), &loader);
    assert_eq!(seq.on_scroll(80.0).unwrap(), None);
    pool.run_until_stalled();
    assert!(seq.is_ready());
    assert_eq!(seq.renderer().last_rendered(), Some(FrameIndex(10)));
}

#[test]
fn scrub_defers_painting_to_ticks() {
    let loader = Rc::new(InstantLoader::default());
    let mut cfg = config(10);
    cfg.scrub_secs = 0.5;
    let (mut pool, mut seq) = mount(cfg, &loader);
    pool.run_until_stalled();
    assert!(seq.is_ready());

    assert_eq!(seq.on_scroll(80.0).unwrap(), None);
    let mid = seq.tick(Duration::from_millis(100)).unwrap();
    assert!(mid.is_some());
    pool.run_until_stalled();
    let end = seq.tick(Duration::from_millis(500)).unwrap();
    assert_eq!(end, Some(PaintOutcome::Painted(FrameIndex(10))));
    assert_eq!(seq.tick(Duration::from_millis(16)).unwrap(), None);
}

#[test]
fn failed_seed_keeps_loading_view_until_retried() {
    let loader = Rc::new(InstantLoader::default());
    loader.failing.borrow_mut().insert(FrameIndex(7));
    let (mut pool, mut seq) = mount(config(10), &loader);
    pool.run_until_stalled();

    assert_eq!(seq.view(), View::Loading { percent: 75 });
    assert_eq!(
        seq.seed_progress().failed,
        BTreeSet::from([FrameIndex(7)])
    );
    assert!(seq.tick(Duration::from_secs(3600)).unwrap().is_none());
    assert_eq!(seq.view(), View::Loading { percent: 75 });

    loader.failing.borrow_mut().clear();
    assert_eq!(seq.retry_failed_seeds().unwrap(), 1);
    pool.run_until_stalled();
    assert!(seq.is_ready());
}

#[test]
fn seed_timeout_surfaces_error_view() {
    let loader = Rc::new(InstantLoader::default());
    loader.failing.borrow_mut().insert(FrameIndex(1));
    let mut cfg = config(10);
    cfg.seed_timeout_secs = Some(2.0);
    let (mut pool, mut seq) = mount(cfg, &loader);
    pool.run_until_stalled();

    seq.tick(Duration::from_secs(1)).unwrap();
    assert!(matches!(seq.view(), View::Loading { .. }));
    seq.tick(Duration::from_secs(1)).unwrap();
    let View::Error { message } = seq.view() else {
        panic!("expected error view");
    };
    assert!(message.contains("3 of 4 loaded"));
}

#[test]
fn retry_after_seed_timeout_returns_to_loading_then_ready() {
    let loader = Rc::new(InstantLoader::default());
    loader.failing.borrow_mut().insert(FrameIndex(1));
    let mut cfg = config(10);
    cfg.seed_timeout_secs = Some(2.0);
    let (mut pool, mut seq) = mount(cfg, &loader);
    pool.run_until_stalled();
    seq.tick(Duration::from_secs(2)).unwrap();
    assert!(matches!(seq.view(), View::Error { .. }));

    loader.failing.borrow_mut().clear();
    assert_eq!(seq.retry_failed_seeds().unwrap(), 1);
    assert_eq!(seq.view(), View::Loading { percent: 75 });
    pool.run_until_stalled();
    assert!(seq.is_ready());
    assert_eq!(seq.renderer().last_rendered(), Some(FrameIndex(1)));
}

#[test]
fn huge_prefetch_radius_is_bounded_by_sequence() {
    let loader = Rc::new(InstantLoader::default());
    let mut cfg = config(6);
    cfg.prefetch_radius = u32::MAX;
    cfg.validate().unwrap();
    let (mut pool, mut seq) = mount(cfg, &loader);
    pool.run_until_stalled();
    assert!(seq.is_ready());
    pool.run_until_stalled();
    assert_eq!(seq.cache().len(), 6);
    assert_eq!(loader.calls.get(), 6);
}

#[test]
fn resize_repaints_and_rescales_timeline() {
    let loader = Rc::new(InstantLoader::default());
    let (mut pool, mut seq) = mount(config(10), &loader);
    pool.run_until_stalled();
    seq.on_scroll(500.0).unwrap();

    let outcome = seq.on_resize(Viewport::new(16, 20)).unwrap();
    assert_eq!(outcome, PaintOutcome::Painted(FrameIndex(10)));
    assert_eq!(seq.renderer().canvas().size(), Viewport::new(16, 20));
    assert_eq!(seq.renderer().canvas().pixel(15, 19), Some([10, 0, 0, 255]));
    assert_eq!(seq.timeline().unwrap().pin_distance(), 60.0);
}

#[test]
fn dispose_releases_everything_and_rejects_input() {
    let loader = Rc::new(InstantLoader::default());
    let (mut pool, mut seq) = mount(config(10), &loader);
    pool.run_until_stalled();
    assert!(!seq.cache().is_empty());

    seq.dispose();
    seq.dispose();
    assert_eq!(seq.view(), View::Disposed);
    assert!(seq.cache().is_empty());
    assert!(seq.timeline().is_none());
    assert!(seq.renderer().is_disposed());
    assert!(matches!(seq.on_scroll(60.0), Err(FramescrollError::Disposed)));
    assert!(matches!(
        seq.on_resize(Viewport::new(1, 1)),
        Err(FramescrollError::Disposed)
    ));
    pool.run_until_stalled();
}
