//! Scroll-driven image-sequence playback.
//!
//! As the user scrolls through a pinned region, a canvas shows successive frames of a
//! pre-rendered still-image sequence, giving the illusion of video tied to scroll position.
//!
//! # Pipeline overview
//!
//! 1. **Timeline**: scroll position -> progress in `[0, 1]` ([`ScrollTimeline`], with scrub
//!    smoothing)
//! 2. **Map**: progress -> frame index, `round(progress * (count - 1)) + 1` ([`FrameSpan`])
//! 3. **Cache**: frame index -> decoded frame, loaded lazily and deduplicated ([`FrameCache`])
//! 4. **Paint**: aspect-fill the frame onto a [`Canvas2d`] ([`ScrollSyncRenderer`])
//!
//! [`ImageSequence`] ties the four together with seed loading, resize and teardown.
//!
//! All work is single-threaded and cooperative: loads are futures polled on a caller-provided
//! [`LocalSpawn`](futures::task::LocalSpawn) executor, never blocking the caller.
#![forbid(unsafe_code)]

mod assets;
mod cache;
mod config;
mod foundation;
mod render;
mod sequence;
mod timeline;

pub use assets::decode::{DecodedFrame, decode_image};
pub use assets::loader::{
    FrameLoad, FrameLoadResult, FrameLoader, FsFrameLoader, normalize_locator,
};
pub use cache::frame_cache::{CacheStats, FrameCache};
pub use config::SequenceConfig;
pub use foundation::core::{Affine, FrameIndex, FrameSpan, Point, Rect, Size, Vec2, Viewport};
pub use foundation::error::{FramescrollError, FramescrollResult, LoadFailure};
pub use render::canvas::{Canvas2d, PixelCanvas};
pub use render::geometry::{AspectFill, aspect_fill};
pub use sequence::component::{ImageSequence, MountOpts, SeedProgress, View};
pub use sequence::renderer::{PaintOutcome, RenderStats, ScrollSyncRenderer, SkipReason};
pub use timeline::ease::Ease;
pub use timeline::scroll::{
    ScrollTimeline, ScrollTimelineOpts, is_registered, kill_all, live_bindings, register,
};

/// One-time process-wide setup. Idempotent; [`ImageSequence::mount`] calls it as well.
pub fn init() {
    timeline::scroll::register();
}
