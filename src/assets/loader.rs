use std::path::PathBuf;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::assets::decode::{DecodedFrame, decode_image};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::LoadFailure;

/// Outcome of one frame load, shared by every waiter on that frame.
pub type FrameLoadResult = Result<Arc<DecodedFrame>, LoadFailure>;

/// Pending frame load. Single-threaded: futures are polled on the caller's executor.
pub type FrameLoad = LocalBoxFuture<'static, FrameLoadResult>;

/// Asset storage seam: turns a resolved frame locator into a decoded frame.
///
/// Implementations must not cache; deduplication and retention live in
/// [`FrameCache`](crate::FrameCache).
pub trait FrameLoader {
    /// Start loading `locator` for frame `index`.
    fn load(&self, index: FrameIndex, locator: &str) -> FrameLoad;
}

/// Loads frames from a static directory, resolving root-relative locators against `root`.
#[derive(Clone, Debug)]
pub struct FsFrameLoader {
    root: PathBuf,
}

impl FsFrameLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl FrameLoader for FsFrameLoader {
    fn load(&self, index: FrameIndex, locator: &str) -> FrameLoad {
        let resolved = normalize_locator(locator).map(|rel| self.root.join(rel));
        async move {
            let path = resolved.map_err(|reason| LoadFailure::new(index, reason))?;
            let bytes = std::fs::read(&path).map_err(|e| {
                LoadFailure::new(index, format!("read '{}': {e}", path.display()))
            })?;
            let frame = decode_image(&bytes).map_err(|e| {
                LoadFailure::new(index, format!("decode '{}': {e:#}", path.display()))
            })?;
            Ok(Arc::new(frame))
        }
        .boxed_local()
    }
}

/// Normalize a site-style locator (`/images/seq/f0001.webp`) into a relative path.
///
/// Leading slashes mean "from the asset root"; `..` segments are rejected.
pub fn normalize_locator(locator: &str) -> Result<String, String> {
    let s = locator.replace('\\', "/");
    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(format!("locator '{locator}' must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(format!("locator '{locator}' has no file name"));
    }

    Ok(out.join("/"))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/loader.rs"]
mod tests;
