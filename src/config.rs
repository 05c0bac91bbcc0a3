use std::path::Path;

use anyhow::Context;

use crate::foundation::core::{FrameIndex, FrameSpan};
use crate::foundation::error::{FramescrollError, FramescrollResult};
use crate::timeline::ease::Ease;

/// Options recognised by an image sequence.
///
/// Only `frame_count`, `folder_path` and `file_name_prefix` are required; everything else has a
/// default matching the stock scroll effect (300% pin distance, half-second scrub).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceConfig {
    /// Total number of frames. Must be positive.
    pub frame_count: i64,
    /// Base path (or URL prefix) of the frame assets.
    pub folder_path: String,
    /// Filename prefix placed before the zero-padded index.
    pub file_name_prefix: String,
    /// Filename extension, without the dot.
    #[serde(default = "default_image_ext")]
    pub image_ext: String,
    /// Frames warmed on each side of the last painted frame.
    #[serde(default = "default_prefetch_radius")]
    pub prefetch_radius: u32,
    /// Number of evenly spaced frames loaded before the sequence is shown.
    #[serde(default = "default_seed_count")]
    pub seed_count: u32,
    /// Pinned scroll distance, in viewport heights.
    #[serde(default = "default_pin_viewports")]
    pub pin_viewports: f64,
    /// Seconds the smoothed progress takes to catch up with the raw scroll position.
    #[serde(default = "default_scrub_secs")]
    pub scrub_secs: f64,
    /// Easing of the scrub catch-up.
    #[serde(default)]
    pub scrub_ease: Ease,
    /// Give up on seed loading after this many seconds. Unset means wait forever.
    #[serde(default)]
    pub seed_timeout_secs: Option<f64>,
    /// Overlay caption shown over the canvas once ready.
    #[serde(default = "default_caption")]
    pub caption: String,
}

fn default_image_ext() -> String {
    "webp".to_string()
}

fn default_prefetch_radius() -> u32 {
    5
}

fn default_seed_count() -> u32 {
    24
}

fn default_pin_viewports() -> f64 {
    3.0
}

fn default_scrub_secs() -> f64 {
    0.5
}

fn default_caption() -> String {
    "Next Gen Animation".to_string()
}

impl SequenceConfig {
    /// Config with the three required options and defaults for the rest.
    pub fn new(
        frame_count: i64,
        folder_path: impl Into<String>,
        file_name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            frame_count,
            folder_path: folder_path.into(),
            file_name_prefix: file_name_prefix.into(),
            image_ext: default_image_ext(),
            prefetch_radius: default_prefetch_radius(),
            seed_count: default_seed_count(),
            pin_viewports: default_pin_viewports(),
            scrub_secs: default_scrub_secs(),
            scrub_ease: Ease::default(),
            seed_timeout_secs: None,
            caption: default_caption(),
        }
    }

    pub fn from_json_str(s: &str) -> FramescrollResult<Self> {
        serde_json::from_str(s).map_err(|e| FramescrollError::serde(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> FramescrollResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read sequence config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> FramescrollResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FramescrollError::serde(e.to_string()))
    }

    /// Check every option and return the validated frame span.
    pub fn validate(&self) -> FramescrollResult<FrameSpan> {
        let span = FrameSpan::new(self.frame_count)?;

        if self.image_ext.is_empty() {
            return Err(FramescrollError::configuration("image_ext must not be empty"));
        }
        if self.image_ext.contains(['/', '.']) {
            return Err(FramescrollError::configuration(format!(
                "image_ext '{}' must be a bare extension",
                self.image_ext
            )));
        }
        if self.file_name_prefix.contains('/') {
            return Err(FramescrollError::configuration(format!(
                "file_name_prefix '{}' must not contain a path separator",
                self.file_name_prefix
            )));
        }
        if !(self.pin_viewports.is_finite() && self.pin_viewports > 0.0) {
            return Err(FramescrollError::configuration(
                "pin_viewports must be finite and > 0",
            ));
        }
        if !(self.scrub_secs.is_finite() && self.scrub_secs >= 0.0) {
            return Err(FramescrollError::configuration(
                "scrub_secs must be finite and >= 0",
            ));
        }
        if let Some(t) = self.seed_timeout_secs
            && !(t.is_finite() && t > 0.0)
        {
            return Err(FramescrollError::configuration(
                "seed_timeout_secs must be finite and > 0",
            ));
        }
        if self.seed_count == 0 {
            return Err(FramescrollError::configuration("seed_count must be > 0"));
        }
        Ok(span)
    }

    /// Resolve the locator of one frame: `{folder}/{prefix}{index:04}.{ext}`.
    ///
    /// Four digits is a minimum width; indices past 9999 keep every digit.
    pub fn frame_path(&self, index: FrameIndex) -> String {
        let folder = self.folder_path.trim_end_matches('/');
        let file = format!("{}{:04}.{}", self.file_name_prefix, index.0, self.image_ext);
        if folder.is_empty() {
            file
        } else {
            format!("{folder}/{file}")
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/config/config.rs"]
mod tests;
