use std::collections::BTreeMap;

use crate::view::ViewBucket;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransformStats {
    pub enabled: bool,
}

/// Immutable usage/fallback record returned once at the end of a render.
///
/// `total_frames` reflects the loop bound (`duration_s * fps`), not the
/// possibly larger number of frames actually written under crossfade.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderStats {
    pub views: BTreeMap<String, u64>,
    pub fallback_frames: u64,
    pub first_fallback_ms: Option<i64>,
    pub total_frames: u64,
    pub transform: TransformStats,
}

/// Monotonic accumulator driven by the frame loop.
#[derive(Debug, Default)]
pub struct StatsCollector {
    views: BTreeMap<String, u64>,
    fallback_frames: u64,
    first_fallback_ms: Option<i64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_view(&mut self, view: ViewBucket) {
        *self.views.entry(view.as_str().to_string()).or_insert(0) += 1;
    }

    pub fn record_fallback(&mut self, t_ms: i64) {
        self.fallback_frames += 1;
        if self.first_fallback_ms.is_none() {
            self.first_fallback_ms = Some(t_ms);
        }
    }

    pub fn fallback_frames(&self) -> u64 {
        self.fallback_frames
    }

    pub fn finish(self, total_frames: u64, transform_enabled: bool) -> RenderStats {
        RenderStats {
            views: self.views,
            fallback_frames: self.fallback_frames,
            first_fallback_ms: self.first_fallback_ms,
            total_frames,
            transform: TransformStats {
                enabled: transform_enabled,
            },
        }
    }
}
