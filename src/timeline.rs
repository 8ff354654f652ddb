use std::{collections::BTreeMap, path::Path};

use anyhow::Context as _;
use serde_json::Value;

use crate::error::{SpritecastError, SpritecastResult};

/// Named attribute snapshot returned by a timeline lookup.
pub type ValueMap = BTreeMap<String, Value>;

/// External timeline contract: a pure, cheap lookup by timestamp.
///
/// The sequencer calls `value_at` exactly once per frame and never caches
/// across frames.
pub trait TimelineLookup: Send + Sync {
    fn value_at(&self, t_ms: i64) -> ValueMap;
}

/// Adapter turning a plain closure into a [`TimelineLookup`].
pub struct FnTimeline<F>(F);

impl<F> FnTimeline<F>
where
    F: Fn(i64) -> ValueMap + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> TimelineLookup for FnTimeline<F>
where
    F: Fn(i64) -> ValueMap + Send + Sync,
{
    fn value_at(&self, t_ms: i64) -> ValueMap {
        (self.0)(t_ms)
    }
}

/// Per-frame snapshot parsed out of a [`ValueMap`].
///
/// Angles accept both bare (`yaw`) and suffixed (`yaw_deg`) keys, bare
/// winning; numeric strings are tolerated.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameValues {
    pub mouth: String,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub expression: Option<String>,
}

impl FrameValues {
    pub fn from_map(vals: &ValueMap) -> Self {
        Self {
            mouth: vals
                .get("mouth")
                .and_then(Value::as_str)
                .unwrap_or("closed")
                .to_string(),
            yaw: float_key(vals, &["yaw", "yaw_deg"]),
            pitch: float_key(vals, &["pitch", "pitch_deg"]),
            roll: float_key(vals, &["roll", "roll_deg"]),
            expression: vals
                .get("expression")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

fn float_key(vals: &ValueMap, keys: &[&str]) -> f64 {
    for key in keys {
        if let Some(v) = vals.get(*key) {
            if let Some(f) = v.as_f64() {
                return f;
            }
            if let Some(f) = v.as_str().and_then(|s| s.trim().parse::<f64>().ok()) {
                return f;
            }
        }
    }
    0.0
}

/// Key-union merge over independent lookups, last write wins.
///
/// Mirrors the usual split into separate mouth/pose/expression timelines
/// merged per timestamp.
pub struct MergedTimeline {
    sources: Vec<Box<dyn TimelineLookup>>,
}

impl MergedTimeline {
    pub fn new(sources: Vec<Box<dyn TimelineLookup>>) -> Self {
        Self { sources }
    }
}

impl TimelineLookup for MergedTimeline {
    fn value_at(&self, t_ms: i64) -> ValueMap {
        let mut out = ValueMap::new();
        for source in &self.sources {
            out.extend(source.value_at(t_ms));
        }
        out
    }
}

/// Step-hold keyframe timeline loaded from JSON.
///
/// The document is an array of objects; each carries a `t_ms` timestamp and
/// arbitrary further attributes. `value_at` returns the attributes of the
/// latest keyframe at or before the queried time, or an empty map before the
/// first keyframe.
#[derive(Clone, Debug, Default)]
pub struct StepTimeline {
    keys: Vec<(i64, ValueMap)>,
}

impl StepTimeline {
    pub fn new(mut keys: Vec<(i64, ValueMap)>) -> Self {
        keys.sort_by_key(|(t, _)| *t);
        Self { keys }
    }

    pub fn from_path(path: &Path) -> SpritecastResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read timeline '{}'", path.display()))?;
        Self::from_json_str(&text).map_err(|e| match e {
            SpritecastError::Evaluation(msg) => {
                SpritecastError::evaluation(format!("timeline '{}': {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> SpritecastResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SpritecastError::evaluation(format!("parse timeline json: {e}")))?;
        let Some(entries) = value.as_array() else {
            return Err(SpritecastError::evaluation(
                "timeline document must be a json array",
            ));
        };

        let mut keys = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(obj) = entry.as_object() else {
                return Err(SpritecastError::evaluation(
                    "timeline entries must be json objects",
                ));
            };
            let t_ms = obj
                .get("t_ms")
                .and_then(Value::as_i64)
                .ok_or_else(|| SpritecastError::evaluation("timeline entry is missing 't_ms'"))?;
            let values: ValueMap = obj
                .iter()
                .filter(|(k, _)| k.as_str() != "t_ms")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            keys.push((t_ms, values));
        }
        Ok(Self::new(keys))
    }
}

impl TimelineLookup for StepTimeline {
    fn value_at(&self, t_ms: i64) -> ValueMap {
        let idx = self.keys.partition_point(|(t, _)| *t <= t_ms);
        if idx == 0 {
            return ValueMap::new();
        }
        self.keys[idx - 1].1.clone()
    }
}
