use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use anyhow::Context as _;
use serde_json::Value;

use crate::{
    error::{SpritecastError, SpritecastResult},
    view::{BucketPolicy, DEFAULT_THR_FRONT, ViewBucket},
};

/// Expression label that maps to the base (non-overlaid) sprite set.
pub const DEFAULT_EXPRESSION: &str = "normal";

/// Normalize a mouth label to its atlas key form.
///
/// Labels are lowercased; the `close`/`mouth_close` spellings are unified to
/// `closed`. Empty input means the mouth is closed.
pub fn normalize_mouth(raw: &str) -> String {
    let m = raw.trim().to_ascii_lowercase();
    if m.is_empty() {
        return "closed".to_string();
    }
    match m.as_str() {
        "close" | "mouth_close" => "closed".to_string(),
        _ => m,
    }
}

/// Fallback (view, mouth) pair used when an exact lookup misses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackSpec {
    pub view: String,
    pub mouth: String,
}

impl Default for FallbackSpec {
    fn default() -> Self {
        Self {
            view: "front".to_string(),
            mouth: "closed".to_string(),
        }
    }
}

/// Normalized sprite catalog: view -> mouth -> relative asset path, plus the
/// bucket policy, fallback defaults, and expression metadata.
///
/// Two on-disk forms are accepted: a pre-structured `{"views": {...}}`
/// object, and a legacy form where any top-level object value containing a
/// `"closed"` key is treated as a view entry.
#[derive(Clone, Debug)]
pub struct AtlasIndex {
    views: BTreeMap<String, BTreeMap<String, String>>,
    bucket_policy: BucketPolicy,
    fallback: FallbackSpec,
    expression_labels: BTreeSet<String>,
    expression_default: String,
}

impl Default for AtlasIndex {
    fn default() -> Self {
        Self {
            views: BTreeMap::new(),
            bucket_policy: BucketPolicy::default(),
            fallback: FallbackSpec::default(),
            expression_labels: BTreeSet::new(),
            expression_default: DEFAULT_EXPRESSION.to_string(),
        }
    }
}

impl AtlasIndex {
    pub fn from_path(path: &Path) -> SpritecastResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read atlas '{}'", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| SpritecastError::atlas(format!("parse '{}': {e}", path.display())))?;
        Ok(Self::from_json_value(&value))
    }

    /// Build an index from a parsed atlas document.
    ///
    /// Unexpected shapes degrade to safe defaults (empty views, default
    /// policy/fallback) rather than failing; only unreadable JSON is an
    /// error, and that is handled by [`AtlasIndex::from_path`].
    pub fn from_json_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let views = match obj.get("views").and_then(Value::as_object) {
            Some(v) => normalize_views(v.iter()),
            None => {
                // Legacy form: top-level view dictionaries, recognized by a
                // "closed" mouth key.
                normalize_views(obj.iter().filter(|(_, v)| {
                    v.as_object().is_some_and(|m| m.contains_key("closed"))
                }))
            }
        };

        let bucket_policy = obj
            .get("view_rules")
            .map(parse_bucket_policy)
            .unwrap_or_default();

        let fallback = match obj.get("fallback").and_then(Value::as_object) {
            Some(fb) => FallbackSpec {
                view: fb
                    .get("view")
                    .and_then(Value::as_str)
                    .unwrap_or("front")
                    .to_string(),
                mouth: normalize_mouth(fb.get("mouth").and_then(Value::as_str).unwrap_or("closed")),
            },
            None => FallbackSpec::default(),
        };

        let expression_labels = obj
            .get("expression_labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.to_ascii_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        let expression_default = obj
            .get("expression_default")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_EXPRESSION)
            .to_ascii_lowercase();

        Self {
            views,
            bucket_policy,
            fallback,
            expression_labels,
            expression_default,
        }
    }

    pub fn bucket_policy(&self) -> BucketPolicy {
        self.bucket_policy
    }

    pub fn fallback(&self) -> &FallbackSpec {
        &self.fallback
    }

    pub fn expression_default(&self) -> &str {
        &self.expression_default
    }

    /// Case-insensitive membership test against `expression_labels`.
    pub fn is_known_expression(&self, expression: &str) -> bool {
        self.expression_labels
            .contains(&expression.to_ascii_lowercase())
    }

    /// Relative asset path for an exact (view, mouth) pair, if present.
    pub fn sprite_path(&self, view: &str, mouth: &str) -> Option<&str> {
        self.views.get(view)?.get(mouth).map(String::as_str)
    }

    pub fn views(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.views
    }

    /// Check that every bucket the policy can produce resolves through
    /// `views` or through the fallback pair.
    pub fn validate(&self) -> SpritecastResult<()> {
        self.bucket_policy.validate()?;

        let fallback_resolves = self
            .sprite_path(&self.fallback.view, &self.fallback.mouth)
            .is_some();

        let unresolvable: Vec<&str> = ViewBucket::ALL
            .iter()
            .filter(|b| {
                let direct = self.views.get(b.as_str()).is_some_and(|m| !m.is_empty());
                !direct && !fallback_resolves
            })
            .map(|b| b.as_str())
            .collect();

        if !unresolvable.is_empty() {
            return Err(SpritecastError::atlas(format!(
                "view buckets [{}] resolve through neither views nor fallback",
                unresolvable.join(", ")
            )));
        }
        Ok(())
    }
}

fn normalize_views<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (name, value) in entries {
        let Some(mouths) = value.as_object() else {
            continue;
        };
        let normalized: BTreeMap<String, String> = mouths
            .iter()
            .filter_map(|(mouth, path)| {
                path.as_str()
                    .map(|p| (normalize_mouth(mouth), p.to_string()))
            })
            .collect();
        out.insert(name.clone(), normalized);
    }
    out
}

fn parse_bucket_policy(rules: &Value) -> BucketPolicy {
    let Some(rules) = rules.as_object() else {
        return BucketPolicy::default();
    };

    let left = rules.get("left30_max_yaw_deg").and_then(Value::as_f64);
    let right = rules.get("right30_min_yaw_deg").and_then(Value::as_f64);
    if left.is_some() || right.is_some() {
        return BucketPolicy::AsymmetricEdges {
            left30_max_yaw_deg: left.unwrap_or(-DEFAULT_THR_FRONT),
            right30_min_yaw_deg: right.unwrap_or(DEFAULT_THR_FRONT),
        };
    }

    BucketPolicy::SymmetricThreshold {
        thr_front: rules
            .get("thr_front")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_THR_FRONT),
    }
}
