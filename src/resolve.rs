use std::{path::Path, sync::Arc};

use crate::{
    atlas::AtlasIndex,
    error::SpritecastResult,
    sprite::{SpriteCache, SpriteImage},
    view::ViewBucket,
};

/// Result of the pure (path-only) resolution step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSprite {
    /// Atlas-relative asset path.
    pub rel_path: String,
    /// True when the fallback (view, mouth) pair was substituted.
    pub used_fallback: bool,
}

/// Outcome of resolution plus loading.
///
/// `sprite` is `None` when nothing could be found even through the fallback
/// chain; `used_fallback` is set for any substitution along the way, whether
/// the base pair or the expression overlay missed.
#[derive(Clone, Debug)]
pub struct SpriteOutcome {
    pub sprite: Option<Arc<SpriteImage>>,
    pub used_fallback: bool,
}

/// Resolve the base (expression-free) sprite path for a (view, mouth) pair.
pub fn resolve_base(atlas: &AtlasIndex, view: ViewBucket, mouth: &str) -> Option<ResolvedSprite> {
    if let Some(path) = atlas.sprite_path(view.as_str(), mouth) {
        return Some(ResolvedSprite {
            rel_path: path.to_string(),
            used_fallback: false,
        });
    }

    let fb = atlas.fallback();
    atlas
        .sprite_path(&fb.view, &fb.mouth)
        .map(|path| ResolvedSprite {
            rel_path: path.to_string(),
            used_fallback: true,
        })
}

/// Derive the expression-overlay candidate path, if one applies.
///
/// Applies only when an expression is present, differs from the default
/// label, and is a known label (case-insensitive). The candidate lives in
/// `<expression>_<view>/` and borrows the base path's file name.
pub fn expression_candidate(
    atlas: &AtlasIndex,
    view: ViewBucket,
    expression: Option<&str>,
    base_rel: &str,
) -> Option<String> {
    let expr = expression?.trim().to_ascii_lowercase();
    if expr.is_empty() || expr == atlas.expression_default() {
        return None;
    }
    if !atlas.is_known_expression(&expr) {
        return None;
    }
    Some(format!("{expr}_{view}/{}", basename(base_rel)))
}

fn basename(rel: &str) -> &str {
    rel.rsplit(['/', '\\']).next().unwrap_or(rel)
}

/// Resolve and load the sprite for (view, mouth, expression).
///
/// Missing files are absorbed into the fallback chain and the
/// `used_fallback` flag; decode failures propagate as fatal.
pub fn resolve_and_load(
    atlas: &AtlasIndex,
    view: ViewBucket,
    mouth: &str,
    expression: Option<&str>,
    assets_dir: &Path,
    cache: &SpriteCache,
) -> SpritecastResult<SpriteOutcome> {
    let Some(base) = resolve_base(atlas, view, mouth) else {
        return Ok(SpriteOutcome {
            sprite: None,
            used_fallback: true,
        });
    };
    let mut used_fallback = base.used_fallback;

    if let Some(candidate) = expression_candidate(atlas, view, expression, &base.rel_path)
        && candidate != base.rel_path
    {
        if let Some(sprite) = cache.get_or_load(&assets_dir.join(&candidate))? {
            return Ok(SpriteOutcome {
                sprite: Some(sprite),
                used_fallback,
            });
        }
        // Expression overlay missing on disk: fold back to the base sprite.
        used_fallback = true;
    }

    let sprite = cache.get_or_load(&assets_dir.join(&base.rel_path))?;
    if sprite.is_none() {
        used_fallback = true;
    }
    Ok(SpriteOutcome {
        sprite,
        used_fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atlas() -> AtlasIndex {
        AtlasIndex::from_json_value(&serde_json::json!({
            "views": {
                "front": { "closed": "front/mouth_closed.png", "a": "front/mouth_a.png" }
            },
            "fallback": { "view": "front", "mouth": "closed" },
            "expression_labels": ["happy"],
            "expression_default": "normal"
        }))
    }

    #[test]
    fn exact_lookup_does_not_fall_back() {
        let r = resolve_base(&atlas(), ViewBucket::Front, "a").unwrap();
        assert_eq!(r.rel_path, "front/mouth_a.png");
        assert!(!r.used_fallback);
    }

    #[test]
    fn missing_view_substitutes_the_fallback_pair() {
        // yaw=20 with thr_front=16 buckets to right30; the atlas has no
        // right30 entries, so the front/closed fallback applies.
        let r = resolve_base(&atlas(), ViewBucket::Right30, "a").unwrap();
        assert_eq!(r.rel_path, "front/mouth_closed.png");
        assert!(r.used_fallback);
    }

    #[test]
    fn resolution_is_deterministic() {
        let atlas = atlas();
        let a = resolve_base(&atlas, ViewBucket::Left30, "a");
        let b = resolve_base(&atlas, ViewBucket::Left30, "a");
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_expression_resolves_like_none() {
        let atlas = atlas();
        assert_eq!(
            expression_candidate(&atlas, ViewBucket::Front, Some("angry"), "front/mouth_a.png"),
            None
        );
        assert_eq!(
            expression_candidate(&atlas, ViewBucket::Front, None, "front/mouth_a.png"),
            None
        );
    }

    #[test]
    fn default_expression_is_not_overlaid() {
        let atlas = atlas();
        assert_eq!(
            expression_candidate(&atlas, ViewBucket::Front, Some("normal"), "front/mouth_a.png"),
            None
        );
    }

    #[test]
    fn known_expression_borrows_the_base_file_name() {
        let atlas = atlas();
        assert_eq!(
            expression_candidate(&atlas, ViewBucket::Front, Some("Happy"), "front/mouth_a.png")
                .as_deref(),
            Some("happy_front/mouth_a.png")
        );
    }
}
