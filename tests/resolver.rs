use std::path::{Path, PathBuf};

use spritecast::{
    AtlasIndex, FnTimeline, InMemorySink, RenderOpts, SpriteCache, SpritecastError, ValueMap,
    ViewBucket, render_video, resolve_and_load,
};

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "spritecast_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn write_png(path: &Path, rgba: [u8; 4]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba))
        .save(path)
        .unwrap();
}

fn expression_atlas() -> AtlasIndex {
    AtlasIndex::from_json_value(&serde_json::json!({
        "views": { "front": { "closed": "front/mouth_closed.png" } },
        "fallback": { "view": "front", "mouth": "closed" },
        "expression_labels": ["happy"]
    }))
}

#[test]
fn expression_overlay_is_preferred_when_present() {
    let dir = temp_dir("expr_present");
    write_png(&dir.join("front/mouth_closed.png"), [255, 0, 0, 255]);
    write_png(&dir.join("happy_front/mouth_closed.png"), [0, 0, 255, 255]);

    let cache = SpriteCache::new();
    let outcome = resolve_and_load(
        &expression_atlas(),
        ViewBucket::Front,
        "closed",
        Some("happy"),
        &dir,
        &cache,
    )
    .unwrap();

    let sprite = outcome.sprite.unwrap();
    assert_eq!(sprite.pixel(0, 0).unwrap(), [0, 0, 255, 255]);
    assert!(!outcome.used_fallback);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_expression_asset_folds_back_to_base() {
    let dir = temp_dir("expr_missing");
    write_png(&dir.join("front/mouth_closed.png"), [255, 0, 0, 255]);

    let cache = SpriteCache::new();
    let outcome = resolve_and_load(
        &expression_atlas(),
        ViewBucket::Front,
        "closed",
        Some("happy"),
        &dir,
        &cache,
    )
    .unwrap();

    let sprite = outcome.sprite.unwrap();
    assert_eq!(sprite.pixel(0, 0).unwrap(), [255, 0, 0, 255]);
    assert!(outcome.used_fallback);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn unknown_expression_loads_the_base_without_fallback() {
    let dir = temp_dir("expr_unknown");
    write_png(&dir.join("front/mouth_closed.png"), [255, 0, 0, 255]);

    let cache = SpriteCache::new();
    let outcome = resolve_and_load(
        &expression_atlas(),
        ViewBucket::Front,
        "closed",
        Some("angry"),
        &dir,
        &cache,
    )
    .unwrap();

    assert!(outcome.sprite.is_some());
    assert!(!outcome.used_fallback);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn base_file_missing_on_disk_is_absorbed() {
    let dir = temp_dir("base_missing");
    std::fs::create_dir_all(&dir).unwrap();

    let cache = SpriteCache::new();
    let outcome = resolve_and_load(
        &expression_atlas(),
        ViewBucket::Front,
        "closed",
        None,
        &dir,
        &cache,
    )
    .unwrap();

    assert!(outcome.sprite.is_none());
    assert!(outcome.used_fallback);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn corrupt_sprite_data_is_fatal() {
    let dir = temp_dir("corrupt_sprite");
    let path = dir.join("front/mouth_closed.png");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"definitely not a png").unwrap();

    let cache = SpriteCache::new();
    let err = resolve_and_load(
        &expression_atlas(),
        ViewBucket::Front,
        "closed",
        None,
        &dir,
        &cache,
    )
    .unwrap_err();
    assert!(matches!(err, SpritecastError::Decode(_)));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn corrupt_sprite_aborts_the_whole_render() {
    let dir = temp_dir("corrupt_render");
    let png = dir.join("front/mouth_closed.png");
    std::fs::create_dir_all(png.parent().unwrap()).unwrap();
    std::fs::write(&png, b"garbage").unwrap();

    let atlas = serde_json::json!({
        "views": { "front": { "closed": "front/mouth_closed.png" } }
    });
    std::fs::write(dir.join("atlas.json"), atlas.to_string()).unwrap();

    let mut opts = RenderOpts::new(16, 16, 5, 1);
    opts.assets_dir = Some(dir.clone());
    opts.atlas_rel = Some(PathBuf::from("atlas.json"));

    let timeline = FnTimeline::new(|_t_ms| ValueMap::new());
    let mut sink = InMemorySink::new();
    let err = render_video(&opts, &timeline, None, &mut sink).unwrap_err();
    assert!(matches!(err, SpritecastError::Decode(_)));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn strict_mode_rejects_unresolvable_atlases() {
    let dir = temp_dir("strict_atlas");
    std::fs::create_dir_all(&dir).unwrap();

    // left30-only atlas with a dangling fallback: front/right30 buckets
    // cannot resolve.
    let atlas = serde_json::json!({
        "views": { "left30": { "closed": "left30/mouth_closed.png" } },
        "fallback": { "view": "front", "mouth": "closed" }
    });
    std::fs::write(dir.join("atlas.json"), atlas.to_string()).unwrap();

    let mut opts = RenderOpts::new(16, 16, 5, 1);
    opts.assets_dir = Some(dir.clone());
    opts.atlas_rel = Some(PathBuf::from("atlas.json"));
    opts.strict_atlas = true;

    let timeline = FnTimeline::new(|_t_ms| ValueMap::new());
    let mut sink = InMemorySink::new();
    let err = render_video(&opts, &timeline, None, &mut sink).unwrap_err();
    assert!(matches!(err, SpritecastError::Atlas(_)));

    std::fs::remove_dir_all(&dir).ok();
}
