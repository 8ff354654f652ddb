#![forbid(unsafe_code)]

pub mod atlas;
pub mod composite;
pub mod encode;
pub mod error;
pub mod hook;
pub mod render;
pub mod resolve;
pub mod sprite;
pub mod stats;
pub mod timeline;
pub mod transform;
pub mod view;

pub use atlas::{AtlasIndex, DEFAULT_EXPRESSION, FallbackSpec, normalize_mouth};
pub use composite::{BG_RGB, FrameRGBA, alpha_paste, crossfade, solid_background};
pub use encode::{
    EncodeConfig, FfmpegSink, FrameSink, InMemorySink, SinkConfig, default_mp4_config,
    ensure_parent_dir, is_ffmpeg_on_path,
};
pub use error::{SpritecastError, SpritecastResult};
pub use hook::{BackgroundComposite, FnHook, PostProcessHook};
pub use render::{
    ANCHOR_Y_RATIO, Background, FramePacing, RenderOpts, RenderThreading, SPRITE_HEIGHT_RATIO,
    render_video, render_video_to_mp4,
};
pub use resolve::{
    ResolvedSprite, SpriteOutcome, expression_candidate, resolve_and_load, resolve_base,
};
pub use sprite::{SpriteCache, SpriteImage, decode_sprite, load_sprite};
pub use stats::{RenderStats, StatsCollector, TransformStats};
pub use timeline::{FnTimeline, FrameValues, MergedTimeline, StepTimeline, TimelineLookup, ValueMap};
pub use transform::{MIN_ANGLE_DEG, PoseTransform, TransformConfig};
pub use view::{BucketPolicy, DEFAULT_THR_FRONT, ViewBucket};
