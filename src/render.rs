use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use rayon::prelude::*;

use crate::{
    atlas::{AtlasIndex, normalize_mouth},
    composite::{BG_RGB, FrameRGBA, alpha_paste, crossfade},
    encode::{FfmpegSink, FrameSink, SinkConfig, default_mp4_config},
    error::{SpritecastError, SpritecastResult},
    hook::PostProcessHook,
    resolve::resolve_and_load,
    sprite::SpriteCache,
    stats::{RenderStats, StatsCollector},
    timeline::{FrameValues, TimelineLookup},
    transform::PoseTransform,
    view::ViewBucket,
};

/// Sprite height as a fraction of canvas height.
pub const SPRITE_HEIGHT_RATIO: f64 = 0.32;
/// Vertical anchor of the sprite center as a fraction of canvas height.
pub const ANCHOR_Y_RATIO: f64 = 0.58;

/// Frame-count policy for crossfade emission.
///
/// `Legacy` keeps the historical behavior: each crossfade burst writes
/// `crossfade_frames` frames, so the output can hold more frames than
/// `duration_s * fps`. `Exact` writes each frame exactly once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FramePacing {
    #[default]
    Legacy,
    Exact,
}

/// Background fill regenerated for every frame.
///
/// `Transparent` leaves the canvas at alpha zero so a post-process hook can
/// substitute its own backdrop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Background {
    Solid([u8; 3]),
    Transparent,
}

impl Default for Background {
    fn default() -> Self {
        Background::Solid(BG_RGB)
    }
}

#[derive(Clone, Debug)]
pub struct RenderThreading {
    pub parallel: bool,
    pub chunk_size: usize,
    pub threads: Option<usize>,
}

impl Default for RenderThreading {
    fn default() -> Self {
        Self {
            parallel: false,
            chunk_size: 64,
            threads: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderOpts {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_s: u32,
    pub crossfade_frames: u32,
    /// Root directory for sprite assets; `None` renders background only.
    pub assets_dir: Option<PathBuf>,
    /// Atlas path, joined onto `assets_dir` unless absolute.
    pub atlas_rel: Option<PathBuf>,
    pub transform: PoseTransform,
    pub pacing: FramePacing,
    pub background: Background,
    /// Reject atlases whose buckets cannot all resolve.
    pub strict_atlas: bool,
    pub threading: RenderThreading,
    /// Cooperative cancellation flag, checked between frames.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RenderOpts {
    pub fn new(width: u32, height: u32, fps: u32, duration_s: u32) -> Self {
        Self {
            width,
            height,
            fps,
            duration_s,
            crossfade_frames: 0,
            assets_dir: None,
            atlas_rel: None,
            transform: PoseTransform::Disabled,
            pacing: FramePacing::default(),
            background: Background::default(),
            strict_atlas: false,
            threading: RenderThreading::default(),
            cancel: None,
        }
    }

    pub fn validate(&self) -> SpritecastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SpritecastError::validation(
                "render width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(SpritecastError::validation("render fps must be non-zero"));
        }
        Ok(())
    }

    fn total_frames(&self) -> u64 {
        u64::from(self.duration_s) * u64::from(self.fps)
    }

    /// Crossfade bursts fire when `index % max(1, fps/2) == 0`.
    fn crossfade_cadence(&self) -> u64 {
        u64::from((self.fps / 2).max(1))
    }
}

struct AtlasContext {
    atlas: AtlasIndex,
    assets_dir: PathBuf,
}

struct ComposedFrame {
    index: u64,
    t_ms: i64,
    frame: FrameRGBA,
    view: Option<ViewBucket>,
    used_fallback: bool,
}

/// Compose one frame: timeline lookup, resolution, resize, pose transform,
/// paste. Pure per frame apart from the shared sprite cache.
fn compose_frame(
    index: u64,
    opts: &RenderOpts,
    ctx: Option<&AtlasContext>,
    cache: &SpriteCache,
    timeline: &dyn TimelineLookup,
) -> SpritecastResult<ComposedFrame> {
    let t_ms = (1000 * index / u64::from(opts.fps)) as i64;
    let vals = FrameValues::from_map(&timeline.value_at(t_ms));
    let mouth = normalize_mouth(&vals.mouth);

    let mut frame = match opts.background {
        Background::Solid(rgb) => FrameRGBA::solid(opts.width, opts.height, rgb),
        Background::Transparent => FrameRGBA::transparent(opts.width, opts.height),
    };

    let mut view = None;
    let mut used_fallback = false;

    if let Some(ctx) = ctx {
        let bucket = ctx.atlas.bucket_policy().select(vals.yaw);
        view = Some(bucket);

        let outcome = resolve_and_load(
            &ctx.atlas,
            bucket,
            &mouth,
            vals.expression.as_deref(),
            &ctx.assets_dir,
            cache,
        )?;
        used_fallback = outcome.used_fallback;

        if let Some(sprite) = outcome.sprite {
            let target_h = ((f64::from(opts.height) * SPRITE_HEIGHT_RATIO) as u32).max(1);
            let resized = sprite.resize_to_height(target_h)?;
            let posed = match opts.transform.apply(&resized, vals.yaw, vals.pitch, vals.roll) {
                Some(rotated) => rotated,
                None => resized,
            };

            let cx = i64::from(opts.width / 2);
            let cy = (f64::from(opts.height) * ANCHOR_Y_RATIO) as i64;
            alpha_paste(&mut frame, &posed, cx, cy);
        }
    }

    Ok(ComposedFrame {
        index,
        t_ms,
        frame,
        view,
        used_fallback,
    })
}

/// Sequential emission tail: stats, hook, crossfade, sink writes.
struct EmitState<'s, 'h> {
    sink: &'s mut dyn FrameSink,
    hook: Option<&'h mut dyn PostProcessHook>,
    stats: StatsCollector,
    prev: Option<FrameRGBA>,
    frame_width: u32,
    frame_height: u32,
    crossfade_frames: u32,
    cadence: u64,
    pacing: FramePacing,
}

impl EmitState<'_, '_> {
    fn emit(&mut self, composed: ComposedFrame) -> SpritecastResult<()> {
        if let Some(view) = composed.view {
            self.stats.record_view(view);
        }
        if composed.used_fallback {
            if self.stats.fallback_frames() == 0 {
                tracing::warn!(t_ms = composed.t_ms, "sprite fallback engaged");
            }
            self.stats.record_fallback(composed.t_ms);
        }

        let mut frame = composed.frame;
        if let Some(hook) = self.hook.as_deref_mut() {
            frame = hook.apply(frame, composed.t_ms, composed.index)?;
            if frame.width != self.frame_width
                || frame.height != self.frame_height
                || frame.data.len()
                    != (self.frame_width as usize) * (self.frame_height as usize) * 4
            {
                return Err(SpritecastError::validation(
                    "post-process hook must preserve frame dimensions and layout",
                ));
            }
        }

        let burst = self.pacing == FramePacing::Legacy
            && self.crossfade_frames > 0
            && composed.index % self.cadence == 0;

        match (&self.prev, burst) {
            (Some(prev), true) => {
                for k in 0..self.crossfade_frames {
                    let t = (k + 1) as f32 / self.crossfade_frames as f32;
                    let blended = crossfade(prev, &frame, t)?;
                    self.sink.push_frame(&blended)?;
                }
            }
            _ => self.sink.push_frame(&frame)?,
        }

        self.prev = Some(frame);
        Ok(())
    }
}

/// Render the full frame sequence into `sink` and return the stats record.
///
/// Frames are always emitted in index order. With `threading.parallel` set,
/// per-frame composition runs on a rayon pool in chunks and results are
/// reordered before the sequential hook/crossfade/write tail.
#[tracing::instrument(
    skip_all,
    fields(
        width = opts.width,
        height = opts.height,
        fps = opts.fps,
        duration_s = opts.duration_s
    )
)]
pub fn render_video<'s, 'h>(
    opts: &RenderOpts,
    timeline: &dyn TimelineLookup,
    hook: Option<&'h mut dyn PostProcessHook>,
    sink: &'s mut dyn FrameSink,
) -> SpritecastResult<RenderStats> {
    opts.validate()?;

    let ctx = match (&opts.assets_dir, &opts.atlas_rel) {
        (Some(assets_dir), Some(atlas_rel)) => {
            let atlas_path = if atlas_rel.is_absolute() {
                atlas_rel.clone()
            } else {
                assets_dir.join(atlas_rel)
            };
            let atlas = AtlasIndex::from_path(&atlas_path)?;
            if opts.strict_atlas {
                atlas.validate()?;
            }
            Some(AtlasContext {
                atlas,
                assets_dir: assets_dir.clone(),
            })
        }
        _ => None,
    };

    sink.begin(SinkConfig {
        width: opts.width,
        height: opts.height,
        fps: opts.fps,
    })?;

    let cache = SpriteCache::new();
    let total_frames = opts.total_frames();
    tracing::debug!(total_frames, atlas = ctx.is_some(), "starting frame loop");

    let mut state = EmitState {
        sink,
        hook,
        stats: StatsCollector::new(),
        prev: None,
        frame_width: opts.width,
        frame_height: opts.height,
        crossfade_frames: opts.crossfade_frames,
        cadence: opts.crossfade_cadence(),
        pacing: opts.pacing,
    };

    if !opts.threading.parallel {
        for index in 0..total_frames {
            check_cancel(&opts.cancel)?;
            let composed = compose_frame(index, opts, ctx.as_ref(), &cache, timeline)?;
            state.emit(composed)?;
        }
    } else {
        let pool = build_thread_pool(opts.threading.threads)?;
        let chunk_size = (opts.threading.chunk_size.max(1)) as u64;

        let mut chunk_start = 0u64;
        while chunk_start < total_frames {
            check_cancel(&opts.cancel)?;
            let chunk_end = (chunk_start + chunk_size).min(total_frames);

            let composed = pool.install(|| {
                (chunk_start..chunk_end)
                    .into_par_iter()
                    .map(|index| compose_frame(index, opts, ctx.as_ref(), &cache, timeline))
                    .collect::<SpritecastResult<Vec<_>>>()
            })?;

            for frame in composed {
                state.emit(frame)?;
            }
            chunk_start = chunk_end;
        }
    }

    state.sink.end()?;

    let stats = state.stats.finish(total_frames, opts.transform.enabled());
    tracing::debug!(
        fallback_frames = stats.fallback_frames,
        sprites_cached = cache.len(),
        "render finished"
    );
    Ok(stats)
}

/// Convenience wrapper: render straight to an MP4 via the system `ffmpeg`.
pub fn render_video_to_mp4(
    opts: &RenderOpts,
    timeline: &dyn TimelineLookup,
    hook: Option<&mut dyn PostProcessHook>,
    out_path: impl Into<PathBuf>,
) -> SpritecastResult<RenderStats> {
    let cfg = default_mp4_config(out_path, opts.width, opts.height, opts.fps);
    let mut sink = FfmpegSink::new(cfg)?;
    render_video(opts, timeline, hook, &mut sink)
}

fn check_cancel(cancel: &Option<Arc<AtomicBool>>) -> SpritecastResult<()> {
    if let Some(flag) = cancel
        && flag.load(Ordering::Relaxed)
    {
        return Err(SpritecastError::evaluation("render cancelled"));
    }
    Ok(())
}

fn build_thread_pool(threads: Option<usize>) -> SpritecastResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(SpritecastError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| SpritecastError::evaluation(format!("failed to build rayon thread pool: {e}")))
}
