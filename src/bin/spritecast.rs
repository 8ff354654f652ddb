use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use spritecast::{
    AtlasIndex, FramePacing, MergedTimeline, PoseTransform, RenderOpts, RenderThreading,
    StepTimeline, TimelineLookup, TransformConfig, render_video_to_mp4,
};

#[derive(Parser, Debug)]
#[command(name = "spritecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render an MP4 video (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Print the normalized atlas index as JSON.
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Sprite assets directory.
    #[arg(long)]
    assets_dir: PathBuf,

    /// Atlas path, relative to the assets directory unless absolute.
    #[arg(long, default_value = "atlas.json")]
    atlas: PathBuf,

    /// Timeline JSON file; may be given several times (mouth/pose/expression
    /// tracks), merged per timestamp with later files winning.
    #[arg(long = "timeline", required = true)]
    timelines: Vec<PathBuf>,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Duration in whole seconds.
    #[arg(long, default_value_t = 5)]
    duration_s: u32,

    #[arg(long, default_value_t = 0)]
    crossfade_frames: u32,

    /// Guarantee exactly fps*duration_s written frames (no crossfade bursts).
    #[arg(long)]
    exact_frame_count: bool,

    /// Reject atlases whose view buckets cannot all resolve.
    #[arg(long)]
    strict: bool,

    /// Enable the pose transform.
    #[arg(long)]
    transform: bool,

    #[arg(long, default_value_t = 1.0)]
    roll_coef: f64,

    #[arg(long, default_value_t = 0.0)]
    yaw_coef: f64,

    #[arg(long, default_value_t = 0.0)]
    pitch_coef: f64,

    /// Compose frames on a worker pool.
    #[arg(long)]
    parallel: bool,

    /// Worker thread count (defaults to the rayon default).
    #[arg(long)]
    threads: Option<usize>,

    /// Also write the stats record to this JSON file.
    #[arg(long)]
    stats_out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Sprite assets directory.
    #[arg(long)]
    assets_dir: PathBuf,

    /// Atlas path, relative to the assets directory unless absolute.
    #[arg(long, default_value = "atlas.json")]
    atlas: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => run_render(args),
        Command::Inspect(args) => run_inspect(args),
    }
}

fn run_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut sources: Vec<Box<dyn TimelineLookup>> = Vec::with_capacity(args.timelines.len());
    for path in &args.timelines {
        sources.push(Box::new(StepTimeline::from_path(path)?));
    }
    let timeline = MergedTimeline::new(sources);

    let mut opts = RenderOpts::new(args.width, args.height, args.fps, args.duration_s);
    opts.crossfade_frames = args.crossfade_frames;
    opts.assets_dir = Some(args.assets_dir);
    opts.atlas_rel = Some(args.atlas);
    opts.transform = PoseTransform::from(TransformConfig {
        enabled: args.transform,
        roll_coef: args.roll_coef,
        yaw_coef: args.yaw_coef,
        pitch_coef: args.pitch_coef,
    });
    if args.exact_frame_count {
        opts.pacing = FramePacing::Exact;
    }
    opts.strict_atlas = args.strict;
    opts.threading = RenderThreading {
        parallel: args.parallel,
        threads: args.threads,
        ..RenderThreading::default()
    };

    let stats = render_video_to_mp4(&opts, &timeline, None, &args.out)?;

    let json = serde_json::to_string_pretty(&stats).context("serialize stats record")?;
    println!("{json}");
    if let Some(stats_out) = &args.stats_out {
        std::fs::write(stats_out, &json)
            .with_context(|| format!("write stats to '{}'", stats_out.display()))?;
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let atlas_path = if args.atlas.is_absolute() {
        args.atlas.clone()
    } else {
        args.assets_dir.join(&args.atlas)
    };
    let atlas = AtlasIndex::from_path(&atlas_path)?;

    let summary = serde_json::json!({
        "views": atlas.views(),
        "fallback": {
            "view": atlas.fallback().view,
            "mouth": atlas.fallback().mouth,
        },
        "expression_default": atlas.expression_default(),
        "buckets_resolve": atlas.validate().is_ok(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
