use std::{
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    composite::FrameRGBA,
    error::{SpritecastError, SpritecastResult},
};

/// Stream parameters handed to a sink at the start of a run.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Sink contract for consuming rendered frames.
///
/// Ordering contract: `push_frame` is called in output order, one call per
/// written frame (crossfade bursts included).
pub trait FrameSink: Send {
    /// Called once before any frames are pushed. Resource acquisition
    /// failures here abort the run before any work is done.
    fn begin(&mut self, cfg: SinkConfig) -> SpritecastResult<()>;
    /// Push one frame in output order.
    fn push_frame(&mut self, frame: &FrameRGBA) -> SpritecastResult<()>;
    /// Called once after the last frame.
    fn end(&mut self) -> SpritecastResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<FrameRGBA>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg.clone()
    }

    pub fn frames(&self) -> &[FrameRGBA] {
        &self.frames
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> SpritecastResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> SpritecastResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn end(&mut self) -> SpritecastResult<()> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl EncodeConfig {
    pub fn validate(&self) -> SpritecastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SpritecastError::validation(
                "encode width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(SpritecastError::validation("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // With the default settings we target yuv420p output for maximum compatibility.
            return Err(SpritecastError::validation(
                "encode width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        Ok(())
    }
}

pub fn default_mp4_config(
    out_path: impl Into<PathBuf>,
    width: u32,
    height: u32,
    fps: u32,
) -> EncodeConfig {
    EncodeConfig {
        width,
        height,
        fps,
        out_path: out_path.into(),
        overwrite: true,
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> SpritecastResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// [`FrameSink`] that pipes raw RGBA frames into a spawned `ffmpeg` process
/// producing an H.264 yuv420p MP4.
///
/// We intentionally use the system `ffmpeg` binary rather than `ffmpeg-next`
/// to avoid native FFmpeg dev header/lib requirements. Frames are already
/// opaque, so rgba goes to the encoder as-is.
pub struct FfmpegSink {
    cfg: EncodeConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl FfmpegSink {
    pub fn new(cfg: EncodeConfig) -> SpritecastResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            child: None,
            stdin: None,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, sink_cfg: SinkConfig) -> SpritecastResult<()> {
        if sink_cfg.width != self.cfg.width
            || sink_cfg.height != self.cfg.height
            || sink_cfg.fps != self.cfg.fps
        {
            return Err(SpritecastError::validation(format!(
                "stream {}x{}@{} does not match encode config {}x{}@{}",
                sink_cfg.width,
                sink_cfg.height,
                sink_cfg.fps,
                self.cfg.width,
                self.cfg.height,
                self.cfg.fps
            )));
        }

        ensure_parent_dir(&self.cfg.out_path)?;
        if !self.cfg.overwrite && self.cfg.out_path.exists() {
            return Err(SpritecastError::validation(format!(
                "output file '{}' already exists",
                self.cfg.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(SpritecastError::evaluation(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if self.cfg.overwrite {
            cmd.arg("-y");
        } else {
            cmd.arg("-n");
        }

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", self.cfg.width, self.cfg.height),
            "-r",
            &self.cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&self.cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            SpritecastError::evaluation(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            SpritecastError::evaluation("failed to open ffmpeg stdin (unexpected)")
        })?;

        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> SpritecastResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(SpritecastError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        if frame.data.len() != (self.cfg.width as usize) * (self.cfg.height as usize) * 4 {
            return Err(SpritecastError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SpritecastError::evaluation(
                "ffmpeg sink is not started or already finalized",
            ));
        };

        use std::io::Write as _;
        stdin.write_all(&frame.data).map_err(|e| {
            SpritecastError::evaluation(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn end(&mut self) -> SpritecastResult<()> {
        drop(self.stdin.take());

        let Some(child) = self.child.take() else {
            return Err(SpritecastError::evaluation("ffmpeg sink was never started"));
        };

        let output = child.wait_with_output().map_err(|e| {
            SpritecastError::evaluation(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpritecastError::evaluation(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
