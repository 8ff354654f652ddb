use crate::{
    composite::FrameRGBA,
    error::{SpritecastError, SpritecastResult},
};

/// Post-process hook applied after compositing, before crossfade emission.
///
/// A hook may replace the frame wholesale but must keep its pixel
/// dimensions and channel layout; the sequencer enforces this.
pub trait PostProcessHook {
    fn apply(&mut self, frame: FrameRGBA, t_ms: i64, index: u64) -> SpritecastResult<FrameRGBA>;
}

/// Adapter turning a plain closure into a [`PostProcessHook`].
pub struct FnHook<F>(F);

impl<F> FnHook<F>
where
    F: FnMut(FrameRGBA, i64, u64) -> SpritecastResult<FrameRGBA>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> PostProcessHook for FnHook<F>
where
    F: FnMut(FrameRGBA, i64, u64) -> SpritecastResult<FrameRGBA>,
{
    fn apply(&mut self, frame: FrameRGBA, t_ms: i64, index: u64) -> SpritecastResult<FrameRGBA> {
        (self.0)(frame, t_ms, index)
    }
}

/// Background-replacement hook: composites each frame over a fixed backdrop
/// by the frame's own alpha.
///
/// Pairs with [`crate::render::Background::Transparent`], which leaves the
/// un-sprited area at alpha zero so the backdrop shows through. The result
/// is fully opaque.
pub struct BackgroundComposite {
    backdrop: FrameRGBA,
}

impl BackgroundComposite {
    pub fn new(backdrop: FrameRGBA) -> Self {
        Self { backdrop }
    }
}

impl PostProcessHook for BackgroundComposite {
    fn apply(&mut self, frame: FrameRGBA, _t_ms: i64, _index: u64) -> SpritecastResult<FrameRGBA> {
        if frame.width != self.backdrop.width || frame.height != self.backdrop.height {
            return Err(SpritecastError::validation(format!(
                "backdrop {}x{} does not match frame {}x{}",
                self.backdrop.width, self.backdrop.height, frame.width, frame.height
            )));
        }

        let mut out = self.backdrop.clone();
        for (o, f) in out.data.chunks_exact_mut(4).zip(frame.data.chunks_exact(4)) {
            let a = f32::from(f[3]) / 255.0;
            let inv = 1.0 - a;
            for c in 0..3 {
                o[c] = (a * f32::from(f[c]) + inv * f32::from(o[c])).round() as u8;
            }
            o[3] = 255;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_pixels_show_the_backdrop() {
        let backdrop = FrameRGBA::solid(2, 1, [0, 0, 200]);
        let mut hook = BackgroundComposite::new(backdrop);

        // Left pixel opaque red, right pixel fully transparent.
        let mut frame = FrameRGBA::transparent(2, 1);
        frame.data[0..4].copy_from_slice(&[255, 0, 0, 255]);

        let out = hook.apply(frame, 0, 0).unwrap();
        assert_eq!(out.pixel(0, 0).unwrap(), [255, 0, 0, 255]);
        assert_eq!(out.pixel(1, 0).unwrap(), [0, 0, 200, 255]);
    }

    #[test]
    fn backdrop_size_mismatch_is_rejected() {
        let mut hook = BackgroundComposite::new(FrameRGBA::solid(2, 2, [0, 0, 0]));
        let err = hook.apply(FrameRGBA::transparent(3, 2), 0, 0).unwrap_err();
        assert!(matches!(err, SpritecastError::Validation(_)));
    }
}
