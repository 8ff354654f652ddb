use crate::sprite::SpriteImage;

/// Combined angles below this magnitude (degrees) are treated as identity.
pub const MIN_ANGLE_DEG: f64 = 1e-3;

/// Pose-driven sprite transform.
///
/// The `Linear` variant collapses yaw/pitch/roll into one 2D rotation angle;
/// a deliberate flat approximation of perspective.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum PoseTransform {
    #[default]
    Disabled,
    Linear {
        roll_coef: f64,
        yaw_coef: f64,
        pitch_coef: f64,
    },
}

/// Serde-facing transform configuration.
///
/// Anything that does not parse as this shape means "no transform"; see
/// [`TransformConfig::from_json`].
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub enabled: bool,
    pub roll_coef: f64,
    pub yaw_coef: f64,
    pub pitch_coef: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            roll_coef: 1.0,
            yaw_coef: 0.0,
            pitch_coef: 0.0,
        }
    }
}

impl TransformConfig {
    /// Parse a free-form config value, degrading to the disabled default on
    /// any shape mismatch.
    pub fn from_json(value: &serde_json::Value) -> Self {
        if !value.is_object() {
            return Self::default();
        }
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

impl From<TransformConfig> for PoseTransform {
    fn from(cfg: TransformConfig) -> Self {
        if !cfg.enabled {
            return PoseTransform::Disabled;
        }
        PoseTransform::Linear {
            roll_coef: cfg.roll_coef,
            yaw_coef: cfg.yaw_coef,
            pitch_coef: cfg.pitch_coef,
        }
    }
}

impl PoseTransform {
    pub fn enabled(&self) -> bool {
        !matches!(self, PoseTransform::Disabled)
    }

    /// Combined rotation angle in degrees for a pose sample.
    pub fn angle_deg(&self, yaw_deg: f64, pitch_deg: f64, roll_deg: f64) -> f64 {
        match *self {
            PoseTransform::Disabled => 0.0,
            PoseTransform::Linear {
                roll_coef,
                yaw_coef,
                pitch_coef,
            } => roll_coef * roll_deg + yaw_coef * yaw_deg + pitch_coef * pitch_deg,
        }
    }

    /// Apply the pose rotation to a sprite.
    ///
    /// Returns `None` when the sprite is unchanged (disabled, or the angle
    /// is inside the dead zone) so the caller keeps its buffer untouched.
    pub fn apply(
        &self,
        sprite: &SpriteImage,
        yaw_deg: f64,
        pitch_deg: f64,
        roll_deg: f64,
    ) -> Option<SpriteImage> {
        let angle = self.angle_deg(yaw_deg, pitch_deg, roll_deg);
        if !self.enabled() || angle.abs() < MIN_ANGLE_DEG {
            return None;
        }
        Some(rotate_about_center(sprite, angle))
    }
}

/// Rotate counter-clockwise about the image center with bilinear sampling.
/// Output keeps the source dimensions; uncovered regions are transparent.
fn rotate_about_center(sprite: &SpriteImage, angle_deg: f64) -> SpriteImage {
    let w = sprite.width as usize;
    let h = sprite.height as usize;
    let cx = sprite.width as f64 / 2.0;
    let cy = sprite.height as f64 / 2.0;

    let theta = angle_deg.to_radians();
    let (sin, cos) = theta.sin_cos();

    let mut data = vec![0u8; w * h * 4];
    for y in 0..h {
        for x in 0..w {
            // Inverse mapping: rotate the destination sample point back into
            // source space, sampling at pixel centers.
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            let sx = cos * dx + sin * dy + cx - 0.5;
            let sy = -sin * dx + cos * dy + cy - 0.5;

            let px = sample_bilinear(sprite, sx, sy);
            let i = (y * w + x) * 4;
            data[i..i + 4].copy_from_slice(&px);
        }
    }

    SpriteImage {
        width: sprite.width,
        height: sprite.height,
        data,
    }
}

/// Bilinear sample with transparent (all-zero) pixels outside the source.
fn sample_bilinear(sprite: &SpriteImage, x: f64, y: f64) -> [u8; 4] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let weights = [
        (0i64, 0i64, (1.0 - fx) * (1.0 - fy)),
        (1, 0, fx * (1.0 - fy)),
        (0, 1, (1.0 - fx) * fy),
        (1, 1, fx * fy),
    ];

    let mut acc = [0.0f64; 4];
    for (ox, oy, weight) in weights {
        if weight == 0.0 {
            continue;
        }
        let sx = x0 as i64 + ox;
        let sy = y0 as i64 + oy;
        if sx < 0 || sy < 0 {
            continue;
        }
        let Some(px) = sprite.pixel(sx as u32, sy as u32) else {
            continue;
        };
        for c in 0..4 {
            acc[c] += weight * f64::from(px[c]);
        }
    }

    [
        acc[0].round().clamp(0.0, 255.0) as u8,
        acc[1].round().clamp(0.0, 255.0) as u8,
        acc[2].round().clamp(0.0, 255.0) as u8,
        acc[3].round().clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_leaves_pixels_untouched() {
        let sprite = SpriteImage::solid(4, 4, [200, 100, 50, 255]).unwrap();
        assert!(PoseTransform::Disabled.apply(&sprite, 45.0, 30.0, 90.0).is_none());
    }

    #[test]
    fn dead_zone_skips_the_rotation() {
        let t = PoseTransform::Linear {
            roll_coef: 1.0,
            yaw_coef: 0.0,
            pitch_coef: 0.0,
        };
        let sprite = SpriteImage::solid(4, 4, [1, 2, 3, 255]).unwrap();
        assert!(t.apply(&sprite, 0.0, 0.0, 0.0005).is_none());
        assert!(t.apply(&sprite, 0.0, 0.0, 0.5).is_some());
    }

    #[test]
    fn angle_is_a_linear_combination() {
        let t = PoseTransform::Linear {
            roll_coef: 1.0,
            yaw_coef: 0.5,
            pitch_coef: -0.25,
        };
        assert_eq!(t.angle_deg(10.0, 4.0, 2.0), 2.0 + 5.0 - 1.0);
        assert_eq!(PoseTransform::Disabled.angle_deg(10.0, 4.0, 2.0), 0.0);
    }

    #[test]
    fn quarter_turn_uncovers_transparent_regions() {
        // An 8x2 opaque bar rotated 90 degrees covers only a 2-wide column;
        // everything outside the rotated footprint must be fully transparent.
        let t = PoseTransform::Linear {
            roll_coef: 1.0,
            yaw_coef: 0.0,
            pitch_coef: 0.0,
        };
        let sprite = SpriteImage::solid(8, 2, [255, 0, 0, 255]).unwrap();
        let rotated = t.apply(&sprite, 0.0, 0.0, 90.0).unwrap();
        assert_eq!((rotated.width, rotated.height), (8, 2));

        assert_eq!(rotated.pixel(0, 0).unwrap()[3], 0);
        assert_eq!(rotated.pixel(7, 1).unwrap()[3], 0);
        assert!(rotated.pixel(3, 1).unwrap()[3] > 0);
    }

    #[test]
    fn half_turn_keeps_the_footprint_opaque() {
        let t = PoseTransform::Linear {
            roll_coef: 1.0,
            yaw_coef: 0.0,
            pitch_coef: 0.0,
        };
        let sprite = SpriteImage::solid(6, 4, [10, 20, 30, 255]).unwrap();
        let rotated = t.apply(&sprite, 0.0, 0.0, 180.0).unwrap();
        for y in 0..4 {
            for x in 0..6 {
                assert_eq!(rotated.pixel(x, y).unwrap(), [10, 20, 30, 255]);
            }
        }
    }

    #[test]
    fn config_shape_mismatch_means_disabled() {
        let cfg = TransformConfig::from_json(&serde_json::json!("transform: on"));
        assert_eq!(PoseTransform::from(cfg), PoseTransform::Disabled);

        let cfg = TransformConfig::from_json(&serde_json::json!({
            "enabled": true, "roll_coef": 0.5
        }));
        assert_eq!(
            PoseTransform::from(cfg),
            PoseTransform::Linear {
                roll_coef: 0.5,
                yaw_coef: 0.0,
                pitch_coef: 0.0
            }
        );
    }
}
