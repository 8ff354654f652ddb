use crate::error::{SpritecastError, SpritecastResult};

/// Default symmetric yaw threshold in degrees.
pub const DEFAULT_THR_FRONT: f64 = 16.0;

/// Discrete pose label derived from yaw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewBucket {
    Front,
    Left30,
    Right30,
}

impl ViewBucket {
    pub const ALL: [ViewBucket; 3] = [ViewBucket::Front, ViewBucket::Left30, ViewBucket::Right30];

    pub fn as_str(self) -> &'static str {
        match self {
            ViewBucket::Front => "front",
            ViewBucket::Left30 => "left30",
            ViewBucket::Right30 => "right30",
        }
    }
}

impl std::fmt::Display for ViewBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Yaw bucketing policy.
///
/// Two schemes exist in the wild: a symmetric threshold around zero, and
/// explicit per-side edges. Which one applies is decided by the shape of the
/// atlas `view_rules` section; see [`crate::atlas::AtlasIndex`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BucketPolicy {
    /// `front` iff `|yaw| <= thr_front`, else side by sign. Boundary inclusive.
    SymmetricThreshold { thr_front: f64 },
    /// `left30` iff `yaw <= left30_max_yaw_deg`, `right30` iff
    /// `yaw >= right30_min_yaw_deg`, else `front`.
    AsymmetricEdges {
        left30_max_yaw_deg: f64,
        right30_min_yaw_deg: f64,
    },
}

impl Default for BucketPolicy {
    fn default() -> Self {
        BucketPolicy::SymmetricThreshold {
            thr_front: DEFAULT_THR_FRONT,
        }
    }
}

impl BucketPolicy {
    pub fn select(&self, yaw_deg: f64) -> ViewBucket {
        match *self {
            BucketPolicy::SymmetricThreshold { thr_front } => {
                if yaw_deg.abs() <= thr_front {
                    ViewBucket::Front
                } else if yaw_deg > 0.0 {
                    ViewBucket::Right30
                } else {
                    ViewBucket::Left30
                }
            }
            BucketPolicy::AsymmetricEdges {
                left30_max_yaw_deg,
                right30_min_yaw_deg,
            } => {
                if yaw_deg <= left30_max_yaw_deg {
                    ViewBucket::Left30
                } else if yaw_deg >= right30_min_yaw_deg {
                    ViewBucket::Right30
                } else {
                    ViewBucket::Front
                }
            }
        }
    }

    pub fn validate(&self) -> SpritecastResult<()> {
        match *self {
            BucketPolicy::SymmetricThreshold { thr_front } => {
                if !thr_front.is_finite() || thr_front < 0.0 {
                    return Err(SpritecastError::validation(
                        "thr_front must be finite and >= 0",
                    ));
                }
            }
            BucketPolicy::AsymmetricEdges {
                left30_max_yaw_deg,
                right30_min_yaw_deg,
            } => {
                if !left30_max_yaw_deg.is_finite() || !right30_min_yaw_deg.is_finite() {
                    return Err(SpritecastError::validation(
                        "bucket edges must be finite",
                    ));
                }
                if left30_max_yaw_deg >= right30_min_yaw_deg {
                    return Err(SpritecastError::validation(
                        "left30_max_yaw_deg must be < right30_min_yaw_deg",
                    ));
                }
            }
        }
        Ok(())
    }
}
