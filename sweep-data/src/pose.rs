#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Robot position and heading in the world frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pose {
    /// Heading. A full turn is 2^32, so the value wraps naturally.
    pub ang: u32,
    /// Position in millimetres.
    pub x: i32,
    /// Position in millimetres.
    pub y: i32,
}

impl Pose {
    pub fn new(x: i32, y: i32, ang: u32) -> Pose {
        Pose { ang, x, y }
    }
}

/// Rigid correction computed by the localization stage once per revolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoseCorrection {
    /// Heading change, same unit as [`Pose::ang`].
    pub dang: i32,
    /// Translation in millimetres.
    pub dx: i32,
    pub dy: i32,
}
