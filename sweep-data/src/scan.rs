use crate::pose::Pose;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One slot per half degree of mechanical rotation.
pub const SLOTS_PER_SCAN: usize = 720;

/// One world-frame point of a scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    pub valid: bool,
    /// World coordinates in millimetres.
    pub x: i32,
    pub y: i32,
}

/// Struct to hold one revolution of lidar samples mapped to the world frame.
///
/// Slots are overwritten in place on every revolution and never cleared, so a slot
/// the sensor did not hit during the last revolution may hold older data. Check
/// `valid` before using a sample.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Scan {
    /// Revolution counter of the session that produced this scan.
    pub id: u32,
    /// Always `SLOTS_PER_SCAN` entries, indexed by half-degree slot.
    pub samples: Vec<Sample>,
    /// Robot pose when the revolution started.
    pub pose_at_start: Pose,
    /// Robot pose when the revolution finished.
    pub pose_at_end: Pose,
}

impl Scan {
    pub fn new() -> Scan {
        Scan {
            id: 0,
            samples: vec![Sample::default(); SLOTS_PER_SCAN],
            pose_at_start: Pose::default(),
            pose_at_end: Pose::default(),
        }
    }

    pub fn n_valid(&self) -> usize {
        self.samples.iter().filter(|s| s.valid).count()
    }

    /// Iterates over `(slot, sample)` for valid samples only.
    pub fn valid_samples(&self) -> impl Iterator<Item = (usize, &Sample)> {
        self.samples.iter().enumerate().filter(|(_, s)| s.valid)
    }
}

impl Default for Scan {
    fn default() -> Self {
        Scan::new()
    }
}
