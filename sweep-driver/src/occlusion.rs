//! Suppression of reflections from the robot's own body.
//!
//! Two mechanisms work together: a per-slot ignore mask learnt from a reference
//! revolution (catches fixed parts such as mast and bumpers), and a directional
//! minimum range that rejects anything closer than the body outline.

use crate::geometry::{interpolate_curve, BODY_CURVE_MM, N_CURVE_POINTS};
use sweep_data::SLOTS_PER_SCAN;

/// Calibration of the robot silhouette, in millimetres.
#[derive(Clone, Debug, PartialEq)]
pub struct OcclusionConfig {
    /// Body outline in 32 steps starting straight ahead.
    pub curve: [u16; N_CURVE_POINTS],
    /// Upper bound of the minimum range ahead of the robot.
    pub front_threshold: u16,
    /// Lower bound of the minimum range on the sides and rear.
    pub side_threshold: u16,
    /// Slots on either side of straight ahead that count as front.
    pub front_half_width_slots: usize,
}

impl OcclusionConfig {
    /// Rejects nothing by range.
    pub fn disabled() -> OcclusionConfig {
        OcclusionConfig {
            curve: [0; N_CURVE_POINTS],
            front_threshold: 0,
            side_threshold: 0,
            front_half_width_slots: 0,
        }
    }
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        OcclusionConfig {
            curve: BODY_CURVE_MM,
            front_threshold: 120,
            side_threshold: 200,
            // 48 degrees
            front_half_width_slots: 96,
        }
    }
}

/// Per-slot flags of directions known to see the robot itself.
#[derive(Clone, Debug, PartialEq)]
pub struct IgnoreMask {
    ignored: Vec<bool>,
}

impl IgnoreMask {
    pub fn empty() -> IgnoreMask {
        IgnoreMask {
            ignored: vec![false; SLOTS_PER_SCAN],
        }
    }

    pub fn is_ignored(&self, slot: usize) -> bool {
        self.ignored[slot % SLOTS_PER_SCAN]
    }

    pub fn n_ignored(&self) -> usize {
        self.ignored.iter().filter(|&&e| e).count()
    }
}

/// Raw distances of one revolution, used to learn the ignore mask.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceSweep {
    distances: Vec<Option<u16>>,
}

impl ReferenceSweep {
    pub fn new() -> ReferenceSweep {
        ReferenceSweep {
            distances: vec![None; SLOTS_PER_SCAN],
        }
    }

    /// Records a distance (mm) for a slot. The latest record of a slot wins.
    pub fn record(&mut self, slot: usize, distance: u16) {
        self.distances[slot % SLOTS_PER_SCAN] = Some(distance);
    }

    pub fn n_recorded(&self) -> usize {
        self.distances.iter().filter(|d| d.is_some()).count()
    }
}

impl Default for ReferenceSweep {
    fn default() -> Self {
        ReferenceSweep::new()
    }
}

pub struct OcclusionFilter {
    config: OcclusionConfig,
    mask: IgnoreMask,
}

impl OcclusionFilter {
    pub fn new(config: OcclusionConfig) -> OcclusionFilter {
        OcclusionFilter {
            config,
            mask: IgnoreMask::empty(),
        }
    }

    fn is_front(&self, slot: usize) -> bool {
        let off_axis = slot.min(SLOTS_PER_SCAN - slot);
        off_axis < self.config.front_half_width_slots
    }

    /// Closest range (mm) accepted at a slot.
    pub fn minimum_range_at(&self, slot: usize) -> u16 {
        let slot = slot % SLOTS_PER_SCAN;
        let body = interpolate_curve(&self.config.curve, slot);
        if self.is_front(slot) {
            body.min(self.config.front_threshold)
        } else {
            body.max(self.config.side_threshold)
        }
    }

    /// Replaces the ignore mask with one learnt from `sweep`.
    ///
    /// Every slot closer than the minimum range is ignored together with its two
    /// neighbours.
    pub fn build_ignore_mask(&mut self, sweep: &ReferenceSweep) {
        let mut ignored = vec![false; SLOTS_PER_SCAN];
        for (slot, distance) in sweep.distances.iter().enumerate() {
            let Some(distance) = distance else {
                continue;
            };
            if *distance >= self.minimum_range_at(slot) {
                continue;
            }
            let prev = (slot + SLOTS_PER_SCAN - 1) % SLOTS_PER_SCAN;
            let next = (slot + 1) % SLOTS_PER_SCAN;
            ignored[prev] = true;
            ignored[slot] = true;
            ignored[next] = true;
        }
        self.mask = IgnoreMask { ignored };
        log::info!(
            "Ignore mask rebuilt from {} samples, {} slots ignored",
            sweep.n_recorded(),
            self.mask.n_ignored()
        );
    }

    pub fn mask(&self) -> &IgnoreMask {
        &self.mask
    }

    /// Whether a live sample at `slot` and `distance` (mm) is kept.
    pub fn accepts(&self, slot: usize, distance: i32) -> bool {
        !self.mask.is_ignored(slot) && distance >= self.minimum_range_at(slot) as i32
    }
}
