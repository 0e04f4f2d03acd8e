use crate::geometry::SinTable;
use crossbeam_utils::atomic::AtomicCell;
use sweep_data::{Pose, PoseCorrection, Scan};

/// Access to the robot pose estimate, which is maintained outside the driver.
pub trait PoseSource: Send + Sync {
    /// Instantaneous pose snapshot.
    fn current_pose(&self) -> Pose;
    /// Shifts the estimate by a correction without moving the robot.
    fn apply_correction(&self, correction: &PoseCorrection);
}

/// Pose cell shared between the estimator and the driver.
#[derive(Default)]
pub struct SharedPose {
    pose: AtomicCell<Pose>,
}

impl SharedPose {
    pub fn new(pose: Pose) -> SharedPose {
        SharedPose {
            pose: AtomicCell::new(pose),
        }
    }

    pub fn set(&self, pose: Pose) {
        self.pose.store(pose);
    }
}

impl PoseSource for SharedPose {
    fn current_pose(&self) -> Pose {
        self.pose.load()
    }

    fn apply_correction(&self, correction: &PoseCorrection) {
        // fetch_update retries if the estimator writes in between
        let _ = self.pose.fetch_update(|pose| Some(corrected(pose, correction)));
    }
}

fn corrected(pose: Pose, correction: &PoseCorrection) -> Pose {
    Pose {
        ang: pose.ang.wrapping_add(correction.dang as u32),
        x: pose.x + correction.dx,
        y: pose.y + correction.dy,
    }
}

/// Applies a correction to a finished scan: rotation about the pose the scan ended
/// at, then translation. Both pose snapshots move with the points.
pub(crate) fn correct_scan(scan: &mut Scan, correction: &PoseCorrection, table: &SinTable) {
    let center = scan.pose_at_end;
    let ang = correction.dang as u32;
    let transform = |x: i32, y: i32| {
        let (rx, ry) = match ang {
            0 => (x - center.x, y - center.y),
            _ => table.rotate(ang, x - center.x, y - center.y),
        };
        (
            center.x + rx + correction.dx,
            center.y + ry + correction.dy,
        )
    };

    for sample in scan.samples.iter_mut().filter(|s| s.valid) {
        (sample.x, sample.y) = transform(sample.x, sample.y);
    }
    let (x, y) = transform(scan.pose_at_start.x, scan.pose_at_start.y);
    scan.pose_at_start = Pose {
        ang: scan.pose_at_start.ang.wrapping_add(ang),
        x,
        y,
    };
    scan.pose_at_end = corrected(center, correction);
}
