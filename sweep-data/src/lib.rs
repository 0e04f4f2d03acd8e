pub mod pose;
pub mod scan;
pub mod state;

pub use pose::{Pose, PoseCorrection};
pub use scan::{Sample, Scan, SLOTS_PER_SCAN};
pub use state::SessionState;
