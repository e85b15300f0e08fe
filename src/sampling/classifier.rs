//! Tilt classification
//!
//! Maps the forward (`x`) and sideways (`y`) tilt of a reading to one of the
//! nine [`DirectionCommand`]s. Thresholds are exclusive and symmetric; diagonal
//! matches are checked before single-axis matches so a reading past the
//! threshold on both axes always yields a diagonal.

use super::{AxisSample, DirectionCommand};

/// Tilt magnitude that has to be exceeded before an axis counts as active
pub const TILT_THRESHOLD: f64 = 0.2;

pub fn classify(x: f64, y: f64) -> DirectionCommand {
    let left = y > TILT_THRESHOLD;
    let right = y < -TILT_THRESHOLD;
    let forward = x > TILT_THRESHOLD;
    let backward = x < -TILT_THRESHOLD;

    // Order matters: diagonals first
    if forward && left {
        DirectionCommand::ForwardLeft
    } else if forward && right {
        DirectionCommand::ForwardRight
    } else if backward && left {
        DirectionCommand::BackLeft
    } else if backward && right {
        DirectionCommand::BackRight
    } else if left {
        DirectionCommand::Left
    } else if right {
        DirectionCommand::Right
    } else if forward {
        DirectionCommand::Forward
    } else if backward {
        DirectionCommand::Backward
    } else {
        DirectionCommand::Stop
    }
}

pub fn classify_sample(sample: &AxisSample) -> DirectionCommand {
    classify(sample.x, sample.y)
}
