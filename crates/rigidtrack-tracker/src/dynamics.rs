//! Dynamics gate – physical plausibility check on a tracked pose update.
//!
//! A registration result that converged numerically can still describe
//! impossible motion (mismatched correspondences, occluded markers).  Before a
//! new pose is committed, the motion it implies is finite-differenced against
//! the previous pose into a [`MotionEstimate`] and passed through [`check`].
//! Every bound is evaluated; all violations are reported, not only the first.
//!
//! The comparison is strict: a magnitude equal to its bound is a violation.
//! Absolute yaw is not gated, only its rate, so objects may spin freely about
//! the vertical axis.

use std::f32::consts::{PI, TAU};

use rigidtrack_perception::transform::Transform3D;
use rigidtrack_types::{BoundViolation, DynamicsBound};

use crate::config::DynamicsConfiguration;

// ────────────────────────────────────────────────────────────────────────────
// MotionEstimate
// ────────────────────────────────────────────────────────────────────────────

/// Finite-difference motion between two poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEstimate {
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub roll_rate: f32,
    pub pitch_rate: f32,
    pub yaw_rate: f32,
    /// Absolute attitude of the newer pose.
    pub roll: f32,
    pub pitch: f32,
}

impl MotionEstimate {
    /// Estimate motion from `previous` to `current` over `dt` seconds.
    ///
    /// Angle differences are wrapped to (-π, π] first.  A non-positive `dt`
    /// yields non-finite rates, which [`check`] always rejects.
    pub fn between(previous: &Transform3D, current: &Transform3D, dt: f32) -> Self {
        let (p0, e0) = previous.translation_and_euler();
        let (p1, e1) = current.translation_and_euler();
        Self {
            vx: (p1.x - p0.x) / dt,
            vy: (p1.y - p0.y) / dt,
            vz: (p1.z - p0.z) / dt,
            roll_rate: wrap_angle(e1.roll - e0.roll) / dt,
            pitch_rate: wrap_angle(e1.pitch - e0.pitch) / dt,
            yaw_rate: wrap_angle(e1.yaw - e0.yaw) / dt,
            roll: e1.roll,
            pitch: e1.pitch,
        }
    }

    pub fn velocity(&self) -> [f32; 3] {
        [self.vx, self.vy, self.vz]
    }

    pub fn angular_rate(&self) -> [f32; 3] {
        [self.roll_rate, self.pitch_rate, self.yaw_rate]
    }
}

/// Wrap an angle to (-π, π].
pub fn wrap_angle(a: f32) -> f32 {
    let a = a % TAU;
    if a > PI {
        a - TAU
    } else if a <= -PI {
        a + TAU
    } else {
        a
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gate
// ────────────────────────────────────────────────────────────────────────────

type Rule = (
    DynamicsBound,
    fn(&MotionEstimate) -> f32,
    fn(&DynamicsConfiguration) -> f32,
);

/// Checked in this order; diagnostics follow it.
const RULES: [Rule; 8] = [
    (DynamicsBound::Vx, |m| m.vx, |d| d.max_x_velocity),
    (DynamicsBound::Vy, |m| m.vy, |d| d.max_y_velocity),
    (DynamicsBound::Vz, |m| m.vz, |d| d.max_z_velocity),
    (DynamicsBound::RollRate, |m| m.roll_rate, |d| d.max_roll_rate),
    (DynamicsBound::PitchRate, |m| m.pitch_rate, |d| d.max_pitch_rate),
    (DynamicsBound::YawRate, |m| m.yaw_rate, |d| d.max_yaw_rate),
    (DynamicsBound::Roll, |m| m.roll, |d| d.max_roll),
    (DynamicsBound::Pitch, |m| m.pitch, |d| d.max_pitch),
];

/// Accept `motion` only if every gated magnitude is strictly below its bound.
///
/// Non-finite estimates never pass.
pub fn check(
    motion: &MotionEstimate,
    bounds: &DynamicsConfiguration,
) -> Result<(), Vec<BoundViolation>> {
    let violations: Vec<BoundViolation> = RULES
        .iter()
        .filter_map(|(bound, value_of, limit_of)| {
            let value = value_of(motion);
            let limit = limit_of(bounds);
            // NaN fails the comparison and lands here too.
            if value.abs() < limit {
                None
            } else {
                Some(BoundViolation {
                    bound: *bound,
                    value,
                    limit,
                })
            }
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}
