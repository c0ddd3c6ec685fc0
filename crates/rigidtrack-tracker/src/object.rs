//! Per-instance tracking state.

use chrono::{DateTime, Utc};
use rigidtrack_perception::transform::Transform3D;

/// One tracked rigid body.
///
/// `transformation` is never rolled back: it always holds the last accepted
/// estimate (or the configured initial guess before the first one), while
/// `transformation_valid` says whether the most recent frame accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub(crate) name: String,
    pub(crate) marker_configuration_idx: usize,
    pub(crate) dynamics_configuration_idx: usize,
    pub(crate) transformation: Transform3D,
    pub(crate) last_valid_stamp: Option<DateTime<Utc>>,
    pub(crate) transformation_valid: bool,
}

impl Object {
    /// Create an object from its configuration indices and initial pose
    /// guess.  The object starts out invalid.
    pub fn new(
        marker_configuration_idx: usize,
        dynamics_configuration_idx: usize,
        initial_transformation: Transform3D,
    ) -> Self {
        Self {
            name: String::new(),
            marker_configuration_idx,
            dynamics_configuration_idx,
            transformation: initial_transformation,
            last_valid_stamp: None,
            transformation_valid: false,
        }
    }

    /// Attach a display name used in diagnostics and snapshots.  Without
    /// one, [`ObjectTracker`](crate::ObjectTracker) names the object by its
    /// position.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn marker_configuration_idx(&self) -> usize {
        self.marker_configuration_idx
    }

    pub fn dynamics_configuration_idx(&self) -> usize {
        self.dynamics_configuration_idx
    }

    /// Last accepted pose, stale or not.
    pub fn transformation(&self) -> &Transform3D {
        &self.transformation
    }

    /// Whether the most recent frame's update was accepted.
    pub fn transformation_valid(&self) -> bool {
        self.transformation_valid
    }

    /// Time of the last accepted pose; `None` before initialization.
    pub fn last_valid_stamp(&self) -> Option<DateTime<Utc>> {
        self.last_valid_stamp
    }

    /// Seconds from the last accepted pose to `now`.
    ///
    /// NaN before initialization or when the span overflows.
    pub fn elapsed_since_valid(&self, now: DateTime<Utc>) -> f64 {
        self.last_valid_stamp
            .and_then(|last| now.signed_duration_since(last).num_nanoseconds())
            .map_or(f64::NAN, |ns| ns as f64 * 1e-9)
    }
}
