//! Static per-type configuration shared by many [`Object`][crate::Object]s.
//!
//! Objects refer to these by index into the tracker's vectors; both types are
//! immutable once the tracker is built.

use rigidtrack_perception::transform::{self, Vec3};
use rigidtrack_types::TrackError;
use serde::{Deserialize, Serialize};

/// Marker layout of one object type, in the object's local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerConfiguration {
    points: Vec<Vec3>,
}

impl MarkerConfiguration {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn centroid(&self) -> Option<Vec3> {
        transform::centroid(&self.points)
    }
}

/// Physical motion bounds for one object class.
///
/// Velocities in m/s, rates in rad/s, attitudes in rad.  Every bound is an
/// exclusive upper limit on the magnitude of the estimated quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicsConfiguration {
    pub max_x_velocity: f32,
    pub max_y_velocity: f32,
    pub max_z_velocity: f32,
    pub max_roll_rate: f32,
    pub max_pitch_rate: f32,
    pub max_yaw_rate: f32,
    pub max_roll: f32,
    pub max_pitch: f32,
}

impl DynamicsConfiguration {
    /// Reject bounds that are zero, negative or not finite.
    pub fn validate(&self, name: &str) -> Result<(), TrackError> {
        let fields = [
            ("max_x_velocity", self.max_x_velocity),
            ("max_y_velocity", self.max_y_velocity),
            ("max_z_velocity", self.max_z_velocity),
            ("max_roll_rate", self.max_roll_rate),
            ("max_pitch_rate", self.max_pitch_rate),
            ("max_yaw_rate", self.max_yaw_rate),
            ("max_roll", self.max_roll),
            ("max_pitch", self.max_pitch),
        ];
        for (field, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrackError::InvalidDynamicsBound {
                    name: name.to_string(),
                    field: field.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}
