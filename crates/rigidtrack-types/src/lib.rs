use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A quantity checked by the dynamics gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicsBound {
    Vx,
    Vy,
    Vz,
    RollRate,
    PitchRate,
    YawRate,
    Roll,
    Pitch,
}

impl DynamicsBound {
    /// Short label used in diagnostics (`"vx"`, `"wroll"`, …).
    pub fn label(self) -> &'static str {
        match self {
            DynamicsBound::Vx => "vx",
            DynamicsBound::Vy => "vy",
            DynamicsBound::Vz => "vz",
            DynamicsBound::RollRate => "wroll",
            DynamicsBound::PitchRate => "wpitch",
            DynamicsBound::YawRate => "wyaw",
            DynamicsBound::Roll => "roll",
            DynamicsBound::Pitch => "pitch",
        }
    }
}

/// One failed dynamics check: the estimated `value` whose magnitude reached
/// or exceeded `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundViolation {
    pub bound: DynamicsBound,
    pub value: f32,
    pub limit: f32,
}

impl std::fmt::Display for BoundViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} >= {}", self.bound.label(), self.value, self.limit)
    }
}

/// What happened to one object during one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Global initialization has not succeeded yet; no pose is trusted.
    Uninitialized,
    /// Global initialization succeeded in this frame.
    Bootstrapped,
    /// The tracked pose passed the dynamics gate and was committed.
    Accepted {
        /// Estimated linear velocity (m/s), x/y/z.
        velocity: [f32; 3],
        /// Estimated roll/pitch/yaw rates (rad/s).
        angular_rate: [f32; 3],
    },
    /// The registration engine did not converge; previous pose retained.
    NotConverged,
    /// Registration converged but implied physically impossible motion.
    DynamicsViolation(Vec<BoundViolation>),
    /// Elapsed time since the last accepted pose was zero, negative or not
    /// finite; registration was skipped.  `dt` is `None` when no finite
    /// elapsed time exists, e.g. the object was never stamped.
    InvalidTimeStep { dt: Option<f64> },
}

impl ObjectStatus {
    /// True when this frame produced a trusted pose.
    pub fn is_valid(&self) -> bool {
        matches!(self, ObjectStatus::Accepted { .. } | ObjectStatus::Bootstrapped)
    }
}

impl std::fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectStatus::Uninitialized => write!(f, "uninitialized"),
            ObjectStatus::Bootstrapped => write!(f, "bootstrapped"),
            ObjectStatus::Accepted { .. } => write!(f, "accepted"),
            ObjectStatus::NotConverged => write!(f, "registration did not converge"),
            ObjectStatus::DynamicsViolation(v) => {
                write!(f, "dynamic check failed")?;
                for violation in v {
                    write!(f, "; {violation}")?;
                }
                Ok(())
            }
            ObjectStatus::InvalidTimeStep { dt: Some(dt) } => write!(f, "invalid time step dt={dt}"),
            ObjectStatus::InvalidTimeStep { dt: None } => write!(f, "invalid time step dt=unknown"),
        }
    }
}

/// Per-frame summary produced by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub stamp: DateTime<Utc>,
    /// Whether global initialization has succeeded (in this or an earlier
    /// frame).
    pub initialized: bool,
    /// One entry per object, in tracker order.
    pub statuses: Vec<ObjectStatus>,
}

/// Consumer-facing pose of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub name: String,
    pub valid: bool,
    pub position: [f32; 3],
    /// Unit quaternion, (w, x, y, z).
    pub orientation: [f32; 4],
    /// Roll, pitch, yaw in radians.
    pub rpy: [f32; 3],
}

/// Errors raised while assembling a tracker from configuration.
///
/// The per-frame path never returns these; it reports through
/// [`ObjectStatus`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackError {
    #[error("Marker configuration '{0}' has no markers")]
    EmptyMarkerConfiguration(String),

    #[error("Object '{object}': marker configuration index {index} out of range ({len} configured)")]
    MarkerConfigurationOutOfRange { object: String, index: usize, len: usize },

    #[error("Object '{object}': dynamics configuration index {index} out of range ({len} configured)")]
    DynamicsConfigurationOutOfRange { object: String, index: usize, len: usize },

    #[error("Object '{object}' references unknown {kind} configuration '{name}'")]
    UnknownConfiguration { object: String, kind: String, name: String },

    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: String, name: String },

    #[error("Dynamics configuration '{name}': {field} must be positive and finite, got {value}")]
    InvalidDynamicsBound { name: String, field: String, value: f32 },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("I/O Error: {0}")]
    Io(String),
}
