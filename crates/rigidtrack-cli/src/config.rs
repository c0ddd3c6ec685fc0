//! Tracker configuration – reads the TOML file describing marker sets,
//! dynamics bounds and the objects to track.
//!
//! ```toml
//! [[marker_configurations]]
//! name = "quad4"
//! points = [[0.05, 0.0, 0.0], [-0.03, 0.04, 0.0], [-0.03, -0.05, 0.01], [0.0, 0.0, 0.04]]
//!
//! [[dynamics_configurations]]
//! name = "default"
//! max_x_velocity = 2.0
//! max_y_velocity = 2.0
//! max_z_velocity = 2.0
//! max_roll_rate = 20.0
//! max_pitch_rate = 20.0
//! max_yaw_rate = 20.0
//! max_roll = 1.4
//! max_pitch = 1.4
//!
//! [[objects]]
//! name = "cf1"
//! marker_configuration = "quad4"
//! dynamics_configuration = "default"
//! initial_position = [0.0, 0.5, 0.0]
//! initial_yaw = 0.0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rigidtrack_perception::transform::{Transform3D, Vec3};
use rigidtrack_tracker::{DynamicsConfiguration, MarkerConfiguration, Object, ObjectTracker};
use rigidtrack_types::TrackError;

/// Environment variable naming the configuration file when `--config` is
/// not given.
pub const CONFIG_ENV: &str = "RIGIDTRACK_CONFIG";

/// A named marker template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSetConfig {
    pub name: String,
    pub points: Vec<[f32; 3]>,
}

/// A named set of motion bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsConfig {
    pub name: String,
    #[serde(flatten)]
    pub bounds: DynamicsConfiguration,
}

/// One tracked object.  Configurations are referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    pub marker_configuration: String,
    pub dynamics_configuration: String,

    /// Nominal position used to anchor the bootstrap search.
    #[serde(default)]
    pub initial_position: [f32; 3],

    /// Nominal yaw in radians.
    #[serde(default)]
    pub initial_yaw: f32,
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub marker_configurations: Vec<MarkerSetConfig>,
    #[serde(default)]
    pub dynamics_configurations: Vec<DynamicsConfig>,
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
}

/// Index-resolved configuration, ready for [`ObjectTracker::new`].
#[derive(Debug, Clone)]
pub struct TrackerParts {
    pub dynamics_configurations: Vec<DynamicsConfiguration>,
    pub marker_configurations: Vec<MarkerConfiguration>,
    pub objects: Vec<Object>,
}

impl Config {
    /// Resolve names to indices and check every configuration entry.
    pub fn resolve(&self) -> Result<TrackerParts, TrackError> {
        check_unique("marker", self.marker_configurations.iter().map(|m| m.name.as_str()))?;
        check_unique("dynamics", self.dynamics_configurations.iter().map(|d| d.name.as_str()))?;
        check_unique("object", self.objects.iter().map(|o| o.name.as_str()))?;

        let mut marker_configurations = Vec::with_capacity(self.marker_configurations.len());
        for m in &self.marker_configurations {
            if m.points.is_empty() {
                return Err(TrackError::EmptyMarkerConfiguration(m.name.clone()));
            }
            marker_configurations.push(MarkerConfiguration::new(
                m.points.iter().copied().map(Vec3::from).collect(),
            ));
        }

        let mut dynamics_configurations = Vec::with_capacity(self.dynamics_configurations.len());
        for d in &self.dynamics_configurations {
            d.bounds.validate(&d.name)?;
            dynamics_configurations.push(d.bounds);
        }

        let mut objects = Vec::with_capacity(self.objects.len());
        for o in &self.objects {
            let marker_idx = position_of(
                &o.name,
                "marker",
                &o.marker_configuration,
                self.marker_configurations.iter().map(|m| m.name.as_str()),
            )?;
            let dynamics_idx = position_of(
                &o.name,
                "dynamics",
                &o.dynamics_configuration,
                self.dynamics_configurations.iter().map(|d| d.name.as_str()),
            )?;
            let [x, y, z] = o.initial_position;
            let nominal = Transform3D::from_translation_and_euler(x, y, z, 0.0, 0.0, o.initial_yaw);
            objects.push(Object::new(marker_idx, dynamics_idx, nominal).with_name(o.name.clone()));
        }

        Ok(TrackerParts {
            dynamics_configurations,
            marker_configurations,
            objects,
        })
    }

    /// Resolve the configuration and construct a tracker with the default
    /// registration engine.
    pub fn build_tracker(&self) -> Result<ObjectTracker, TrackError> {
        let parts = self.resolve()?;
        ObjectTracker::new(
            parts.dynamics_configurations,
            parts.marker_configurations,
            parts.objects,
        )
    }
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<(), TrackError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(TrackError::DuplicateName {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn position_of<'a>(
    object: &str,
    kind: &str,
    wanted: &str,
    mut names: impl Iterator<Item = &'a str>,
) -> Result<usize, TrackError> {
    names
        .position(|n| n == wanted)
        .ok_or_else(|| TrackError::UnknownConfiguration {
            object: object.to_string(),
            kind: kind.to_string(),
            name: wanted.to_string(),
        })
}

/// Pick the configuration path: the explicit argument wins, then
/// `RIGIDTRACK_CONFIG`.
pub fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    config_path_with(explicit, std::env::var(CONFIG_ENV).ok())
}

/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_with(explicit: Option<PathBuf>, env: Option<String>) -> Option<PathBuf> {
    explicit.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
}

/// Load and parse a configuration file.
pub fn load_from(path: &Path) -> Result<Config, TrackError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| TrackError::Io(format!("failed to read config at {}: {}", path.display(), e)))?;
    parse(&raw)
}

/// Parse configuration text.
pub fn parse(raw: &str) -> Result<Config, TrackError> {
    toml::from_str(raw).map_err(|e| TrackError::Config(format!("failed to parse config: {e}")))
}
