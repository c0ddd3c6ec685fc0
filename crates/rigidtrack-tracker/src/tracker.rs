//! [`ObjectTracker`] – per-frame orchestration across every tracked object.
//!
//! Each call to [`ObjectTracker::update`] consumes one unlabeled point cloud.
//! Until global initialization has succeeded once, frames go to the
//! bootstrap ([`ObjectTracker::initialize`]); afterwards every frame runs the
//! local per-object update.  The switch is one-way.
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use rigidtrack_perception::transform::{Transform3D, Vec3, transform_points};
//! use rigidtrack_tracker::{DynamicsConfiguration, MarkerConfiguration, Object, ObjectTracker};
//!
//! let markers = MarkerConfiguration::new(vec![
//!     Vec3::new(0.05, 0.0, 0.0),
//!     Vec3::new(-0.03, 0.04, 0.0),
//!     Vec3::new(-0.03, -0.05, 0.01),
//!     Vec3::new(0.0, 0.0, 0.04),
//! ]);
//! let dynamics = DynamicsConfiguration {
//!     max_x_velocity: 2.0, max_y_velocity: 2.0, max_z_velocity: 2.0,
//!     max_roll_rate: 10.0, max_pitch_rate: 10.0, max_yaw_rate: 10.0,
//!     max_roll: 1.0, max_pitch: 1.0,
//! };
//! let cloud = transform_points(
//!     &Transform3D::from_translation_and_euler(0.3, 0.2, 0.0, 0.0, 0.0, 0.0),
//!     markers.points(),
//! );
//!
//! let mut tracker = ObjectTracker::new(
//!     vec![dynamics],
//!     vec![markers],
//!     vec![Object::new(0, 0, Transform3D::identity())],
//! ).unwrap();
//!
//! let t0 = Utc::now();
//! tracker.update(&cloud, t0);
//! assert!(tracker.is_initialized());
//!
//! tracker.update(&cloud, t0 + Duration::milliseconds(10));
//! assert!(tracker.objects()[0].transformation_valid());
//! ```

use chrono::{DateTime, Utc};
use rigidtrack_perception::icp::{PointToPointIcp, Registration};
use rigidtrack_perception::neighbors::KdIndex;
use rigidtrack_perception::transform::Vec3;
use rigidtrack_types::{FrameReport, ObjectStatus, PoseSnapshot, TrackError};
use tracing::{info, instrument, warn};

use crate::bootstrap;
use crate::config::{DynamicsConfiguration, MarkerConfiguration};
use crate::object::Object;
use crate::tracking::{self, FrameCloud};

/// Tracks a fixed set of rigid bodies from unlabeled point clouds.
///
/// Owns every [`Object`] and the configuration vectors they index into.
/// Generic over the registration engine so that callers can substitute
/// their own; [`PointToPointIcp`] is the default.
#[derive(Debug, Clone)]
pub struct ObjectTracker<R = PointToPointIcp> {
    engine: R,
    dynamics_configurations: Vec<DynamicsConfiguration>,
    marker_configurations: Vec<MarkerConfiguration>,
    objects: Vec<Object>,
    initialized: bool,
    last_report: Option<FrameReport>,
}

impl ObjectTracker<PointToPointIcp> {
    /// Build a tracker using the default ICP engine.
    pub fn new(
        dynamics_configurations: Vec<DynamicsConfiguration>,
        marker_configurations: Vec<MarkerConfiguration>,
        objects: Vec<Object>,
    ) -> Result<Self, TrackError> {
        Self::with_engine(
            PointToPointIcp::default(),
            dynamics_configurations,
            marker_configurations,
            objects,
        )
    }
}

impl<R: Registration> ObjectTracker<R> {
    /// Build a tracker around a specific registration engine.
    ///
    /// Configuration indices and marker sets are checked once here; the
    /// per-frame path relies on them without re-validation.  Objects built
    /// without [`Object::with_name`] are named `object<position>`.
    pub fn with_engine(
        engine: R,
        dynamics_configurations: Vec<DynamicsConfiguration>,
        marker_configurations: Vec<MarkerConfiguration>,
        mut objects: Vec<Object>,
    ) -> Result<Self, TrackError> {
        for (i, object) in objects.iter_mut().enumerate() {
            if object.name.is_empty() {
                object.name = format!("object{i}");
            }
        }
        validate(&dynamics_configurations, &marker_configurations, &objects)?;
        Ok(Self {
            engine,
            dynamics_configurations,
            marker_configurations,
            objects,
            initialized: false,
            last_report: None,
        })
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn marker_configurations(&self) -> &[MarkerConfiguration] {
        &self.marker_configurations
    }

    pub fn dynamics_configurations(&self) -> &[DynamicsConfiguration] {
        &self.dynamics_configurations
    }

    /// Whether global initialization has ever succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Report of the most recent [`update`][Self::update], if any.
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Process one frame.
    #[instrument(skip_all, fields(points = cloud.len(), initialized = self.initialized))]
    pub fn update(&mut self, cloud: &[Vec3], stamp: DateTime<Utc>) -> &FrameReport {
        let index = KdIndex::build(cloud);
        let frame = FrameCloud::new(cloud, &index);

        let statuses = if self.initialized {
            self.track_all(&frame, stamp)
        } else if self.bootstrap(&frame, stamp) {
            vec![ObjectStatus::Bootstrapped; self.objects.len()]
        } else {
            warn!(
                "object tracker initialization failed - check that position is correct, \
                 all markers are visible, and marker configuration matches config file"
            );
            vec![ObjectStatus::Uninitialized; self.objects.len()]
        };

        self.last_report.insert(FrameReport {
            stamp,
            initialized: self.initialized,
            statuses,
        })
    }

    /// Run global initialization against `cloud`.
    ///
    /// Returns whether every object was located.  A no-op returning `true`
    /// once the tracker is initialized.
    pub fn initialize(&mut self, cloud: &[Vec3], stamp: DateTime<Utc>) -> bool {
        if self.initialized {
            return true;
        }
        let index = KdIndex::build(cloud);
        self.bootstrap(&FrameCloud::new(cloud, &index), stamp)
    }

    /// Current poses in consumer-facing form.
    pub fn snapshots(&self) -> Vec<PoseSnapshot> {
        self.objects
            .iter()
            .map(|o| {
                let (p, e) = o.transformation.translation_and_euler();
                let q = o.transformation.rotation;
                PoseSnapshot {
                    name: o.name.clone(),
                    valid: o.transformation_valid,
                    position: p.to_array(),
                    orientation: [q.w, q.x, q.y, q.z],
                    rpy: [e.roll, e.pitch, e.yaw],
                }
            })
            .collect()
    }

    /// Locate every object from scratch.  Poses are overwritten on every
    /// attempt; validity and stamps only change on full success.
    fn bootstrap(&mut self, frame: &FrameCloud<'_>, stamp: DateTime<Utc>) -> bool {
        let mut all_fits_good = true;
        for object in &mut self.objects {
            let markers = &self.marker_configurations[object.marker_configuration_idx];
            match bootstrap::locate_object(&object.transformation, markers, frame, &self.engine) {
                Some(placement) => {
                    object.transformation = placement.transform;
                    if !placement.is_valid() {
                        warn!(
                            object = %object.name,
                            worst_squared_distance = placement.worst_squared_distance,
                            fitness = placement.fitness,
                            "bootstrap fit rejected"
                        );
                        all_fits_good = false;
                    }
                }
                None => {
                    warn!(object = %object.name, "no observed points to anchor bootstrap");
                    all_fits_good = false;
                }
            }
        }

        if all_fits_good {
            for object in &mut self.objects {
                object.last_valid_stamp = Some(stamp);
                object.transformation_valid = true;
            }
            self.initialized = true;
            info!(objects = self.objects.len(), "object tracker initialized");
        }
        all_fits_good
    }

    fn track_all(&mut self, frame: &FrameCloud<'_>, stamp: DateTime<Utc>) -> Vec<ObjectStatus> {
        let mut statuses = Vec::with_capacity(self.objects.len());
        for object in &mut self.objects {
            let markers = &self.marker_configurations[object.marker_configuration_idx];
            let dynamics = &self.dynamics_configurations[object.dynamics_configuration_idx];
            let (next, status) =
                tracking::track_object(object, markers, dynamics, frame, &self.engine, stamp);
            *object = next;
            statuses.push(status);
        }
        statuses
    }
}

/// Check the index and non-emptiness invariants the tracker relies on.
pub fn validate(
    dynamics_configurations: &[DynamicsConfiguration],
    marker_configurations: &[MarkerConfiguration],
    objects: &[Object],
) -> Result<(), TrackError> {
    for object in objects {
        let Some(markers) = marker_configurations.get(object.marker_configuration_idx) else {
            return Err(TrackError::MarkerConfigurationOutOfRange {
                object: object.name.clone(),
                index: object.marker_configuration_idx,
                len: marker_configurations.len(),
            });
        };
        if markers.is_empty() {
            return Err(TrackError::EmptyMarkerConfiguration(format!(
                "#{}",
                object.marker_configuration_idx
            )));
        }
        if object.dynamics_configuration_idx >= dynamics_configurations.len() {
            return Err(TrackError::DynamicsConfigurationOutOfRange {
                object: object.name.clone(),
                index: object.dynamics_configuration_idx,
                len: dynamics_configurations.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rigidtrack_perception::transform::{Transform3D, transform_points};

    fn markers() -> MarkerConfiguration {
        MarkerConfiguration::new(vec![
            Vec3::new(0.05, 0.0, 0.0),
            Vec3::new(-0.03, 0.04, 0.0),
            Vec3::new(-0.03, -0.05, 0.01),
            Vec3::new(0.0, 0.0, 0.04),
        ])
    }

    fn bounds() -> DynamicsConfiguration {
        DynamicsConfiguration {
            max_x_velocity: 2.0,
            max_y_velocity: 2.0,
            max_z_velocity: 2.0,
            max_roll_rate: 10.0,
            max_pitch_rate: 10.0,
            max_yaw_rate: 10.0,
            max_roll: 1.0,
            max_pitch: 1.0,
        }
    }

    fn single(nominal: Transform3D) -> ObjectTracker {
        ObjectTracker::new(
            vec![bounds()],
            vec![markers()],
            vec![Object::new(0, 0, nominal).with_name("cf1")],
        )
        .unwrap()
    }

    #[test]
    fn out_of_range_marker_index_is_rejected() {
        let err = ObjectTracker::new(
            vec![bounds()],
            vec![markers()],
            vec![Object::new(3, 0, Transform3D::identity())],
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::MarkerConfigurationOutOfRange { index: 3, .. }));
    }

    #[test]
    fn out_of_range_dynamics_index_is_rejected() {
        let err = ObjectTracker::new(
            vec![bounds()],
            vec![markers()],
            vec![Object::new(0, 1, Transform3D::identity())],
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::DynamicsConfigurationOutOfRange { index: 1, .. }));
    }

    #[test]
    fn empty_marker_set_is_rejected() {
        let err = ObjectTracker::new(
            vec![bounds()],
            vec![MarkerConfiguration::new(vec![])],
            vec![Object::new(0, 0, Transform3D::identity())],
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::EmptyMarkerConfiguration(_)));
    }

    #[test]
    fn failed_bootstrap_keeps_everything_invalid() {
        let mut tracker = single(Transform3D::identity());
        let report = tracker.update(&[], Utc::now()).clone();
        assert!(!report.initialized);
        assert_eq!(report.statuses, vec![ObjectStatus::Uninitialized]);
        assert!(!tracker.is_initialized());
        assert!(!tracker.objects()[0].transformation_valid());
        assert!(tracker.objects()[0].last_valid_stamp().is_none());
    }

    #[test]
    fn bootstrap_then_track_stationary_object() {
        let truth = Transform3D::from_translation_and_euler(0.3, -0.2, 0.5, 0.0, 0.0, 1.0);
        let cloud = transform_points(&truth, markers().points());
        let mut tracker = single(Transform3D::from_translation_and_euler(0.3, -0.2, 0.5, 0.0, 0.0, 0.0));

        let t0 = Utc::now();
        let report = tracker.update(&cloud, t0);
        assert_eq!(report.statuses, vec![ObjectStatus::Bootstrapped]);
        assert!(tracker.is_initialized());
        assert_eq!(tracker.objects()[0].last_valid_stamp(), Some(t0));

        let report = tracker.update(&cloud, t0 + Duration::milliseconds(10));
        assert!(report.statuses[0].is_valid(), "{}", report.statuses[0]);
        let d = tracker.objects()[0].transformation().translation.sub(truth.translation);
        assert!(d.norm_squared() < 1e-8);
    }

    #[test]
    fn initialization_is_monotonic() {
        let cloud = markers().points().to_vec();
        let mut tracker = single(Transform3D::identity());
        let t0 = Utc::now();
        tracker.update(&cloud, t0);
        assert!(tracker.is_initialized());

        // Nothing visible, then the same timestamp again: both fail locally.
        tracker.update(&[], t0 + Duration::milliseconds(10));
        assert!(tracker.is_initialized());
        tracker.update(&cloud, t0);
        assert!(tracker.is_initialized());
        assert!(tracker.initialize(&[], t0));
    }

    #[test]
    fn empty_cloud_after_init_is_not_converged() {
        let cloud = markers().points().to_vec();
        let mut tracker = single(Transform3D::identity());
        let t0 = Utc::now();
        tracker.update(&cloud, t0);
        let report = tracker.update(&[], t0 + Duration::milliseconds(10));
        assert_eq!(report.statuses, vec![ObjectStatus::NotConverged]);
    }

    #[test]
    fn snapshots_follow_object_order() {
        let tracker = ObjectTracker::new(
            vec![bounds()],
            vec![markers()],
            vec![
                Object::new(0, 0, Transform3D::identity()).with_name("a"),
                Object::new(0, 0, Transform3D::from_translation_and_euler(1.0, 0.0, 0.0, 0.0, 0.0, 0.0))
                    .with_name("b"),
            ],
        )
        .unwrap();
        let snaps = tracker.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].name, "a");
        assert_eq!(snaps[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(snaps[0].orientation, [1.0, 0.0, 0.0, 0.0]);
        assert!(!snaps[1].valid);
    }

    #[test]
    fn last_report_is_recorded() {
        let mut tracker = single(Transform3D::identity());
        assert!(tracker.last_report().is_none());
        let t0 = Utc::now();
        tracker.update(&[], t0);
        assert_eq!(tracker.last_report().map(|r| r.stamp), Some(t0));
    }

    // ------ naming

    #[test]
    fn unnamed_objects_are_named_by_position() {
        let tracker = ObjectTracker::new(
            vec![bounds()],
            vec![markers()],
            vec![
                Object::new(0, 0, Transform3D::identity()),
                Object::new(0, 0, Transform3D::identity()).with_name("cf2"),
                Object::new(0, 0, Transform3D::identity()),
            ],
        )
        .unwrap();
        let names: Vec<&str> = tracker.objects().iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["object0", "cf2", "object2"]);
    }

    #[test]
    fn out_of_range_error_names_the_object() {
        let err = ObjectTracker::new(
            vec![bounds()],
            vec![markers()],
            vec![Object::new(0, 0, Transform3D::identity()), Object::new(2, 0, Transform3D::identity())],
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::MarkerConfigurationOutOfRange { ref object, .. } if object == "object1"));
    }

    // ------ degenerate clouds

    fn run_twice(cloud: &[Vec3]) -> ObjectTracker {
        let mut tracker = single(Transform3D::identity());
        let t0 = Utc::now();
        tracker.update(cloud, t0);
        tracker.update(cloud, t0 + Duration::milliseconds(10));
        tracker
    }

    #[test]
    fn repeated_position_does_not_break_tracking() {
        let mut cloud = markers().points().to_vec();
        cloud.extend(std::iter::repeat_n(Vec3::new(5.0, 5.0, 0.0), 40));
        let tracker = run_twice(&cloud);
        assert!(tracker.is_initialized());
        assert!(tracker.objects()[0].transformation_valid());
    }

    #[test]
    fn planar_marker_field_does_not_break_tracking() {
        let mut cloud: Vec<Vec3> = (0..100)
            .map(|i| Vec3::new((i % 10) as f32 * 0.5 + 2.0, (i / 10) as f32 * 0.5 + 2.0, 0.0))
            .collect();
        cloud.extend(markers().points());
        let tracker = run_twice(&cloud);
        assert!(tracker.is_initialized());
        assert!(tracker.objects()[0].transformation_valid());
    }

    #[test]
    fn occluded_markers_reported_as_nan_are_ignored() {
        let mut cloud = markers().points().to_vec();
        cloud.push(Vec3::new(f32::NAN, f32::NAN, f32::NAN));
        let tracker = run_twice(&cloud);
        assert!(tracker.objects()[0].transformation_valid());
    }
}
