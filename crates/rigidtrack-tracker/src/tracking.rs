//! Per-frame local tracking of a single object.
//!
//! [`track_object`] is a pure function of one object's previous state and the
//! shared, read-only frame data.  It never touches other objects, so a
//! failure is always local to one object and one frame.

use chrono::{DateTime, Utc};
use rigidtrack_perception::icp::{AlignParams, Registration};
use rigidtrack_perception::neighbors::NearestNeighbors;
use rigidtrack_perception::transform::Vec3;
use rigidtrack_types::ObjectStatus;
use tracing::{debug, warn};

use crate::config::{DynamicsConfiguration, MarkerConfiguration};
use crate::dynamics::{self, MotionEstimate};
use crate::object::Object;

/// Registration iteration cap for a tracking update.
pub const TRACK_MAX_ITERATIONS: u32 = 5;

/// One frame's observed point cloud together with its nearest-neighbour
/// index.  Shared read-only by every object update in the frame.
#[derive(Clone, Copy)]
pub struct FrameCloud<'a> {
    pub points: &'a [Vec3],
    pub index: &'a dyn NearestNeighbors,
}

impl<'a> FrameCloud<'a> {
    pub fn new(points: &'a [Vec3], index: &'a dyn NearestNeighbors) -> Self {
        Self { points, index }
    }
}

impl std::fmt::Debug for FrameCloud<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCloud")
            .field("points", &self.points.len())
            .finish()
    }
}

/// Correspondence search radius: the distance the object could have
/// travelled at its maximum x-velocity in `dt` seconds.
pub fn correspondence_radius(dynamics: &DynamicsConfiguration, dt: f64) -> f32 {
    dynamics.max_x_velocity * dt as f32
}

/// Advance one object by one frame.
///
/// Returns the object's next state and what happened.  On any failure the
/// returned object keeps its previous `transformation` and
/// `last_valid_stamp` bit for bit and is marked invalid.
pub fn track_object<R: Registration + ?Sized>(
    object: &Object,
    markers: &MarkerConfiguration,
    dynamics: &DynamicsConfiguration,
    frame: &FrameCloud<'_>,
    engine: &R,
    now: DateTime<Utc>,
) -> (Object, ObjectStatus) {
    let mut next = object.clone();
    next.transformation_valid = false;

    let dt = object.elapsed_since_valid(now);
    if !(dt.is_finite() && dt > 0.0) {
        warn!(object = %object.name, dt, "non-positive time step since last valid pose");
        return (next, ObjectStatus::InvalidTimeStep { dt: dt.is_finite().then_some(dt) });
    }

    let params = AlignParams::new(TRACK_MAX_ITERATIONS, correspondence_radius(dynamics, dt));
    let alignment = engine.align(
        markers.points(),
        frame.points,
        frame.index,
        &object.transformation,
        &params,
    );
    if !alignment.converged {
        warn!(object = %object.name, radius = params.max_correspondence_distance, "registration did not converge");
        return (next, ObjectStatus::NotConverged);
    }

    let motion = MotionEstimate::between(&object.transformation, &alignment.transform, dt as f32);
    debug!(object = %object.name, dt, ?motion, "motion estimate");

    match dynamics::check(&motion, dynamics) {
        Ok(()) => {
            next.transformation = alignment.transform;
            next.last_valid_stamp = Some(now);
            next.transformation_valid = true;
            (
                next,
                ObjectStatus::Accepted {
                    velocity: motion.velocity(),
                    angular_rate: motion.angular_rate(),
                },
            )
        }
        Err(violations) => {
            let summary = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            warn!(object = %object.name, violations = %summary, "dynamic check failed");
            (next, ObjectStatus::DynamicsViolation(violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rigidtrack_perception::icp::PointToPointIcp;
    use rigidtrack_perception::neighbors::KdIndex;
    use rigidtrack_perception::transform::{Transform3D, transform_points};
    use rigidtrack_types::DynamicsBound;

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
            max_roll_rate: 20.0,
            max_pitch_rate: 20.0,
            max_yaw_rate: 20.0,
            max_roll: 1.0,
            max_pitch: 1.0,
        }
    }

    fn tracked_at(pose: Transform3D, stamp: DateTime<Utc>) -> Object {
        let mut o = Object::new(0, 0, pose).with_name("cf1");
        o.last_valid_stamp = Some(stamp);
        o.transformation_valid = true;
        o
    }

    #[test]
    fn radius_scales_with_dt() {
        assert!((correspondence_radius(&bounds(), 0.01) - 0.02).abs() < 1e-7);
        assert!((correspondence_radius(&bounds(), 0.1) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn small_motion_is_accepted_and_committed() {
        let t0 = Utc::now();
        let start = Transform3D::from_translation_and_euler(0.5, 0.5, 1.0, 0.0, 0.0, 0.3);
        let moved = Transform3D::from_translation_and_euler(0.51, 0.5, 1.0, 0.0, 0.0, 0.32);
        let cloud = transform_points(&moved, markers().points());
        let index = KdIndex::build(&cloud);
        let frame = FrameCloud::new(&cloud, &index);
        let now = t0 + Duration::milliseconds(10);

        let (next, status) = track_object(
            &tracked_at(start, t0),
            &markers(),
            &bounds(),
            &frame,
            &PointToPointIcp::default(),
            now,
        );
        assert!(status.is_valid(), "{status}");
        assert!(next.transformation_valid());
        assert_eq!(next.last_valid_stamp(), Some(now));
        assert!((next.transformation().translation.x - 0.51).abs() < 1e-4);
        match status {
            ObjectStatus::Accepted { velocity, .. } => assert!((velocity[0] - 1.0).abs() < 0.05),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn out_of_radius_motion_does_not_converge() {
        let t0 = Utc::now();
        let start = Transform3D::identity();
        let moved = Transform3D::from_translation_and_euler(1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let cloud = transform_points(&moved, markers().points());
        let index = KdIndex::build(&cloud);
        let frame = FrameCloud::new(&cloud, &index);
        let before = tracked_at(start, t0);

        let (next, status) = track_object(
            &before,
            &markers(),
            &bounds(),
            &frame,
            &PointToPointIcp::default(),
            t0 + Duration::milliseconds(10),
        );
        assert_eq!(status, ObjectStatus::NotConverged);
        assert!(!next.transformation_valid());
        assert_eq!(next.transformation(), before.transformation());
        assert_eq!(next.last_valid_stamp(), before.last_valid_stamp());
    }

    #[test]
    fn zero_dt_is_an_explicit_guard() {
        let t0 = Utc::now();
        let cloud = markers().points().to_vec();
        let index = KdIndex::build(&cloud);
        let frame = FrameCloud::new(&cloud, &index);
        let before = tracked_at(Transform3D::identity(), t0);

        let (next, status) =
            track_object(&before, &markers(), &bounds(), &frame, &PointToPointIcp::default(), t0);
        assert_eq!(status, ObjectStatus::InvalidTimeStep { dt: Some(0.0) });
        assert!(!next.transformation_valid());
        assert_eq!(next.transformation(), before.transformation());
    }

    #[test]
    fn out_of_order_stamp_is_rejected() {
        let t0 = Utc::now();
        let cloud = markers().points().to_vec();
        let index = KdIndex::build(&cloud);
        let frame = FrameCloud::new(&cloud, &index);
        let before = tracked_at(Transform3D::identity(), t0);

        let (_, status) = track_object(
            &before,
            &markers(),
            &bounds(),
            &frame,
            &PointToPointIcp::default(),
            t0 - Duration::milliseconds(20),
        );
        assert!(matches!(status, ObjectStatus::InvalidTimeStep { dt: Some(dt) } if dt < 0.0));
    }

    #[test]
    fn unstamped_object_reports_unknown_time_step() {
        let cloud = markers().points().to_vec();
        let index = KdIndex::build(&cloud);
        let frame = FrameCloud::new(&cloud, &index);
        let unstamped = Object::new(0, 0, Transform3D::identity());

        let (next, status) = track_object(
            &unstamped,
            &markers(),
            &bounds(),
            &frame,
            &PointToPointIcp::default(),
            Utc::now(),
        );
        assert_eq!(status, ObjectStatus::InvalidTimeStep { dt: None });
        assert!(!next.transformation_valid());
    }

    #[test]
    fn excessive_attitude_is_rejected() {
        let t0 = Utc::now();
        // Rolled past the 1 rad limit but barely moved, so registration
        // converges and only the attitude bound trips.
        let start = Transform3D::from_translation_and_euler(0.0, 0.0, 0.0, 1.05, 0.0, 0.0);
        let cloud = transform_points(&start, markers().points());
        let index = KdIndex::build(&cloud);
        let frame = FrameCloud::new(&cloud, &index);
        let before = tracked_at(start, t0);

        let (next, status) = track_object(
            &before,
            &markers(),
            &bounds(),
            &frame,
            &PointToPointIcp::default(),
            t0 + Duration::milliseconds(10),
        );
        match status {
            ObjectStatus::DynamicsViolation(v) => {
                assert!(v.iter().any(|x| x.bound == DynamicsBound::Roll));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(next.transformation(), before.transformation());
        assert!(!next.transformation_valid());
    }
}
