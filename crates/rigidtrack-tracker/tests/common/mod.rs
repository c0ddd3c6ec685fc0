#![allow(dead_code)]

use std::cell::Cell;

use rigidtrack_perception::icp::{AlignParams, Alignment, PointToPointIcp, Registration};
use rigidtrack_perception::neighbors::NearestNeighbors;
use rigidtrack_perception::transform::{Transform3D, Vec3};
use rigidtrack_tracker::{DynamicsConfiguration, MarkerConfiguration};

pub fn unit_square() -> MarkerConfiguration {
    MarkerConfiguration::new(vec![
        Vec3::new(0.1, 0.1, 0.0),
        Vec3::new(-0.1, 0.1, 0.0),
        Vec3::new(-0.1, -0.1, 0.0),
        Vec3::new(0.1, -0.1, 0.0),
    ])
}

pub fn triangle() -> MarkerConfiguration {
    MarkerConfiguration::new(vec![
        Vec3::new(0.06, 0.0, 0.0),
        Vec3::new(-0.03, 0.05, 0.0),
        Vec3::new(-0.03, -0.04, 0.02),
    ])
}

pub fn bounds(max_velocity: f32) -> DynamicsConfiguration {
    DynamicsConfiguration {
        max_x_velocity: max_velocity,
        max_y_velocity: max_velocity,
        max_z_velocity: max_velocity,
        max_roll_rate: 10.0,
        max_pitch_rate: 10.0,
        max_yaw_rate: 10.0,
        max_roll: 1.0,
        max_pitch: 1.0,
    }
}

/// Registration double.
///
/// Runs real ICP unless an alignment has been forced, and can be told to
/// fail every bounded (tracking) call for sources of a given size.
#[derive(Default)]
pub struct Scripted {
    icp: PointToPointIcp,
    forced: Cell<Option<Alignment>>,
    fail_tracking_for_len: Cell<Option<usize>>,
}

impl Scripted {
    pub fn force(&self, alignment: Option<Alignment>) {
        self.forced.set(alignment);
    }

    pub fn force_transform(&self, transform: Transform3D) {
        self.force(Some(Alignment {
            transform,
            converged: true,
            fitness: 0.0,
            iterations: 1,
            correspondences: 4,
        }));
    }

    pub fn fail_tracking_for(&self, source_len: usize) {
        self.fail_tracking_for_len.set(Some(source_len));
    }
}

impl Registration for Scripted {
    fn align(
        &self,
        source: &[Vec3],
        target: &[Vec3],
        target_index: &dyn NearestNeighbors,
        initial_guess: &Transform3D,
        params: &AlignParams,
    ) -> Alignment {
        if params.max_correspondence_distance.is_finite()
            && self.fail_tracking_for_len.get() == Some(source.len())
        {
            return Alignment {
                transform: *initial_guess,
                converged: false,
                fitness: f32::MAX,
                iterations: 0,
                correspondences: 0,
            };
        }
        if let Some(forced) = self.forced.get() {
            return forced;
        }
        self.icp.align(source, target, target_index, initial_guess, params)
    }
}
