//! Global initialization – find an object's pose without a prior estimate.
//!
//! Unlabeled correspondence with unknown orientation is a non-convex search.
//! [`locate_object`] anchors translation on the centroid of the observed
//! points nearest to the object's nominal position, then sweeps
//! [`INIT_YAW_HYPOTHESES`] evenly spaced yaw guesses about that centroid,
//! refining each with a short registration run and keeping the best fit.
//! The winner is then checked marker by marker against the cloud
//! ([`within_init_tolerance`]) to catch fits anchored on the wrong cluster.

use std::f32::consts::TAU;

use rigidtrack_perception::icp::{AlignParams, Registration};
use rigidtrack_perception::transform::{self, Transform3D, Vec3};
use tracing::debug;

use crate::config::MarkerConfiguration;
use crate::tracking::FrameCloud;

/// Yaw guesses tried per object, evenly spaced over a full turn.
pub const INIT_YAW_HYPOTHESES: usize = 20;

/// Registration iteration cap for each yaw guess.
pub const INIT_MAX_ITERATIONS: u32 = 5;

/// Largest accepted squared distance from a placed marker to its nearest
/// observed point: (8 mm)².
pub const INIT_MAX_SQUARED_DISTANCE: f32 = 0.008 * 0.008;

/// Best pose found for one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub transform: Transform3D,
    /// Registration fitness of the chosen hypothesis.
    pub fitness: f32,
    /// Index of the winning yaw hypothesis.
    pub hypothesis: usize,
    /// Largest marker-to-cloud squared distance under `transform`.
    pub worst_squared_distance: f32,
}

impl Placement {
    /// True when every placed marker lies within tolerance of the cloud.
    pub fn is_valid(&self) -> bool {
        within_init_tolerance(self.worst_squared_distance)
    }
}

/// Validation boundary: a squared distance equal to
/// [`INIT_MAX_SQUARED_DISTANCE`] passes, anything larger fails.
pub fn within_init_tolerance(squared_distance: f32) -> bool {
    squared_distance <= INIT_MAX_SQUARED_DISTANCE
}

/// Initial guess for yaw hypothesis `i` about `center`.
pub fn yaw_hypothesis(center: Vec3, i: usize) -> Transform3D {
    let yaw = i as f32 * (TAU / INIT_YAW_HYPOTHESES as f32);
    Transform3D::from_translation_and_euler(center.x, center.y, center.z, 0.0, 0.0, yaw)
}

/// Largest squared distance from each marker, placed by `pose`, to its
/// nearest observed point.  Infinite when the cloud is empty.
pub fn worst_marker_distance(
    markers: &MarkerConfiguration,
    pose: &Transform3D,
    frame: &FrameCloud<'_>,
) -> f32 {
    markers
        .points()
        .iter()
        .map(|p| {
            frame
                .index
                .nearest(pose.apply(*p))
                .map_or(f32::INFINITY, |hit| hit.squared_distance)
        })
        .fold(0.0, f32::max)
}

/// Search for `markers` in `frame`, starting from the `nominal` pose.
///
/// Returns `None` when the cloud offers nothing to anchor on.
pub fn locate_object<R: Registration + ?Sized>(
    nominal: &Transform3D,
    markers: &MarkerConfiguration,
    frame: &FrameCloud<'_>,
    engine: &R,
) -> Option<Placement> {
    // Coarse guess at which observed points belong to this object.
    let nearest = frame.index.nearest_k(nominal.translation, markers.len());
    let candidates: Vec<Vec3> = nearest
        .iter()
        .filter_map(|hit| frame.points.get(hit.index).copied())
        .collect();
    let center = transform::centroid(&candidates)?;

    let params = AlignParams::unbounded(INIT_MAX_ITERATIONS);
    let mut best: Option<(usize, Transform3D, f32)> = None;
    for i in 0..INIT_YAW_HYPOTHESES {
        let guess = yaw_hypothesis(center, i);
        let alignment = engine.align(markers.points(), frame.points, frame.index, &guess, &params);
        debug!(hypothesis = i, fitness = alignment.fitness, "yaw hypothesis");
        // Strict comparison: ties keep the earliest hypothesis.
        if best.is_none_or(|(_, _, fitness)| alignment.fitness < fitness) {
            best = Some((i, alignment.transform, alignment.fitness));
        }
    }

    let (hypothesis, transform, fitness) = best?;
    Some(Placement {
        transform,
        fitness,
        hypothesis,
        worst_squared_distance: worst_marker_distance(markers, &transform, frame),
    })
}
