//! Point-to-point Iterative Closest Point registration.
//!
//! Aligns a small source set (an object's marker template) to a larger,
//! unlabeled target set (the observed point cloud):
//!
//! ```text
//! Input: source S, target T, initial guess X₀
//! Output: X* such that X*(S) ⊂≈ T
//!
//! for each iteration:
//!   a. pair every X(sᵢ) with its nearest tⱼ, drop pairs beyond the bound
//!   b. fewer than `min_correspondences` pairs → not converged
//!   c. solve the rigid increment ΔX by SVD (Kabsch)
//!   d. X ← ΔX ∘ X; stop when ΔX is below both epsilons
//! ```
//!
//! Running out of iterations still counts as converged unless
//! [`IcpConfig::fail_after_max_iterations`] is set: the tracker caps ICP at a
//! handful of iterations and treats the result as a refinement, not a proof.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use tracing::trace;

use crate::neighbors::NearestNeighbors;
use crate::transform::{Quaternion, Transform3D, Vec3};

// ────────────────────────────────────────────────────────────────────────────
// Contract
// ────────────────────────────────────────────────────────────────────────────

/// Per-call limits for one alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignParams {
    /// Hard cap on ICP iterations.
    pub max_iterations: u32,
    /// Source/target pairs farther apart than this are ignored (metres).
    pub max_correspondence_distance: f32,
}

impl AlignParams {
    pub fn new(max_iterations: u32, max_correspondence_distance: f32) -> Self {
        Self {
            max_iterations,
            max_correspondence_distance,
        }
    }

    /// No correspondence distance bound.
    pub fn unbounded(max_iterations: u32) -> Self {
        Self::new(max_iterations, f32::INFINITY)
    }
}

/// Outcome of [`Registration::align`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// Final estimate mapping source points onto the target.
    pub transform: Transform3D,
    pub converged: bool,
    /// Mean squared distance from each transformed source point to its
    /// nearest target point.  Lower is better.
    pub fitness: f32,
    pub iterations: u32,
    /// Number of pairs used in the last iteration.
    pub correspondences: usize,
}

/// A point-set registration engine.
///
/// Implementations hold only immutable configuration, so a single engine may
/// serve every object of a frame.
pub trait Registration {
    fn align(
        &self,
        source: &[Vec3],
        target: &[Vec3],
        target_index: &dyn NearestNeighbors,
        initial_guess: &Transform3D,
        params: &AlignParams,
    ) -> Alignment;
}

impl<R: Registration + ?Sized> Registration for &R {
    fn align(
        &self,
        source: &[Vec3],
        target: &[Vec3],
        target_index: &dyn NearestNeighbors,
        initial_guess: &Transform3D,
        params: &AlignParams,
    ) -> Alignment {
        (**self).align(source, target, target_index, initial_guess, params)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PointToPointIcp
// ────────────────────────────────────────────────────────────────────────────

/// Configuration for [`PointToPointIcp`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcpConfig {
    /// Minimum number of pairs needed to solve an increment.
    pub min_correspondences: usize,
    /// Convergence threshold on the increment's translation (metres).
    pub transformation_epsilon: f32,
    /// Convergence threshold on the increment's rotation angle (radians).
    pub rotation_epsilon: f32,
    /// Report non-convergence when the iteration cap is reached.
    pub fail_after_max_iterations: bool,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            min_correspondences: 3,
            transformation_epsilon: 1e-6,
            rotation_epsilon: 1e-6,
            fail_after_max_iterations: false,
        }
    }
}

/// Classic SVD-based point-to-point ICP.
#[derive(Debug, Clone, Default)]
pub struct PointToPointIcp {
    config: IcpConfig,
}

impl PointToPointIcp {
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Pair every transformed source point with its nearest target point.
    fn find_correspondences(
        &self,
        source: &[Vec3],
        target: &[Vec3],
        target_index: &dyn NearestNeighbors,
        transform: &Transform3D,
        max_dist_sq: f32,
    ) -> Vec<(Vec3, Vec3)> {
        let mut pairs = Vec::with_capacity(source.len());
        for p in source {
            let moved = transform.apply(*p);
            if let Some(hit) = target_index.nearest(moved)
                && hit.squared_distance <= max_dist_sq
                && let Some(t) = target.get(hit.index)
            {
                pairs.push((moved, *t));
            }
        }
        pairs
    }
}

impl Registration for PointToPointIcp {
    fn align(
        &self,
        source: &[Vec3],
        target: &[Vec3],
        target_index: &dyn NearestNeighbors,
        initial_guess: &Transform3D,
        params: &AlignParams,
    ) -> Alignment {
        let max_dist = params.max_correspondence_distance;
        let max_dist_sq = if max_dist.is_finite() {
            max_dist * max_dist
        } else {
            f32::INFINITY
        };

        let mut current = *initial_guess;
        let mut iterations = 0;
        let mut correspondences = 0;
        // None while iterating; Some(result) once a stop condition fires.
        let mut outcome: Option<bool> = None;

        if source.is_empty() || target_index.is_empty() {
            outcome = Some(false);
        }

        while outcome.is_none() && iterations < params.max_iterations {
            iterations += 1;

            let pairs =
                self.find_correspondences(source, target, target_index, &current, max_dist_sq);
            correspondences = pairs.len();
            if pairs.len() < self.config.min_correspondences {
                outcome = Some(false);
                break;
            }

            let Some(delta) = best_rigid_increment(&pairs) else {
                outcome = Some(false);
                break;
            };
            current = delta.compose(current);

            let step = delta.translation.norm_squared().sqrt();
            let turn = rotation_angle(delta.rotation);
            trace!(iteration = iterations, step, turn, pairs = pairs.len(), "icp increment");
            if step < self.config.transformation_epsilon && turn < self.config.rotation_epsilon {
                outcome = Some(true);
            }
        }

        let converged = outcome.unwrap_or(!self.config.fail_after_max_iterations);

        Alignment {
            transform: current,
            converged,
            fitness: fitness_score(source, target_index, &current),
            iterations,
            correspondences,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Mean squared nearest-neighbour distance of `source` mapped by `transform`.
///
/// Returns `f32::MAX` when either side is empty.
pub fn fitness_score(
    source: &[Vec3],
    target_index: &dyn NearestNeighbors,
    transform: &Transform3D,
) -> f32 {
    if source.is_empty() || target_index.is_empty() {
        return f32::MAX;
    }
    let mut sum = 0.0f64;
    let mut n = 0usize;
    for p in source {
        if let Some(hit) = target_index.nearest(transform.apply(*p)) {
            sum += hit.squared_distance as f64;
            n += 1;
        }
    }
    if n == 0 {
        return f32::MAX;
    }
    (sum / n as f64) as f32
}

/// Rotation angle of a unit quaternion, in `[0, π]`.
fn rotation_angle(q: Quaternion) -> f32 {
    let v = (q.x * q.x + q.y * q.y + q.z * q.z).sqrt();
    2.0 * v.atan2(q.w.abs())
}

fn to_vector(p: Vec3) -> Vector3<f64> {
    Vector3::new(p.x as f64, p.y as f64, p.z as f64)
}

/// Least-squares rigid transform taking the first element of each pair onto
/// the second (Kabsch, reflection-corrected).
fn best_rigid_increment(pairs: &[(Vec3, Vec3)]) -> Option<Transform3D> {
    if pairs.is_empty() {
        return None;
    }
    let n = pairs.len() as f64;
    let cs: Vector3<f64> = pairs.iter().map(|(s, _)| to_vector(*s)).sum::<Vector3<f64>>() / n;
    let ct: Vector3<f64> = pairs.iter().map(|(_, t)| to_vector(*t)).sum::<Vector3<f64>>() / n;

    let mut h = Matrix3::<f64>::zeros();
    for (s, t) in pairs {
        h += (to_vector(*s) - cs) * (to_vector(*t) - ct).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let mut v = svd.v_t?.transpose();
    let mut r = v * u.transpose();
    if r.determinant() < 0.0 {
        let (weakest, _) = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        let mut axis = v.column_mut(weakest);
        axis *= -1.0;
        r = v * u.transpose();
    }
    let t = ct - r * cs;

    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let c = q.into_inner().coords;
    let rotation = Quaternion::new(c[3] as f32, c[0] as f32, c[1] as f32, c[2] as f32).normalize();
    Some(Transform3D::new(
        Vec3::new(t.x as f32, t.y as f32, t.z as f32),
        rotation,
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
