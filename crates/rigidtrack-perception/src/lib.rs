//! `rigidtrack-perception` – geometry primitives for marker-based tracking.
//!
//! # Modules
//!
//! - [`transform`] – [`Transform3D`][transform::Transform3D]: rigid-body pose
//!   (translation + unit quaternion) with roll/pitch/yaw decomposition.
//! - [`neighbors`] – [`KdIndex`][neighbors::KdIndex]: k-d tree answering
//!   k-nearest-neighbour queries against an observed point cloud.
//! - [`icp`] – [`PointToPointIcp`][icp::PointToPointIcp]: registration engine
//!   aligning a marker template to an unlabeled point cloud.

pub mod icp;
pub mod neighbors;
pub mod transform;

pub use icp::{AlignParams, Alignment, IcpConfig, PointToPointIcp, Registration};
pub use neighbors::{KdIndex, NearestNeighbors, Neighbor};
pub use transform::{EulerAngles, Quaternion, Transform3D, Vec3};
