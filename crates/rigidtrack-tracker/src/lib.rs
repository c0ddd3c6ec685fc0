//! `rigidtrack-tracker` – multi-object rigid-body tracking from unlabeled
//! marker point clouds.
//!
//! The tracker takes one unordered 3-D point cloud per frame and keeps a
//! pose estimate for each known rigid body, rejecting estimates that imply
//! physically impossible motion rather than passing them downstream.
//!
//! # Modules
//!
//! - [`config`] – [`MarkerConfiguration`] and [`DynamicsConfiguration`]:
//!   immutable per-type templates and motion bounds, referenced by index.
//! - [`object`] – [`Object`]: mutable per-instance state (pose, validity,
//!   last accepted timestamp).
//! - [`bootstrap`] – global initialization: nearest-neighbour anchoring, a
//!   20-way yaw sweep and an 8 mm marker-distance validation.
//! - [`tracking`] – the pure per-object update: warm-started registration
//!   with a velocity-bounded correspondence radius.
//! - [`dynamics`] – finite-difference motion estimate and the strict
//!   plausibility gate.
//! - [`tracker`] – [`ObjectTracker`]: owns everything and drives frames.

pub mod bootstrap;
pub mod config;
pub mod dynamics;
pub mod object;
pub mod tracker;
pub mod tracking;

pub use config::{DynamicsConfiguration, MarkerConfiguration};
pub use dynamics::MotionEstimate;
pub use object::Object;
pub use tracker::ObjectTracker;
pub use tracking::{FrameCloud, track_object};
