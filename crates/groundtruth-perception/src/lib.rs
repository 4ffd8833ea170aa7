//! `groundtruth-perception` – the sensing half of the ground-truth sensor.
//!
//! Turns exact object state from the physics engine into detections
//! expressed in the sensor's own frame.
//!
//! # Modules
//!
//! - [`transform`] – [`to_sensor_frame`][transform::to_sensor_frame]: the
//!   stateless Frame Transformer, plus the small vector/quaternion toolkit it
//!   is built on.
//! - [`registry`] – [`DetectionRegistry`][registry::DetectionRegistry]:
//!   deduplicating per-cycle store of detections, owning the object id and
//!   sequence counters.

pub mod registry;
pub mod transform;

pub use registry::{DetectionRegistry, Observation, ObjectEntered, SequencePolicy};
pub use transform::{
    LocalState, MotionSources, ObjectObservation, Pose3D, Quaternion, RigidBodyMotion, Vec3,
    to_sensor_frame,
};
