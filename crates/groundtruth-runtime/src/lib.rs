//! `groundtruth-runtime` – the ground-truth sensor itself.
//!
//! Wires the perception pieces to a transport and drives them from the
//! engine's frame loop.
//!
//! # Modules
//!
//! - [`sensor`] – [`GroundTruthSensor`][sensor::GroundTruthSensor]: receives
//!   detection events, accumulates them for one publish cycle and hands each
//!   batch to the attached [`Transport`][groundtruth_middleware::Transport].
//! - [`scheduler`] – [`PublishScheduler`][scheduler::PublishScheduler]: the
//!   fixed-rate tick source and the publish gates it evaluates.
//! - [`config`] – [`SensorConfig`][config::SensorConfig]: target mode, topic,
//!   rate and naming settings.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod config;
pub mod scheduler;
pub mod sensor;
pub mod telemetry;

pub use config::{DEFAULT_TOPIC, SensorConfig};
pub use scheduler::{Gates, PublishScheduler, SkipReason, Tick};
pub use sensor::{GroundTruthSensor, SensorStats, TickOutcome};
pub use telemetry::{TracerProviderGuard, init_tracing};
