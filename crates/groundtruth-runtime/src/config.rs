//! Static configuration of a ground-truth sensor.

use groundtruth_perception::SequencePolicy;
use groundtruth_perception::registry::{DEFAULT_FRAME_ID, DEFAULT_LABEL};
use groundtruth_types::{SensorError, TargetMode};
use serde::{Deserialize, Serialize};

/// Topic the detection batches are published on unless configured otherwise.
pub const DEFAULT_TOPIC: &str = "/simulator/ground_truth/objects_3d";

/// Sensor settings, normally read from the `[sensor]` table of the config
/// file.  Every field has a default, so an empty table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Consumer ecosystem; only Autoware and Apollo receive ground truth.
    #[serde(default)]
    pub target_mode: TargetMode,

    #[serde(default = "default_topic")]
    pub topic: String,

    /// Publish rate in Hz.
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,

    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    #[serde(default = "default_label")]
    pub label: String,

    #[serde(default)]
    pub sequence_policy: SequencePolicy,

    /// Initial value of the administrative enable flag.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
fn default_frequency_hz() -> f64 {
    10.0
}
fn default_frame_id() -> String {
    DEFAULT_FRAME_ID.to_string()
}
fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}
fn default_enabled() -> bool {
    true
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            target_mode: TargetMode::default(),
            topic: default_topic(),
            frequency_hz: default_frequency_hz(),
            frame_id: default_frame_id(),
            label: default_label(),
            sequence_policy: SequencePolicy::default(),
            enabled: default_enabled(),
        }
    }
}

impl SensorConfig {
    /// Reject settings the sensor cannot run with.
    pub fn validate(&self) -> Result<(), SensorError> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(SensorError::InvalidConfig(format!(
                "frequency_hz must be > 0, got {}",
                self.frequency_hz
            )));
        }
        if self.topic.trim().is_empty() {
            return Err(SensorError::InvalidConfig("topic must not be empty".to_string()));
        }
        if self.frame_id.trim().is_empty() {
            return Err(SensorError::InvalidConfig("frame_id must not be empty".to_string()));
        }
        Ok(())
    }
}
