use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identity of a physical object instance in the simulation.
///
/// Two observations with the same key refer to the same object no matter
/// where it is or how it is oriented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey(pub u64);

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Consumer ecosystem the sensor publishes toward.
///
/// Only [`TargetMode::Autoware`] and [`TargetMode::Apollo`] consume ground
/// truth; every other mode disables publishing entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    #[default]
    Autoware,
    Apollo,
    Duckietown,
    Lgsvl,
}

impl TargetMode {
    /// `true` when this ecosystem accepts ground-truth detection batches.
    pub fn publishes_ground_truth(self) -> bool {
        matches!(self, TargetMode::Autoware | TargetMode::Apollo)
    }

    /// Message type advertised for the detection topic.  Every publishing
    /// mode receives the same LGSVL message.
    pub const DETECTION_ARRAY_TYPE: &'static str = "lgsvl_msgs/Detection3DArray";
}

impl std::fmt::Display for TargetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetMode::Autoware => write!(f, "autoware"),
            TargetMode::Apollo => write!(f, "apollo"),
            TargetMode::Duckietown => write!(f, "duckietown"),
            TargetMode::Lgsvl => write!(f, "lgsvl"),
        }
    }
}

impl std::str::FromStr for TargetMode {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "autoware" => Ok(TargetMode::Autoware),
            "apollo" => Ok(TargetMode::Apollo),
            "duckietown" => Ok(TargetMode::Duckietown),
            "lgsvl" => Ok(TargetMode::Lgsvl),
            other => Err(SensorError::InvalidConfig(format!(
                "unknown target mode '{other}'"
            ))),
        }
    }
}

/// Connection state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportStatus {
    Disconnected,
    Connected,
}

// ────────────────────────────────────────────────────────────────────────────
// Wire messages
// ────────────────────────────────────────────────────────────────────────────

/// Capture time split into whole seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub secs: i64,
    pub nsecs: u32,
}

impl Stamp {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            secs: at.timestamp(),
            nsecs: at.timestamp_subsec_nanos(),
        }
    }

    /// Wall-clock time right now.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Stamp,
    /// Running sequence number of the record.
    pub seq: u32,
    pub frame_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Unit quaternion as carried on the wire (x, y, z, w order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Orientation {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Orientation,
}

/// Oriented bounding box: centre pose plus size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox3D {
    pub position: Pose,
    pub size: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

/// One ground-truth detection, expressed in the sensor frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection3D {
    pub header: Header,
    /// Per-cycle object identifier, restarting at 0 after every flush.
    pub id: u32,
    pub label: String,
    pub score: f32,
    pub bbox: BoundingBox3D,
    pub velocity: Twist,
}

/// Batch of detections published once per cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection3DArray {
    pub detections: Vec<Detection3D>,
}

impl Detection3DArray {
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Error type shared by every crate in the workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorError {
    #[error("Transport not connected")]
    NotConnected,

    #[error("Topic not registered with transport: {0}")]
    UnregisteredTopic(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Transport Error: {0}")]
    Transport(String),
}
