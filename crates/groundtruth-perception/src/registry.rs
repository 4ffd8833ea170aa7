//! [`DetectionRegistry`] – per-cycle store of ground-truth detections.
//!
//! Holds at most one [`Detection3D`] per physical object between two
//! publish flushes.  Re-observing an object already present in the current
//! cycle is a no-op: the first observation wins and is never updated.

use std::collections::HashSet;

use groundtruth_types::{Detection3D, Header, ObjectKey, Stamp};
use tracing::debug;

use crate::transform::{ObjectObservation, Pose3D, to_sensor_frame};

/// Label attached to every detection unless configured otherwise.
pub const DEFAULT_LABEL: &str = "car";

/// Sensor frame name attached to every detection unless configured otherwise.
pub const DEFAULT_FRAME_ID: &str = "velodyne";

/// Whether the header sequence number restarts at every flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePolicy {
    /// One running counter for the lifetime of the sensor.
    #[default]
    Lifetime,
    /// Restart at 0 together with the object identifier.
    PerCycle,
}

/// "Object entered the sensing volume", as raised by the physics engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectEntered {
    pub key: ObjectKey,
    pub observation: ObjectObservation,
}

/// Result of a single [`DetectionRegistry::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// A new record was created with this per-cycle object id.
    Admitted(u32),
    /// The object already has a record this cycle; nothing changed.
    Duplicate,
}

/// Deduplicating store of the current cycle's detections.
///
/// # Example
///
/// ```rust
/// use groundtruth_perception::registry::{DetectionRegistry, Observation};
/// use groundtruth_perception::transform::{MotionSources, ObjectObservation, Pose3D, Vec3};
/// use groundtruth_types::{ObjectKey, Stamp};
///
/// let mut registry = DetectionRegistry::default();
/// let obs = ObjectObservation {
///     pose: Pose3D::identity(),
///     size: Vec3::new(1.0, 1.0, 1.0),
///     forward: Vec3::forward(),
///     motion: MotionSources::default(),
/// };
/// let sensor = Pose3D::identity();
///
/// assert_eq!(registry.observe(ObjectKey(7), &obs, &sensor, Stamp::default()), Observation::Admitted(0));
/// assert_eq!(registry.observe(ObjectKey(7), &obs, &sensor, Stamp::default()), Observation::Duplicate);
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug)]
pub struct DetectionRegistry {
    seen: HashSet<ObjectKey>,
    records: Vec<Detection3D>,
    next_object_id: u32,
    next_seq: u32,
    policy: SequencePolicy,
    label: String,
    frame_id: String,
}

impl Default for DetectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL, DEFAULT_FRAME_ID, SequencePolicy::default())
    }
}

impl DetectionRegistry {
    pub fn new(
        label: impl Into<String>,
        frame_id: impl Into<String>,
        policy: SequencePolicy,
    ) -> Self {
        Self {
            seen: HashSet::new(),
            records: Vec::new(),
            next_object_id: 0,
            next_seq: 0,
            policy,
            label: label.into(),
            frame_id: frame_id.into(),
        }
    }

    /// Record `observation` for `key` unless the object was already seen this
    /// cycle.
    pub fn observe(
        &mut self,
        key: ObjectKey,
        observation: &ObjectObservation,
        sensor: &Pose3D,
        captured_at: Stamp,
    ) -> Observation {
        if self.seen.contains(&key) {
            return Observation::Duplicate;
        }

        let local = to_sensor_frame(sensor, observation);
        let id = self.next_object_id;
        let seq = self.next_seq;
        self.next_object_id = self.next_object_id.wrapping_add(1);
        self.next_seq = self.next_seq.wrapping_add(1);

        self.seen.insert(key);
        self.records.push(Detection3D {
            header: Header {
                stamp: captured_at,
                seq,
                frame_id: self.frame_id.clone(),
            },
            id,
            label: self.label.clone(),
            score: 1.0,
            bbox: local.bbox,
            velocity: local.velocity,
        });
        debug!(object = %key, id, seq, "detection admitted");
        Observation::Admitted(id)
    }

    /// Every record held for the current cycle, in admission order.
    pub fn snapshot(&self) -> Vec<Detection3D> {
        self.records.clone()
    }

    /// Forget the current cycle and restart the object id counter.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.records.clear();
        self.next_object_id = 0;
        if self.policy == SequencePolicy::PerCycle {
            self.next_seq = 0;
        }
    }

    /// Take the current cycle's records and clear in one step.
    pub fn drain(&mut self) -> Vec<Detection3D> {
        let records = std::mem::take(&mut self.records);
        self.clear();
        records
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.seen.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sequence number the next admitted record will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_seq
    }

    pub fn policy(&self) -> SequencePolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{MotionSources, Vec3};

    fn obs_at(z: f32) -> ObjectObservation {
        ObjectObservation {
            pose: Pose3D::new(Vec3::new(0.0, 0.0, z), crate::transform::Quaternion::identity()),
            size: Vec3::new(2.0, 4.0, 1.5),
            forward: Vec3::forward(),
            motion: MotionSources::default(),
        }
    }

    fn observe(reg: &mut DetectionRegistry, key: u64, z: f32) -> Observation {
        reg.observe(ObjectKey(key), &obs_at(z), &Pose3D::identity(), Stamp::default())
    }

    #[test]
    fn duplicate_observation_is_noop() {
        let mut reg = DetectionRegistry::default();
        assert_eq!(observe(&mut reg, 1, 10.0), Observation::Admitted(0));
        for _ in 0..4 {
            assert_eq!(observe(&mut reg, 1, 20.0), Observation::Duplicate);
        }
        assert_eq!(reg.len(), 1);
        // First observation wins; later poses do not update it.
        let snap = reg.snapshot();
        assert!((snap[0].bbox.position.position.x - 10.0).abs() < 1e-5);
    }

    #[test]
    fn object_ids_increment_per_distinct_object() {
        let mut reg = DetectionRegistry::default();
        assert_eq!(observe(&mut reg, 10, 1.0), Observation::Admitted(0));
        assert_eq!(observe(&mut reg, 11, 2.0), Observation::Admitted(1));
        assert_eq!(observe(&mut reg, 10, 3.0), Observation::Duplicate);
        assert_eq!(observe(&mut reg, 12, 4.0), Observation::Admitted(2));
        let ids: Vec<u32> = reg.snapshot().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn records_carry_fixed_label_score_and_frame() {
        let mut reg = DetectionRegistry::default();
        observe(&mut reg, 1, 5.0);
        let d = &reg.snapshot()[0];
        assert_eq!(d.label, "car");
        assert_eq!(d.score, 1.0);
        assert_eq!(d.header.frame_id, "velodyne");
    }

    #[test]
    fn clear_resets_object_ids_and_forgets_objects() {
        let mut reg = DetectionRegistry::default();
        observe(&mut reg, 1, 5.0);
        observe(&mut reg, 2, 6.0);
        reg.clear();
        assert!(reg.is_empty());
        assert!(!reg.contains(ObjectKey(1)));
        assert_eq!(observe(&mut reg, 1, 5.0), Observation::Admitted(0));
    }

    #[test]
    fn lifetime_policy_keeps_sequence_running() {
        let mut reg = DetectionRegistry::default();
        observe(&mut reg, 1, 5.0);
        observe(&mut reg, 2, 6.0);
        let drained = reg.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(reg.next_sequence(), 2);
        observe(&mut reg, 1, 5.0);
        assert_eq!(reg.snapshot()[0].header.seq, 2);
    }

    #[test]
    fn per_cycle_policy_restarts_sequence() {
        let mut reg = DetectionRegistry::new("truck", "lidar", SequencePolicy::PerCycle);
        observe(&mut reg, 1, 5.0);
        observe(&mut reg, 2, 6.0);
        reg.drain();
        observe(&mut reg, 3, 5.0);
        let d = &reg.snapshot()[0];
        assert_eq!(d.header.seq, 0);
        assert_eq!(d.label, "truck");
        assert_eq!(d.header.frame_id, "lidar");
    }

    #[test]
    fn drain_returns_records_in_admission_order() {
        let mut reg = DetectionRegistry::default();
        observe(&mut reg, 42, 1.0);
        observe(&mut reg, 7, 2.0);
        let drained = reg.drain();
        assert_eq!(drained[0].id, 0);
        assert_eq!(drained[1].id, 1);
        assert!(reg.is_empty());
        assert!(reg.snapshot().is_empty());
    }
}
