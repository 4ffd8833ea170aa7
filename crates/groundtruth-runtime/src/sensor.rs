//! [`GroundTruthSensor`] – the detection-accumulation-and-publish pipeline.
//!
//! Owns the [`DetectionRegistry`] and the [`PublishScheduler`] and holds a
//! weak reference to whichever [`Transport`] the host hands it.  Two event
//! sources drive it:
//!
//! * **Detection events** – [`GroundTruthSensor::on_object_entered`] for every
//!   object the physics engine reports inside the sensing volume.
//! * **Engine ticks** – [`GroundTruthSensor::update`] once per engine frame
//!   with the current engine time.
//!
//! Every method takes `&self`, so the sensor can sit in an `Arc` and receive
//! detection events from a physics thread while the main loop ticks it.  The
//! registry mutex makes `observe` and the flush's drain atomic with respect
//! to each other: an event either lands in the batch being flushed or opens
//! the next cycle, never both and never neither.  The scheduler mutex is held
//! for the whole flush, so flushes never overlap.
//!
//! Connection events reach the sensor later than the transport's own status
//! flips, so every flush re-registers the topic (an idempotent call) before
//! it drains the registry.  A tick that falls due in that window still
//! publishes on an advertised topic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use groundtruth_middleware::Transport;
use groundtruth_perception::{DetectionRegistry, ObjectEntered, Observation, Pose3D};
use groundtruth_types::{Detection3D, Detection3DArray, SensorError, Stamp, TargetMode};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SensorConfig;
use crate::scheduler::{Gates, PublishScheduler, SkipReason, Tick};

/// Running counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorStats {
    pub batches_published: u64,
    pub detections_published: u64,
    pub ticks_skipped: u64,
    pub publish_failures: u64,
    /// Detection events dropped because the sensor was disabled.
    pub events_ignored: u64,
}

/// Outcome of one [`GroundTruthSensor::update`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NotDue,
    Skipped(SkipReason),
    /// The batch was handed to the transport.
    Published { detections: usize },
    /// The topic could not be registered; the registry was left untouched
    /// and its detections go out with the next eligible tick.
    RegistrationFailed(SensorError),
    /// The transport refused the batch.  The cycle is still over: its
    /// detections are gone.
    PublishFailed(SensorError),
}

/// Simulated ground-truth 3-D object detector.
pub struct GroundTruthSensor {
    config: SensorConfig,
    enabled: AtomicBool,
    pose: RwLock<Pose3D>,
    registry: Mutex<DetectionRegistry>,
    scheduler: Mutex<PublishScheduler>,
    transport: RwLock<Option<Weak<dyn Transport>>>,
    /// Topic registered on the current connection.
    registered: AtomicBool,
    stats: Mutex<SensorStats>,
}

impl std::fmt::Debug for GroundTruthSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroundTruthSensor")
            .field("config", &self.config)
            .field("enabled", &self.is_enabled())
            .field("pending", &self.pending())
            .finish()
    }
}

impl GroundTruthSensor {
    /// Build a sensor whose first publish tick is one period after `start`
    /// (engine time, seconds).
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: SensorConfig, start: f64) -> Result<Self, SensorError> {
        config.validate()?;
        let scheduler = PublishScheduler::new(config.frequency_hz, start)?;
        let registry = DetectionRegistry::new(
            config.label.clone(),
            config.frame_id.clone(),
            config.sequence_policy,
        );
        Ok(Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            pose: RwLock::new(Pose3D::identity()),
            registry: Mutex::new(registry),
            scheduler: Mutex::new(scheduler),
            transport: RwLock::new(None),
            registered: AtomicBool::new(false),
            stats: Mutex::new(SensorStats::default()),
        })
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Administrative on/off switch.
    pub fn enable(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(enabled, "ground truth sensor toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Update the sensor's world pose; call once per engine frame before
    /// delivering that frame's detection events.
    pub fn set_pose(&self, pose: Pose3D) {
        *self.pose.write() = pose;
    }

    pub fn pose(&self) -> Pose3D {
        *self.pose.read()
    }

    // -----------------------------------------------------------------------
    // Transport lifecycle
    // -----------------------------------------------------------------------

    /// Remember `transport` (weakly) and advertise the detection topic on it.
    pub fn on_transport_available(&self, transport: &Arc<dyn Transport>) {
        *self.transport.write() = Some(Arc::downgrade(transport));
        self.registered.store(false, Ordering::Release);
        self.register_topic(transport.as_ref());
    }

    /// The transport has (re)connected: advertise the topic again.
    pub fn on_transport_connected(&self) {
        self.registered.store(false, Ordering::Release);
        match self.upgrade_transport() {
            Some(transport) => self.register_topic(transport.as_ref()),
            None => debug!("transport connected but none is attached"),
        }
    }

    fn register_topic(&self, transport: &dyn Transport) {
        if !self.config.target_mode.publishes_ground_truth() {
            debug!(target = %self.config.target_mode, "target mode does not consume ground truth");
            return;
        }
        if let Err(e) = self.ensure_registered(transport) {
            warn!(topic = %self.config.topic, error = %e, "failed to register detection publisher");
        }
    }

    /// Register the detection topic on `transport`.  Safe to repeat; logs
    /// once per connection.
    fn ensure_registered(&self, transport: &dyn Transport) -> Result<(), SensorError> {
        let message_type = TargetMode::DETECTION_ARRAY_TYPE;
        transport.register_publisher(&self.config.topic, message_type)?;
        if transport.is_connected() && !self.registered.swap(true, Ordering::AcqRel) {
            info!(topic = %self.config.topic, message_type, "detection publisher registered");
        }
        Ok(())
    }

    fn upgrade_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().as_ref().and_then(Weak::upgrade)
    }

    // -----------------------------------------------------------------------
    // Detection events
    // -----------------------------------------------------------------------

    /// Handle an object-entered event, stamped with the wall clock.
    ///
    /// Returns `None` when the sensor is disabled and the event was dropped.
    pub fn on_object_entered(&self, event: &ObjectEntered) -> Option<Observation> {
        self.on_object_entered_at(event, Stamp::now())
    }

    /// Handle an object-entered event captured at `stamp`.
    pub fn on_object_entered_at(&self, event: &ObjectEntered, stamp: Stamp) -> Option<Observation> {
        if !self.is_enabled() {
            self.stats.lock().events_ignored += 1;
            return None;
        }
        let pose = self.pose();
        let outcome = self
            .registry
            .lock()
            .observe(event.key, &event.observation, &pose, stamp);
        if outcome == Observation::Duplicate {
            debug!(object = %event.key, "object already detected this cycle");
        }
        Some(outcome)
    }

    // -----------------------------------------------------------------------
    // Publish cycle
    // -----------------------------------------------------------------------

    /// Advance the publish schedule to engine time `now`, flushing if a tick
    /// is due and every gate is open.
    pub fn update(&self, now: f64) -> TickOutcome {
        let mut scheduler = self.scheduler.lock();

        match scheduler.poll(now, || self.open_transport()) {
            Tick::NotDue => TickOutcome::NotDue,
            Tick::Skipped(reason) => {
                self.stats.lock().ticks_skipped += 1;
                debug!(?reason, now, "publish tick skipped");
                TickOutcome::Skipped(reason)
            }
            Tick::Due(transport) => self.flush(transport.as_ref()),
        }
    }

    /// Evaluate every publish gate; on success hand back the live transport.
    fn open_transport(&self) -> Result<Arc<dyn Transport>, SkipReason> {
        let transport = self.upgrade_transport();
        let connected = transport.as_ref().is_some_and(|t| t.is_connected());
        if !connected {
            self.registered.store(false, Ordering::Release);
        }
        Gates {
            enabled: self.is_enabled(),
            target_supported: self.config.target_mode.publishes_ground_truth(),
            transport_present: transport.is_some(),
            connected,
        }
        .check()?;
        transport.ok_or(SkipReason::NoTransport)
    }

    fn flush(&self, transport: &dyn Transport) -> TickOutcome {
        if let Err(e) = self.ensure_registered(transport) {
            self.stats.lock().publish_failures += 1;
            warn!(topic = %self.config.topic, error = %e, pending = self.pending(), "detection topic not registered, flush deferred");
            return TickOutcome::RegistrationFailed(e);
        }

        let batch = Detection3DArray {
            detections: self.registry.lock().drain(),
        };
        let count = batch.len();

        match transport.publish(&self.config.topic, &batch) {
            Ok(()) => {
                let mut stats = self.stats.lock();
                stats.batches_published += 1;
                stats.detections_published += count as u64;
                debug!(topic = %self.config.topic, detections = count, "ground truth published");
                TickOutcome::Published { detections: count }
            }
            Err(e) => {
                self.stats.lock().publish_failures += 1;
                warn!(topic = %self.config.topic, detections = count, error = %e, "ground truth publish failed");
                TickOutcome::PublishFailed(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of detections waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.registry.lock().len()
    }

    /// Copy of the detections waiting for the next flush.
    pub fn snapshot(&self) -> Vec<Detection3D> {
        self.registry.lock().snapshot()
    }

    pub fn stats(&self) -> SensorStats {
        *self.stats.lock()
    }
}
