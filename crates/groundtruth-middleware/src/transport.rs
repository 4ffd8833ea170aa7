//! The transport capability contract.
//!
//! A transport is the publish/subscribe channel between the sensor and its
//! consumer.  The sensor only ever asks three things of it, and none of them
//! may block: is the link up, make sure a topic is advertised, and hand a
//! batch over for delivery.

use groundtruth_types::{Detection3DArray, SensorError, TransportStatus};

/// Every outbound transport must implement this trait.
///
/// # Contract
///
/// * `status` – cheap snapshot of the connection state.
///
/// * `register_publisher` – advertise `topic` with `message_type`.
///   Idempotent: registering an already-advertised topic is `Ok(())`.
///   Must succeed before `publish` is valid for that topic.
///
/// * `publish` – best-effort, fire-and-forget send.  An `Err` means the
///   batch was not accepted; the caller must not retry it.
pub trait Transport: Send + Sync {
    fn status(&self) -> TransportStatus;

    fn register_publisher(&self, topic: &str, message_type: &str) -> Result<(), SensorError>;

    fn publish(&self, topic: &str, batch: &Detection3DArray) -> Result<(), SensorError>;

    fn is_connected(&self) -> bool {
        self.status() == TransportStatus::Connected
    }
}
