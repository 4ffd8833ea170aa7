//! In-process transport built on topic-keyed broadcast channels.
//!
//! [`BusTransport`] stands in for a real bridge inside a single process: the
//! sensor publishes to it exactly as it would to a remote consumer, and any
//! number of local subscribers receive every batch.  The connection status is
//! set by the owner, which makes the bus the natural test double for the
//! sensor's gating logic.
//!
//! Topics must be advertised with [`Transport::register_publisher`] before
//! they can be published to or subscribed to.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use groundtruth_types::{Detection3DArray, SensorError, TransportStatus};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::transport::Transport;

/// Default channel capacity (number of buffered batches before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 64;

struct TopicChannel {
    message_type: String,
    sender: broadcast::Sender<Arc<Detection3DArray>>,
}

struct BusInner {
    capacity: usize,
    connected: AtomicBool,
    published: AtomicU64,
    topics: Mutex<HashMap<String, TopicChannel>>,
    status_tx: broadcast::Sender<TransportStatus>,
}

/// Shared in-process transport. Clone it cheaply – all clones share the same
/// topics and connection flag.
#[derive(Clone)]
pub struct BusTransport {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for BusTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusTransport")
            .field("connected", &self.inner.connected.load(Ordering::Acquire))
            .field("topics", &self.inner.topics.lock().len())
            .finish()
    }
}

impl BusTransport {
    /// Create a disconnected bus with the given per-topic channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (status_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(BusInner {
                capacity: capacity.max(1),
                connected: AtomicBool::new(false),
                published: AtomicU64::new(0),
                topics: Mutex::new(HashMap::new()),
                status_tx,
            }),
        }
    }

    /// Create a bus that reports itself connected from the start.
    pub fn connected() -> Self {
        let bus = Self::default();
        bus.set_status(TransportStatus::Connected);
        bus
    }

    /// Change the reported connection status.
    ///
    /// Emits a status event on [`BusTransport::status_events`] only when the
    /// status actually changes.
    pub fn set_status(&self, status: TransportStatus) {
        let connected = status == TransportStatus::Connected;
        let previous = self.inner.connected.swap(connected, Ordering::AcqRel);
        if previous != connected {
            info!(?status, "bus transport status changed");
            // No listeners is fine.
            let _ = self.inner.status_tx.send(status);
        }
    }

    /// Stream of connection status transitions.
    pub fn status_events(&self) -> broadcast::Receiver<TransportStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Subscribe to every batch published on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::UnregisteredTopic`] if nobody has advertised
    /// the topic yet.
    pub fn subscribe(&self, topic: &str) -> Result<TopicReceiver, SensorError> {
        let topics = self.inner.topics.lock();
        let channel = topics
            .get(topic)
            .ok_or_else(|| SensorError::UnregisteredTopic(topic.to_string()))?;
        Ok(TopicReceiver {
            topic: topic.to_string(),
            receiver: channel.sender.subscribe(),
        })
    }

    /// Whether `topic` has been advertised.
    pub fn is_registered(&self, topic: &str) -> bool {
        self.inner.topics.lock().contains_key(topic)
    }

    /// Number of batches accepted by [`Transport::publish`] so far.
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Acquire)
    }
}

impl Default for BusTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Transport for BusTransport {
    fn status(&self) -> TransportStatus {
        if self.inner.connected.load(Ordering::Acquire) {
            TransportStatus::Connected
        } else {
            TransportStatus::Disconnected
        }
    }

    fn register_publisher(&self, topic: &str, message_type: &str) -> Result<(), SensorError> {
        let mut topics = self.inner.topics.lock();
        if let Some(existing) = topics.get(topic) {
            if existing.message_type != message_type {
                return Err(SensorError::Transport(format!(
                    "topic {topic} already advertised as {}",
                    existing.message_type
                )));
            }
            return Ok(());
        }
        let (sender, _) = broadcast::channel(self.inner.capacity);
        topics.insert(
            topic.to_string(),
            TopicChannel {
                message_type: message_type.to_string(),
                sender,
            },
        );
        debug!(topic, message_type, "bus topic advertised");
        Ok(())
    }

    fn publish(&self, topic: &str, batch: &Detection3DArray) -> Result<(), SensorError> {
        if !self.is_connected() {
            return Err(SensorError::NotConnected);
        }
        let topics = self.inner.topics.lock();
        let channel = topics
            .get(topic)
            .ok_or_else(|| SensorError::UnregisteredTopic(topic.to_string()))?;
        // Zero subscribers is a normal condition, not an error.
        let receivers = channel.sender.send(Arc::new(batch.clone())).unwrap_or(0);
        self.inner.published.fetch_add(1, Ordering::AcqRel);
        debug!(topic, detections = batch.len(), receivers, "batch published on bus");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Topic receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single bus topic.
///
/// Obtained via [`BusTransport::subscribe`].
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Arc<Detection3DArray>>,
}

impl TopicReceiver {
    /// Wait for the next batch on this topic.
    ///
    /// Lagging is logged and skipped over; returns `None` once the bus has
    /// been dropped.
    pub async fn recv(&mut self) -> Option<Arc<Detection3DArray>> {
        loop {
            match self.receiver.recv().await {
                Ok(batch) => return Some(batch),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "bus subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` when nothing is waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Detection3DArray>> {
        loop {
            match self.receiver.try_recv() {
                Ok(batch) => return Some(batch),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}
