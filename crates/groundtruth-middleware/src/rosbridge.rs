//! rosbridge v2 WebSocket transport.
//!
//! [`RosbridgeTransport`] is the synchronous handle the sensor talks to;
//! [`RosbridgeLink`] is the async task that owns the socket.  The two are
//! joined by an unbounded queue of pre-encoded JSON operations, so
//! `register_publisher` and `publish` never wait on the network.
//!
//! The link connects to a `rosbridge_server`, reports every connection
//! change on [`RosbridgeTransport::status_events`], and reconnects after a
//! fixed delay when the socket drops.  Topics have to be advertised again on
//! every new connection; the sensor does this when it sees `Connected`.
//!
//! Operations on the wire:
//!
//! ```json
//! {"op":"advertise","id":"advertise:/objects:…","topic":"/objects","type":"lgsvl_msgs/Detection3DArray"}
//! {"op":"publish","topic":"/objects","msg":{"detections":[…]}}
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use groundtruth_types::{Detection3DArray, SensorError, TransportStatus};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::Transport;

/// Delay between reconnection attempts unless configured otherwise.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

struct Advertisement {
    message_type: String,
    /// Advertised on the current connection.
    live: bool,
}

struct Shared {
    connected: AtomicBool,
    topics: Mutex<HashMap<String, Advertisement>>,
    status_tx: broadcast::Sender<TransportStatus>,
}

impl Shared {
    fn set_connected(&self, up: bool) {
        if !up {
            for ad in self.topics.lock().values_mut() {
                ad.live = false;
            }
        }
        let previous = self.connected.swap(up, Ordering::AcqRel);
        if previous != up {
            let status = if up {
                TransportStatus::Connected
            } else {
                TransportStatus::Disconnected
            };
            let _ = self.status_tx.send(status);
        }
    }
}

/// Handle to a rosbridge connection.  Cheap to clone.
#[derive(Clone)]
pub struct RosbridgeTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
}

/// The connection task behind a [`RosbridgeTransport`].
///
/// Spawn [`RosbridgeLink::run`] on a Tokio runtime; it returns once every
/// transport handle has been dropped.
pub struct RosbridgeLink {
    url: String,
    reconnect_delay: Duration,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl RosbridgeTransport {
    /// Create a disconnected transport for the rosbridge server at `url`
    /// (e.g. `ws://localhost:9090`) together with its connection task.
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> (Self, RosbridgeLink) {
        let (status_tx, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            topics: Mutex::new(HashMap::new()),
            status_tx,
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            shared: Arc::clone(&shared),
            outbound: tx,
        };
        let link = RosbridgeLink {
            url: url.into(),
            reconnect_delay,
            shared,
            outbound: rx,
        };
        (transport, link)
    }

    /// Stream of connection status transitions.
    pub fn status_events(&self) -> broadcast::Receiver<TransportStatus> {
        self.shared.status_tx.subscribe()
    }

    fn enqueue(&self, op: String) -> Result<(), SensorError> {
        self.outbound
            .send(op)
            .map_err(|_| SensorError::Transport("rosbridge link task has stopped".to_string()))
    }
}

impl Transport for RosbridgeTransport {
    fn status(&self) -> TransportStatus {
        if self.shared.connected.load(Ordering::Acquire) {
            TransportStatus::Connected
        } else {
            TransportStatus::Disconnected
        }
    }

    fn register_publisher(&self, topic: &str, message_type: &str) -> Result<(), SensorError> {
        let mut topics = self.shared.topics.lock();
        let ad = topics.entry(topic.to_string()).or_insert_with(|| Advertisement {
            message_type: message_type.to_string(),
            live: false,
        });
        if ad.message_type != message_type {
            return Err(SensorError::Transport(format!(
                "topic {topic} already advertised as {}",
                ad.message_type
            )));
        }
        if self.is_connected() && !ad.live {
            self.enqueue(advertise_op(topic, message_type))?;
            ad.live = true;
            info!(topic, message_type, "rosbridge topic advertised");
        }
        Ok(())
    }

    fn publish(&self, topic: &str, batch: &Detection3DArray) -> Result<(), SensorError> {
        if !self.is_connected() {
            return Err(SensorError::NotConnected);
        }
        let live = self
            .shared
            .topics
            .lock()
            .get(topic)
            .is_some_and(|ad| ad.live);
        if !live {
            return Err(SensorError::UnregisteredTopic(topic.to_string()));
        }
        self.enqueue(publish_op(topic, batch)?)
    }
}

impl RosbridgeLink {
    /// Drive the connection until every [`RosbridgeTransport`] handle is gone.
    pub async fn run(self) {
        let RosbridgeLink {
            url,
            reconnect_delay,
            shared,
            mut outbound,
        } = self;

        loop {
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    // Anything still queued belongs to a dead connection.
                    while outbound.try_recv().is_ok() {}
                    shared.set_connected(true);
                    info!(url = %url, "rosbridge connected");

                    let (mut sink, mut stream) = ws.split();
                    let handles_gone = loop {
                        tokio::select! {
                            op = outbound.recv() => match op {
                                Some(text) => {
                                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                                        warn!(url = %url, error = %e, "rosbridge send failed");
                                        break false;
                                    }
                                }
                                None => break true,
                            },
                            frame = stream.next() => match frame {
                                Some(Ok(Message::Close(_))) | None => break false,
                                Some(Err(e)) => {
                                    warn!(url = %url, error = %e, "rosbridge read failed");
                                    break false;
                                }
                                Some(Ok(Message::Text(text))) => {
                                    debug!(url = %url, len = text.len(), "rosbridge inbound frame ignored");
                                }
                                Some(Ok(_)) => {}
                            },
                        }
                    };

                    shared.set_connected(false);
                    if handles_gone {
                        let _ = sink.close().await;
                        return;
                    }
                    warn!(url = %url, "rosbridge connection lost");
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "rosbridge connect failed");
                }
            }

            if outbound.is_closed() {
                return;
            }
            tokio::time::sleep(reconnect_delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Wire encoding
// ---------------------------------------------------------------------------

fn advertise_op(topic: &str, message_type: &str) -> String {
    json!({
        "op": "advertise",
        "id": format!("advertise:{topic}:{}", Uuid::new_v4()),
        "topic": topic,
        "type": message_type,
    })
    .to_string()
}

fn publish_op(topic: &str, batch: &Detection3DArray) -> Result<String, SensorError> {
    let msg = serde_json::to_value(batch).map_err(|e| SensorError::Serialization(e.to_string()))?;
    Ok(json!({
        "op": "publish",
        "topic": topic,
        "msg": msg,
    })
    .to_string())
}
