//! `groundtruth-middleware` – the transport side of the sensor.
//!
//! The sensor never speaks a wire protocol itself.  It talks to a
//! [`Transport`] that knows whether it is connected, which topics it has
//! advertised, and how to push a [`Detection3DArray`][groundtruth_types::Detection3DArray]
//! to the outside world.
//!
//! # Modules
//!
//! - [`transport`] – the [`Transport`] capability trait.
//! - [`bus`] – [`BusTransport`]: in-process, topic-keyed broadcast channels
//!   with a settable connection status.  Used for loopback runs and tests.
//! - [`rosbridge`] – [`RosbridgeTransport`]: WebSocket client speaking the
//!   rosbridge v2 JSON protocol.

pub mod bus;
pub mod rosbridge;
pub mod transport;

pub use bus::{BusTransport, TopicReceiver};
pub use rosbridge::{RosbridgeLink, RosbridgeTransport};
pub use transport::Transport;
