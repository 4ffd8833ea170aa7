//! [`PublishScheduler`] – fixed-rate, gated flush timer.
//!
//! The scheduler is a pure clock: it is polled with the current engine time
//! and answers whether a flush is due.  It never touches the registry or the
//! transport itself; [`GroundTruthSensor`][crate::sensor::GroundTruthSensor]
//! acts on its answer.
//!
//! The schedule free-runs.  A tick that falls due while a gate is closed is
//! spent, not deferred, and the next tick is one period after it.  Ticks the
//! caller slept through are never caught up.

use groundtruth_types::SensorError;

/// Why a due tick did not flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The sensor has been administratively disabled.
    Disabled,
    /// The target mode does not consume ground truth.
    UnsupportedTarget,
    /// No transport has been handed to the sensor, or it has been dropped.
    NoTransport,
    /// The transport exists but reports itself disconnected.
    Disconnected,
}

/// Snapshot of every publish precondition at tick time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gates {
    pub enabled: bool,
    pub target_supported: bool,
    pub transport_present: bool,
    pub connected: bool,
}

impl Gates {
    /// All gates open.
    pub fn open() -> Self {
        Self {
            enabled: true,
            target_supported: true,
            transport_present: true,
            connected: true,
        }
    }

    /// `Err` with the first closed gate, in evaluation order.
    pub fn check(&self) -> Result<(), SkipReason> {
        self.blocked_by().map_or(Ok(()), Err)
    }

    /// The first closed gate, in evaluation order.
    pub fn blocked_by(&self) -> Option<SkipReason> {
        if !self.target_supported {
            Some(SkipReason::UnsupportedTarget)
        } else if !self.transport_present {
            Some(SkipReason::NoTransport)
        } else if !self.connected {
            Some(SkipReason::Disconnected)
        } else if !self.enabled {
            Some(SkipReason::Disabled)
        } else {
            None
        }
    }
}

/// Outcome of [`PublishScheduler::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick<T = ()> {
    /// The next tick has not arrived yet.
    NotDue,
    /// A tick arrived but a gate was closed; nothing may change.
    Skipped(SkipReason),
    /// A tick arrived with every gate open: flush now with whatever the gate
    /// check handed back.
    Due(T),
}

/// Fixed-period tick source.
#[derive(Debug, Clone)]
pub struct PublishScheduler {
    period: f64,
    next_due: f64,
}

impl PublishScheduler {
    /// Create a scheduler whose first tick is one period after `start`.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::InvalidConfig`] unless `frequency_hz` is finite
    /// and strictly positive.
    pub fn new(frequency_hz: f64, start: f64) -> Result<Self, SensorError> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(SensorError::InvalidConfig(format!(
                "publish frequency must be a positive number of Hz, got {frequency_hz}"
            )));
        }
        let period = 1.0 / frequency_hz;
        Ok(Self {
            period,
            next_due: start + period,
        })
    }

    /// Seconds between ticks.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Engine time at which the next tick falls due.
    pub fn next_due(&self) -> f64 {
        self.next_due
    }

    /// Advance the clock to `now` and, only if a tick is due, run `gate`.
    ///
    /// `gate` returns the first closed gate as `Err`, or whatever the flush
    /// needs as `Ok`.
    pub fn poll<T>(
        &mut self,
        now: f64,
        gate: impl FnOnce() -> Result<T, SkipReason>,
    ) -> Tick<T> {
        if now < self.next_due {
            return Tick::NotDue;
        }

        let mut next = self.next_due + self.period;
        if next <= now {
            next = now + self.period;
        }
        self.next_due = next;

        match gate() {
            Ok(value) => Tick::Due(value),
            Err(reason) => Tick::Skipped(reason),
        }
    }
}
