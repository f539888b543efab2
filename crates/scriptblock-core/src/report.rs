//! Reporting channel for invocation-time failures
//!
//! Native callers never see marshalling or script errors; the trampoline
//! returns a zero value instead. Those errors are published here so the
//! embedder can surface them (e.g. as an uncaught-exception hook).

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::error::InvocationError;

/// One failed invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationReport {
    /// Encoding of the bridge that was invoked
    pub encoding: String,
    /// What went wrong
    pub error: InvocationError,
}

/// Bounded, lossy channel of invocation reports.
///
/// When full, the oldest report is dropped to make room. Clones share the
/// same channel.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: Sender<InvocationReport>,
    rx: Receiver<InvocationReport>,
}

impl Reporter {
    /// Create a reporter holding at most `capacity` reports (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Publish a report, evicting the oldest one if the channel is full
    pub fn publish(&self, report: InvocationReport) {
        let mut report = report;
        loop {
            match self.tx.try_send(report) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    let _ = self.rx.try_recv();
                    report = rejected;
                }
                // Both ends live in `self`, so this cannot happen
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Take the oldest pending report, if any
    pub fn try_recv(&self) -> Option<InvocationReport> {
        self.rx.try_recv().ok()
    }

    /// Take every pending report, oldest first
    pub fn drain(&self) -> Vec<InvocationReport> {
        self.rx.try_iter().collect()
    }

    /// Number of pending reports
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Check if no reports are pending
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of pending reports
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(crate::options::DEFAULT_REPORT_CAPACITY)
    }
}
