//! Tracking of an in-flight device enumeration.
//!
//! The hub answers `DEVICE_LIST` with a header frame announcing
//! `number_of_devices`, followed by one `DEVICE_FOUND` frame per device.
//! Enumeration is complete once that many distinct devices were reported.

use std::collections::HashSet;

use futures::channel::oneshot;
use log::{debug, trace};

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Progress of the current discovery window and the callers waiting on it.
#[derive(Debug, Default)]
pub(crate) struct Discovery {
    expected: Option<usize>,
    found: HashSet<String>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the discovery window, opening a fresh one if nobody else is waiting.
    pub fn begin(&mut self) -> oneshot::Receiver<Result<()>> {
        self.abandon();
        if self.waiters.is_empty() {
            self.expected = None;
            self.found.clear();
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    /// The hub announced how many devices it will report.
    pub fn expect(&mut self, count: usize) {
        debug!("hub reports {count} device(s)");
        self.expected = Some(count);
        self.complete_if_done();
    }

    /// The hub reported one device.
    pub fn record(&mut self, uuid: &str) {
        self.found.insert(uuid.to_string());
        self.complete_if_done();
    }

    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    pub fn found(&self) -> usize {
        self.found.len()
    }

    pub fn is_complete(&self) -> bool {
        self.expected
            .is_some_and(|expected| self.found.len() >= expected)
    }

    pub fn is_waiting(&self) -> bool {
        self.waiters.iter().any(|w| !w.is_canceled())
    }

    /// Drop waiters whose caller gave up.
    pub fn abandon(&mut self) {
        self.waiters.retain(|w| !w.is_canceled());
    }

    /// Resolve every waiter with a connection error.
    pub fn fail(&mut self, reason: &Error) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(Error::disconnected(&reason.to_string())));
        }
    }

    fn complete_if_done(&mut self) {
        if !self.is_complete() {
            return;
        }
        if !self.waiters.is_empty() {
            trace!("discovery complete with {} device(s)", self.found.len());
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }
}
