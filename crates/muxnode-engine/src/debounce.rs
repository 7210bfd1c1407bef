/*!
 * Root-report debouncing.
 *
 * Root reports announce that some endpoint of a command class changed without
 * saying which one. Resolving one costs a GET per classified endpoint of that
 * kind, and physical actuation tends to produce report bursts, so the engine
 * waits for a quiet window before reconciling. Each new root report for a
 * kind cancels and restarts that kind's timer; a burst collapses into one
 * sweep.
 */
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use muxnode_devices::endpoint::EndpointKind;

use crate::sync::StateSynchronizer;

/// Coalesces root reports into per-kind sync sweeps
#[derive(Debug)]
pub struct ReportDebouncer {
    /// The synchronizer that runs the sweep
    sync: Arc<StateSynchronizer>,
    /// How long the report stream must stay quiet before a sweep fires
    quiet_window: Duration,
    /// Pending sweep timer per endpoint kind
    timers: Mutex<HashMap<EndpointKind, JoinHandle<()>>>,
}

impl ReportDebouncer {
    /// Create a debouncer with the given quiet window
    pub fn new(sync: Arc<StateSynchronizer>, quiet_window: Duration) -> Self {
        Self {
            sync,
            quiet_window,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Note a root report for an endpoint kind.
    ///
    /// Restarts the kind's quiet-window timer; the sweep fires only once the
    /// window elapses without another report.
    pub fn note_root_report(&self, kind: EndpointKind) {
        let sync = self.sync.clone();
        let quiet_window = self.quiet_window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_window).await;
            debug!("Quiet window elapsed, sweeping {:?} endpoints", kind);
            sync.sync_by_kind(kind).await;
        });

        let mut timers = self
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = timers.insert(kind, handle) {
            previous.abort();
        }
    }

    /// Cancel every pending sweep timer
    pub fn cancel_all(&self) {
        let mut timers = self
            .timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for ReportDebouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
