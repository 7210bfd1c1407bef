/*!
 * Serialized command queue.
 *
 * Host-issued commands never reach the radio concurrently. Commands enter a
 * FIFO queue in call order; a single drain task applies them one at a time
 * with a fixed spacing between consecutive sends. One command's failure is
 * reported to its caller and never stalls the commands behind it.
 */
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use muxnode_core::types::Value;
use muxnode_devices::controls::ControlId;

use crate::error::{Error, Result};

/// Applies a dequeued command to the device
#[async_trait]
pub trait CommandSink: Send + Sync + Debug {
    /// Apply one command
    async fn apply(&self, control: ControlId, value: Value) -> Result<()>;
}

/// A queued command awaiting its turn
#[derive(Debug)]
struct QueueEntry {
    /// Execution id for log correlation
    id: Uuid,
    /// The target control
    control: ControlId,
    /// The commanded value
    value: Value,
    /// When the command entered the queue
    enqueued_at: Instant,
    /// Completion channel back to the caller
    done: oneshot::Sender<Result<()>>,
}

#[derive(Debug, Default)]
struct QueueInner {
    /// Pending commands in arrival order
    entries: VecDeque<QueueEntry>,
    /// Whether a drain task is currently running
    draining: bool,
}

/// FIFO command queue with inter-command spacing
#[derive(Debug)]
pub struct CommandQueue {
    /// The sink commands are applied through
    sink: Arc<dyn CommandSink>,
    /// Minimum delay between consecutive sends
    spacing: Duration,
    /// Queue state shared with the drain task
    inner: Arc<Mutex<QueueInner>>,
}

impl CommandQueue {
    /// Create a queue applying commands through the given sink
    pub fn new(sink: Arc<dyn CommandSink>, spacing: Duration) -> Self {
        Self {
            sink,
            spacing,
            inner: Arc::new(Mutex::new(QueueInner::default())),
        }
    }

    fn lock(inner: &Mutex<QueueInner>) -> MutexGuard<'_, QueueInner> {
        inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of commands currently waiting
    pub fn pending(&self) -> usize {
        Self::lock(&self.inner).entries.len()
    }

    /// Enqueue a command.
    ///
    /// The entry is pushed synchronously, so two calls made in order are
    /// applied in that order. The returned future resolves with the command's
    /// outcome once the drain reaches it.
    pub fn enqueue(&self, control: ControlId, value: Value) -> BoxFuture<'static, Result<()>> {
        let id = Uuid::new_v4();
        let (done, outcome) = oneshot::channel();
        debug!("Enqueueing command {} for control {}", id, control);

        let start_drain = {
            let mut inner = Self::lock(&self.inner);
            inner.entries.push_back(QueueEntry {
                id,
                control,
                value,
                enqueued_at: Instant::now(),
                done,
            });
            !std::mem::replace(&mut inner.draining, true)
        };
        if start_drain {
            let sink = self.sink.clone();
            let spacing = self.spacing;
            let inner = self.inner.clone();
            tokio::spawn(Self::drain(sink, spacing, inner));
        }

        async move {
            outcome
                .await
                .map_err(|_| Error::other("command queue dropped the command"))?
        }
        .boxed()
    }

    /// Drain the queue until empty, one command at a time
    async fn drain(sink: Arc<dyn CommandSink>, spacing: Duration, inner: Arc<Mutex<QueueInner>>) {
        loop {
            let entry = {
                let mut guard = Self::lock(&inner);
                match guard.entries.pop_front() {
                    Some(entry) => entry,
                    None => {
                        guard.draining = false;
                        return;
                    }
                }
            };

            debug!(
                "Applying command {} for control {} after {:?} in queue",
                entry.id,
                entry.control,
                entry.enqueued_at.elapsed()
            );
            let result = sink.apply(entry.control, entry.value).await;
            if let Err(e) = &result {
                warn!("Command {} for control {} failed: {}", entry.id, entry.control, e);
            }
            // The caller may have stopped waiting; that is fine.
            let _ = entry.done.send(result);

            let more_pending = !Self::lock(&inner).entries.is_empty();
            if more_pending {
                tokio::time::sleep(spacing).await;
            }
        }
    }
}
