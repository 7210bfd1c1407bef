/*!
 * Utility functions and helpers for MuxNode.
 *
 * This module provides common utilities used throughout the MuxNode ecosystem.
 */
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Create a task that runs in the background
///
/// # Arguments
///
/// * `fut` - The future to run
///
/// # Returns
///
/// A handle to the spawned task
pub fn spawn_task<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fut)
}

/// Create a task that runs in the background and logs any errors
///
/// # Arguments
///
/// * `name` - A name for the task (for logging)
/// * `fut` - The future to run
pub fn spawn_and_log<F, T, E>(name: &str, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let task_name = name.to_string();
    tokio::spawn(async move {
        match fut.await {
            Ok(_) => {
                debug!("Task '{}' completed successfully", task_name);
            }
            Err(e) => {
                warn!("Task '{}' failed: {}", task_name, e);
            }
        }
    })
}

/// Convert a Duration to milliseconds
///
/// # Arguments
///
/// * `duration` - The duration to convert
///
/// # Returns
///
/// The duration in milliseconds
pub fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_secs() * 1000 + u64::from(duration.subsec_millis())
}

/// Convert milliseconds to a Duration
///
/// # Arguments
///
/// * `millis` - The milliseconds to convert
///
/// # Returns
///
/// A Duration representing the milliseconds
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
