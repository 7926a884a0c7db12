//! OS signal handling
//!
//! On Unix SIGINT, SIGTERM and SIGQUIT end the controller; elsewhere only
//! Ctrl-C does. Background units are joined with a timeout once the
//! shutdown token is cancelled.

use std::thread;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Completes when the process receives a termination signal
///
/// Returns `Err` if the signal handlers cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Completes when the process receives a termination signal
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Wait up to `timeout` for a task; a late task is aborted
pub(crate) async fn join_task<T>(
    mut handle: JoinHandle<T>,
    timeout: Duration,
    name: &str,
) -> Option<T> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("{} failed: {}", name, e);
            None
        }
        Err(_) => {
            warn!("Timeout on {} termination, aborting it", name);
            handle.abort();
            None
        }
    }
}

/// Wait up to `timeout` for an OS thread; a late thread is detached
pub(crate) async fn join_thread(
    handle: thread::JoinHandle<()>,
    timeout: Duration,
    name: &str,
) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    if !handle.is_finished() {
        warn!("{} not responding, detaching it", name);
        return false;
    }
    if handle.join().is_err() {
        error!("{} panicked", name);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_task_in_time() {
        let handle = tokio::spawn(async { 7 });
        assert_eq!(join_task(handle, Duration::from_secs(1), "quick task").await, Some(7));
    }

    #[tokio::test]
    async fn test_join_task_aborts_late_task() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert_eq!(
            join_task(handle, Duration::from_millis(20), "slow task").await,
            None
        );
    }

    #[tokio::test]
    async fn test_join_thread() {
        let quick = thread::spawn(|| {});
        assert!(join_thread(quick, Duration::from_secs(1), "quick thread").await);

        let slow = thread::spawn(|| thread::sleep(Duration::from_millis(500)));
        assert!(!join_thread(slow, Duration::from_millis(20), "slow thread").await);
    }
}
