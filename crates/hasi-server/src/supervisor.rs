//! The paced event loop and the controller lifecycle

use hasi_config::DelayMode;
use hasi_core::lock_bus;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::controller::Controller;
use crate::error::{ControllerError, ControllerResult};
use crate::pacing::LoadWindow;
use crate::shell::run_shell;
use crate::shutdown::{join_task, join_thread, wait_for_shutdown_signal};
use crate::watchdog::{keepalive_interval, spawn_pinger, LinuxWatchdog, StallDetector, WatchdogDevice};

/// Tick until the controller is cancelled
///
/// Each tick is followed by a sleep for the rest of the delay. Load
/// windows adapt the delay, and the stores are saved every restore-point
/// interval.
pub async fn run_event_loop(controller: Arc<Controller>) {
    let cancel = controller.cancel_token();
    controller.loop_running.store(true, Ordering::Relaxed);

    let config = controller.config();
    match config.delay_mode {
        DelayMode::Manual => info!("Delay manually set to {} ms", config.event_loop_delay_ms),
        DelayMode::BasedOnLoad | DelayMode::BasedOnOverload => info!(
            mode = ?config.delay_mode,
            target = config.auto_delay_target,
            "Initial delay value is {} ms",
            config.event_loop_delay_ms
        ),
    }
    info!("Home automation server running");

    let restore_interval = config.restore_point_interval();
    let mut last_restore = Instant::now();
    let mut window = LoadWindow::new();

    while !cancel.is_cancelled() {
        let started = Instant::now();
        let delay = controller.tick().await;
        let elapsed = started.elapsed();

        if LoadWindow::is_normal(delay, elapsed) {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay - elapsed) => {}
            }
        }

        if let Some(stats) = window.record(delay, elapsed) {
            controller.apply_window(stats).await;
        }

        if let Some(interval) = restore_interval {
            if last_restore.elapsed() > interval {
                if let Err(e) = controller.save_state().await {
                    error!("Failed to save restore point: {}", e);
                }
                last_restore = Instant::now();
            }
        }
    }

    controller.loop_running.store(false, Ordering::Relaxed);
    info!("Home automation server terminating");
}

impl Controller {
    /// Run until a signal, a shell `q` or [`Controller::shutdown`]
    ///
    /// Starts the watchdog pinger, the event loop and, if given, the shell.
    /// On the way out every unit is joined with a timeout and the stores
    /// are saved.
    pub async fn run<R, W>(self: Arc<Self>, shell: Option<(R, W)>) -> ControllerResult<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let watchdog = self.start_watchdog();
        let mut event_loop = tokio::spawn(run_event_loop(self.clone()));
        let shell = shell.map(|(reader, writer)| tokio::spawn(run_shell(self.clone(), reader, writer)));

        let mut finished = None;
        tokio::select! {
            result = &mut event_loop => finished = Some(result),
            _ = signal_or_pending() => info!("Shutdown signal received"),
            _ = self.cancel.cancelled() => {}
        }
        self.shutdown();

        let loop_result = match finished {
            Some(result) => result.map_err(|e| ControllerError::Task(e.to_string())),
            None => join_task(event_loop, self.config.shutdown_timeout(), "event loop")
                .await
                .ok_or_else(|| ControllerError::Task("event loop did not stop".to_string())),
        };

        if let Some((handle, interval)) = watchdog {
            info!("Waiting for watchdog to finish");
            join_thread(handle, interval.mul_f64(1.5), "Watchdog").await;
        }

        if let Some(shell) = shell {
            match join_task(shell, Duration::from_secs(1), "shell reader").await {
                Some(Err(e)) => warn!("Shell reader failed: {}", e),
                Some(Ok(())) | None => {}
            }
        }

        let mut core = self.lock().await;
        let scripts = core.looper.close_scripts();
        let saved = core.looper.save_state();
        lock_bus(&core.bus).shutdown();
        drop(core);

        if let Some(handle) = scripts {
            join_thread(handle, self.config.shutdown_timeout(), "Script runner").await;
        }

        info!("Home automation event loop has terminated");
        loop_result?;
        saved?;
        Ok(())
    }

    fn start_watchdog(&self) -> Option<(thread::JoinHandle<()>, Duration)> {
        let config = &self.config.watchdog;
        if !config.enabled {
            info!("Watchdog disabled");
            return None;
        }

        let mut device = match LinuxWatchdog::open(&config.device, u64::from(config.timeout_secs)) {
            Ok(device) => device,
            Err(e) => {
                warn!("Unable to start watchdog, system running unguarded ({})", e);
                return None;
            }
        };

        let Some(interval) = keepalive_interval(config, device.timeout_secs()) else {
            if let Err(e) = device.disable() {
                warn!("Unable to disarm watchdog: {}", e);
            }
            return None;
        };
        match spawn_pinger(
            Box::new(device),
            self.heartbeat(),
            interval,
            StallDetector::new(interval),
            self.cancel.child_token(),
            self.watchdog_running.clone(),
        ) {
            Ok(handle) => Some((handle, interval)),
            Err(e) => {
                warn!("Unable to start watchdog thread, system running unguarded ({})", e);
                None
            }
        }
    }
}

/// A signal, or never if the handlers cannot be installed
async fn signal_or_pending() {
    if let Err(e) = wait_for_shutdown_signal().await {
        warn!("Unable to listen for shutdown signals: {}", e);
        std::future::pending::<()>().await;
    }
}
