//! Hardware watchdog pinger
//!
//! The pinger runs on its own OS thread so that it keeps kicking the
//! watchdog while the async runtime is busy. Each interval it checks the
//! [`Heartbeat`] of the event loop. When ticks stop making progress for
//! about a minute it flushes the disks and stops kicking, so the hardware
//! resets the machine.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use hasi_config::WatchdogConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A watchdog the pinger can kick
pub trait WatchdogDevice: Send {
    /// Reset the watchdog countdown
    fn keepalive(&mut self) -> io::Result<()>;

    /// Hardware timeout in seconds
    fn timeout_secs(&self) -> u64;

    /// Disarm on orderly shutdown
    fn disable(&mut self) -> io::Result<()>;
}

/// The Linux watchdog character device
#[derive(Debug)]
pub struct LinuxWatchdog {
    path: PathBuf,
    file: File,
    timeout_secs: u64,
}

impl LinuxWatchdog {
    /// Open `path`, which arms the watchdog, and program its timeout
    ///
    /// With `requested_secs` of 0 the hardware timeout is kept. The
    /// effective timeout is read back from the driver and reported by
    /// [`WatchdogDevice::timeout_secs`].
    pub fn open(path: impl AsRef<Path>, requested_secs: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().write(true).open(&path)?;

        match wdioc::boot_status(&file) {
            Ok(0) => {}
            Ok(_) => warn!("Last reboot was caused by the watchdog"),
            Err(e) => debug!("Unable to read watchdog boot status: {}", e),
        }

        let current = wdioc::timeout(&file);
        let timeout_secs = match (requested_secs, current) {
            (0, Ok(current)) => current,
            (0, Err(e)) => {
                // disarm before giving up the descriptor
                let _ = file.write_all(b"V");
                return Err(io::Error::new(
                    e.kind(),
                    format!("unable to read the watchdog timeout: {e}"),
                ))
            }
            (requested, Ok(current)) if current == requested => current,
            (requested, current) => {
                info!("Adjusting watchdog timeout to {} seconds", requested);
                match wdioc::set_timeout(&file, requested) {
                    Ok(effective) => effective,
                    Err(e) => {
                        warn!("Unable to set watchdog timeout: {}", e);
                        current.unwrap_or(requested)
                    }
                }
            }
        };

        info!(device = ?path, timeout_secs, "Watchdog armed");
        Ok(Self {
            path,
            file,
            timeout_secs,
        })
    }
}

/// Watchdog driver ioctls (`linux/watchdog.h`)
#[cfg(target_os = "linux")]
mod wdioc {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    const fn request(dir: u32, nr: u32) -> u32 {
        let size = std::mem::size_of::<libc::c_int>() as u32;
        (dir << 30) | (size << 16) | ((b'W' as u32) << 8) | nr
    }

    const READ: u32 = 2;
    const READ_WRITE: u32 = 3;

    const GETBOOTSTATUS: u32 = request(READ, 2);
    const SETTIMEOUT: u32 = request(READ_WRITE, 6);
    const GETTIMEOUT: u32 = request(READ, 7);

    fn call(file: &File, request: u32, value: &mut libc::c_int) -> io::Result<()> {
        // SAFETY: each request reads or writes exactly one c_int through the pointer
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, value as *mut libc::c_int) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn non_negative(value: libc::c_int) -> u64 {
        u64::try_from(value).unwrap_or(0)
    }

    pub(super) fn boot_status(file: &File) -> io::Result<u64> {
        let mut status = 0;
        call(file, GETBOOTSTATUS, &mut status)?;
        Ok(non_negative(status))
    }

    pub(super) fn timeout(file: &File) -> io::Result<u64> {
        let mut secs = 0;
        call(file, GETTIMEOUT, &mut secs)?;
        Ok(non_negative(secs))
    }

    /// Program `secs` and return the timeout the driver settled on
    pub(super) fn set_timeout(file: &File, secs: u64) -> io::Result<u64> {
        let mut value = libc::c_int::try_from(secs).unwrap_or(libc::c_int::MAX);
        call(file, SETTIMEOUT, &mut value)?;
        timeout(file)
    }
}

#[cfg(not(target_os = "linux"))]
mod wdioc {
    use std::fs::File;
    use std::io;

    fn unsupported() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "watchdog ioctls need Linux")
    }

    pub(super) fn boot_status(_file: &File) -> io::Result<u64> {
        Err(unsupported())
    }

    pub(super) fn timeout(_file: &File) -> io::Result<u64> {
        Err(unsupported())
    }

    pub(super) fn set_timeout(_file: &File, _secs: u64) -> io::Result<u64> {
        Err(unsupported())
    }
}

impl WatchdogDevice for LinuxWatchdog {
    fn keepalive(&mut self) -> io::Result<()> {
        self.file.write_all(b"\0")?;
        self.file.flush()
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn disable(&mut self) -> io::Result<()> {
        // magic close: the driver stops the countdown when 'V' is the
        // last byte written before close
        self.file.write_all(b"V")?;
        self.file.flush()?;
        info!(device = ?self.path, "Watchdog disarmed");
        Ok(())
    }
}

/// Progress marker of the event loop
///
/// The event loop bumps the counter once per tick and records how far the
/// tick got; the pinger consumes the counter each interval.
#[derive(Debug, Default)]
pub struct Heartbeat {
    beats: AtomicU64,
    step: AtomicU8,
    reinit: AtomicBool,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beat(&self) {
        self.beats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_step(&self, step: u8) {
        self.step.store(step, Ordering::Relaxed);
    }

    pub fn step(&self) -> u8 {
        self.step.load(Ordering::Relaxed)
    }

    /// Mark a bus re-initialisation; beats during it do not count
    pub fn set_reinit(&self, active: bool) {
        self.reinit.store(active, Ordering::Relaxed);
    }

    /// Whether the loop advanced since the last call
    pub fn take_progress(&self) -> bool {
        let advanced = self.beats.swap(0, Ordering::Relaxed) != 0;
        advanced && !self.reinit.load(Ordering::Relaxed)
    }
}

/// Outcome of one heartbeat observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    /// `count` consecutive intervals without progress
    Stalled { count: u32 },
    /// Stuck for too long; let the watchdog reset the machine
    GiveUp { count: u32 },
}

/// How long the event loop may stall before the pinger gives up
pub const STALL_WINDOW: Duration = Duration::from_secs(60);

/// Counts consecutive intervals without progress
#[derive(Debug, Clone)]
pub struct StallDetector {
    stuck: u32,
    stuck_max: u32,
}

impl StallDetector {
    /// A detector that gives up after about [`STALL_WINDOW`] of `interval`s
    pub fn new(interval: Duration) -> Self {
        Self::with_window(interval, STALL_WINDOW)
    }

    /// A detector that gives up after about `window` of `interval`s
    pub fn with_window(interval: Duration, window: Duration) -> Self {
        let per_window = window.as_millis() / interval.as_millis().max(1);
        Self {
            stuck: 0,
            stuck_max: u32::try_from(per_window).unwrap_or(u32::MAX).max(1),
        }
    }

    pub fn stuck_max(&self) -> u32 {
        self.stuck_max
    }

    pub fn observe(&mut self, progressed: bool) -> Verdict {
        if progressed {
            self.stuck = 0;
            return Verdict::Healthy;
        }

        let exceeded = self.stuck > self.stuck_max;
        self.stuck += 1;
        if exceeded {
            Verdict::GiveUp { count: self.stuck }
        } else {
            Verdict::Stalled { count: self.stuck }
        }
    }
}

/// Keep-alive interval for a device running with `timeout_secs`
///
/// `None` when no usable interval can be derived, in which case the
/// pinger is not started.
pub fn keepalive_interval(config: &WatchdogConfig, timeout_secs: u64) -> Option<Duration> {
    let Some(interval) = config.keepalive_interval(timeout_secs) else {
        warn!("Watchdog interval is invalid, skipping watchdog pinger initialization");
        return None;
    };
    let save = WatchdogConfig::save_interval(timeout_secs);
    if interval > save {
        warn!(
            "Watchdog interval {:?} is longer than the safe value {:?}, the system may reboot unexpectedly",
            interval, save
        );
    }
    Some(interval)
}

/// Slice of the keep-alive interval between cancellation checks
const SLICE: Duration = Duration::from_millis(100);

/// Start the pinger thread
///
/// The thread kicks `device` every `interval` until `cancel` fires, or
/// until `detector` gives up on the heartbeat. `running` is cleared when
/// the thread exits.
pub fn spawn_pinger(
    mut device: Box<dyn WatchdogDevice>,
    heartbeat: Arc<Heartbeat>,
    interval: Duration,
    mut detector: StallDetector,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    running.store(true, Ordering::Relaxed);
    let flag = running.clone();

    let spawned = thread::Builder::new()
        .name("hasi-watchdog".to_string())
        .spawn(move || {
            ping_loop(device.as_mut(), &heartbeat, interval, &mut detector, &cancel);
            flag.store(false, Ordering::Relaxed);
        });

    if spawned.is_err() {
        running.store(false, Ordering::Relaxed);
    }
    spawned
}

fn ping_loop(
    device: &mut dyn WatchdogDevice,
    heartbeat: &Heartbeat,
    interval: Duration,
    detector: &mut StallDetector,
    cancel: &CancellationToken,
) {
    let slices = (interval.as_millis() / SLICE.as_millis()).max(1) as u32;
    let slice = (interval / slices).max(Duration::from_millis(1));
    debug!(
        interval = ?interval,
        timeout_secs = device.timeout_secs(),
        stuck_max = detector.stuck_max(),
        "Watchdog pinger running"
    );

    while !cancel.is_cancelled() {
        if let Err(e) = device.keepalive() {
            warn!("Watchdog keep-alive failed: {}", e);
        }

        match detector.observe(heartbeat.take_progress()) {
            Verdict::Healthy => {}
            Verdict::Stalled { count } => {
                if count > 1 {
                    warn!(
                        step = heartbeat.step(),
                        "Tick took unusually long (warning {} of {})",
                        count,
                        detector.stuck_max() + 2
                    );
                }
            }
            Verdict::GiveUp { count } => {
                error!(
                    step = heartbeat.step(),
                    "No progress in the last {:.1} seconds, resetting via the watchdog",
                    (interval * count).as_secs_f64()
                );
                if let Err(e) = device.keepalive() {
                    warn!("Watchdog keep-alive failed: {}", e);
                }
                flush_disks();
                // no further kicks; the hardware takes over
                return;
            }
        }

        for _ in 0..slices {
            thread::sleep(slice);
            if cancel.is_cancelled() {
                break;
            }
        }
    }

    if let Err(e) = device.disable() {
        warn!("Failed to disarm watchdog: {}", e);
    }
    info!("Watchdog pinger stopped");
}

fn flush_disks() {
    for attempt in 1..=3 {
        match Command::new("sync").status() {
            Ok(status) if status.success() => return,
            Ok(status) => warn!(attempt, "sync exited with {}", status),
            Err(e) => warn!(attempt, "Failed to run sync: {}", e),
        }
    }
}
