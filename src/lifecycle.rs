//! Start and exit instrumentation.
//!
//! [`JobGuard::begin`] logs where the log goes, who is running, and how the
//! process was invoked. Dropping the guard (or calling
//! [`JobGuard::finish`]) logs the terminating error, if any, followed by a
//! single `exit` summary with wall time, CPU time, I/O and peak RSS.
//!
//! `Drop` does not run on `std::process::exit`, with `panic = "abort"`, or
//! when the process is killed by a signal; no exit line is written then.

use crate::identity::ProcessIdentity;
use crate::record::{capture_frames, ErrorReport};
use crate::resource::{ResourceSnapshot, ResourceSnapshotProvider};
use crate::size::format_size;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{error, info};

static LAST_PANIC: Mutex<Option<(ThreadId, ErrorReport)>> = Mutex::new(None);
static PANIC_HOOK: Once = Once::new();

/// Remember each panic so the guard can report it while unwinding.
/// The previously installed hook still runs.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "Box<dyn Any>".to_string()
            };
            let mut report = ErrorReport::new("panic", message);
            report.frames = capture_frames();
            if report.frames.is_empty() {
                if let Some(location) = info.location() {
                    report = report.with_frame(location.file(), location.line(), None::<String>);
                }
            }
            let mut slot = LAST_PANIC.lock().unwrap_or_else(|p| p.into_inner());
            *slot = Some((thread::current().id(), report));
            drop(slot);

            previous(info);
        }));
    });
}

fn take_panic_of_current_thread() -> Option<ErrorReport> {
    let mut slot = LAST_PANIC.lock().unwrap_or_else(|p| p.into_inner());
    match slot.take() {
        Some((id, report)) if id == thread::current().id() => Some(report),
        other => {
            *slot = other;
            None
        }
    }
}

/// Start/exit bookkeeping for one job. Created once by [`crate::init::start`].
///
/// Hosts that call `start` from several threads must serialize the calls
/// themselves; the guard takes no lock around registration.
pub struct JobGuard {
    identity: ProcessIdentity,
    log_path: PathBuf,
    started: Instant,
    resources: Arc<dyn ResourceSnapshotProvider>,
    pending: Mutex<Option<ErrorReport>>,
    finished: AtomicBool,
}

impl JobGuard {
    /// Log the start lines and begin timing.
    pub fn begin(
        identity: ProcessIdentity,
        log_path: PathBuf,
        resources: Arc<dyn ResourceSnapshotProvider>,
    ) -> Self {
        let started = Instant::now();

        info!("logging to {}", log_path.display());
        info!("{}", identity.start_line());
        info!("invoked as: {}\n", identity.command_line());

        Self {
            identity,
            log_path,
            started,
            resources,
            pending: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record the error the process is about to terminate with. It is
    /// logged at exit, ahead of the summary. A report without frames gets
    /// the current call stack, or at least the caller's location.
    #[track_caller]
    pub fn fail(&self, report: ErrorReport) {
        let mut report = report;
        if report.frames.is_empty() {
            report.frames = capture_frames();
        }
        if report.frames.is_empty() {
            let caller = std::panic::Location::caller();
            report = report.with_frame(caller.file(), caller.line(), None::<String>);
        }
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        *pending = Some(report);
    }

    /// Run the exit hook now instead of on drop.
    pub fn finish(self) {
        self.exit();
    }

    /// Logs the terminating error and the exit summary. Runs at most once
    /// and never panics.
    fn exit(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let failure = if thread::panicking() {
            take_panic_of_current_thread()
        } else {
            None
        };
        let failure = failure.or_else(|| {
            self.pending
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .take()
        });
        if let Some(report) = failure {
            log_failure(&report);
        }

        let elapsed = self.started.elapsed();
        let snapshot = self.resources.capture();
        info!("{}", exit_summary(&self.identity.program, self.identity.pid, elapsed, &snapshot));
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.exit();
    }
}

/// One error record per line: headline, causes, then `  <file>:<line> in <function>`.
pub fn log_failure(report: &ErrorReport) {
    for line in report.lines() {
        error!("{}", line);
    }
}

/// `exit <program>: pid <pid>, real <s>s, user <s>s, system <s>s, read <size>, written <size>, peak rss <size>`
pub fn exit_summary(
    program: &str,
    pid: u32,
    elapsed: Duration,
    snapshot: &ResourceSnapshot,
) -> String {
    format!(
        "exit {}: pid {}, real {}s, user {:.2}s, system {:.2}s, read {}, written {}, peak rss {}",
        program,
        pid,
        format_elapsed(elapsed),
        snapshot.user_cpu_seconds,
        snapshot.system_cpu_seconds,
        format_size(snapshot.bytes_read),
        format_size(snapshot.bytes_written),
        format_size(snapshot.peak_rss_bytes),
    )
}

/// Seconds with three decimals, rounded half up from the exact duration.
fn format_elapsed(elapsed: Duration) -> String {
    let millis = (elapsed.as_nanos() + 500_000) / 1_000_000;
    format!("{}.{:03}", millis / 1000, millis % 1000)
}
