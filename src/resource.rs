//! Best-effort process resource accounting.
//!
//! CPU time and peak RSS come from `getrusage(2)`. Byte counters for I/O
//! are platform specific and are read through a [`ResourceSnapshotProvider`]
//! chosen once per process by [`platform_provider`].
//!
//! Nothing in here returns an error to the logging path: every fallible
//! query yields a [`ResourceError`] which the caller degrades through
//! [`OrWarn::or_warn`] into a warning and a zero value.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Process-wide resource usage at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSnapshot {
    pub user_cpu_seconds: f64,
    pub system_cpu_seconds: f64,
    pub peak_rss_bytes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// The `getrusage` subset: CPU times and peak resident memory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CpuUsage {
    pub user_cpu_seconds: f64,
    pub system_cpu_seconds: f64,
    pub peak_rss_bytes: u64,
}

/// Bytes read and written by the process, as seen by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub bytes_read: u64,
    pub bytes_written: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum ResourceError {
    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed line {line:?}")]
    Parse { line: String },

    #[error("{0}")]
    Os(#[from] io::Error),

    #[error("unsupported platform {0}")]
    UnsupportedPlatform(&'static str),
}

/// Turn a failed best-effort query into a warning plus a default value.
pub trait OrWarn<T> {
    /// `what` names the quantity in the warning, e.g. `"I/O stats"`.
    fn or_warn(self, what: &str) -> T;
}

impl<T: Default> OrWarn<T> for Result<T, ResourceError> {
    fn or_warn(self, what: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                warn!("(joblog) unable to read {}: {}", what, e);
                T::default()
            }
        }
    }
}

/// Source of resource usage for the current process.
///
/// Implementations only differ in how I/O counters are obtained; CPU
/// time and peak RSS default to [`self_rusage`].
pub trait ResourceSnapshotProvider: Send + Sync {
    fn io_counters(&self) -> Result<IoCounters, ResourceError>;

    fn cpu_usage(&self) -> Result<CpuUsage, ResourceError> {
        self_rusage()
    }

    /// Full snapshot, used once at exit. Failures become warnings, at
    /// most one per snapshot when nothing at all can be read.
    fn capture(&self) -> ResourceSnapshot {
        let (cpu, io) = match (self.cpu_usage(), self.io_counters()) {
            (Err(cpu_err), Err(io_err)) => {
                let (cpu_err, io_err) = (cpu_err.to_string(), io_err.to_string());
                if cpu_err == io_err {
                    warn!("(joblog) unable to read resource usage or I/O stats: {}", cpu_err);
                } else {
                    warn!(
                        "(joblog) unable to read resource usage or I/O stats: {}; {}",
                        cpu_err, io_err
                    );
                }
                (CpuUsage::default(), IoCounters::default())
            }
            (cpu, io) => (cpu.or_warn("resource usage"), io.or_warn("I/O stats")),
        };
        ResourceSnapshot {
            user_cpu_seconds: cpu.user_cpu_seconds,
            system_cpu_seconds: cpu.system_cpu_seconds,
            peak_rss_bytes: cpu.peak_rss_bytes,
            bytes_read: io.bytes_read,
            bytes_written: io.bytes_written,
        }
    }

    /// Cheap peak-RSS read for the line prefix. Silent on failure since it runs
    /// inside the formatter.
    fn peak_rss_bytes(&self) -> u64 {
        self.cpu_usage().map(|c| c.peak_rss_bytes).unwrap_or(0)
    }
}

/// Reads `rchar`/`wchar` from a `/proc/<pid>/io` style file.
#[derive(Debug, Clone)]
pub struct ProcSelfIo {
    path: PathBuf,
}

impl ProcSelfIo {
    pub fn new() -> Self {
        Self::at("/proc/self/io")
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcSelfIo {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSnapshotProvider for ProcSelfIo {
    fn io_counters(&self) -> Result<IoCounters, ResourceError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| ResourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_proc_io(&text)
    }
}

/// Parse the `key: value` lines of `/proc/self/io`. Keys other than
/// `rchar` and `wchar` are ignored; absent keys read as zero.
pub fn parse_proc_io(text: &str) -> Result<IoCounters, ResourceError> {
    let mut counters = IoCounters::default();
    for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
        let parsed = line
            .split_once(": ")
            .and_then(|(key, value)| value.trim().parse::<u64>().ok().map(|v| (key, v)));
        let Some((key, value)) = parsed else {
            return Err(ResourceError::Parse { line: line.to_string() });
        };
        match key {
            "rchar" => counters.bytes_read = value,
            "wchar" => counters.bytes_written = value,
            _ => {}
        }
    }
    Ok(counters)
}

/// Queries `proc_pid_rusage` with the v2 flavor.
#[cfg(target_os = "macos")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcPidRusage;

#[cfg(target_os = "macos")]
impl ResourceSnapshotProvider for ProcPidRusage {
    fn io_counters(&self) -> Result<IoCounters, ResourceError> {
        const RUSAGE_INFO_V2: libc::c_int = 2;
        const DISKIO_BYTES_READ: usize = 16;
        const DISKIO_BYTES_WRITTEN: usize = 17;

        // Layout of `struct rusage_info_v2`: a uuid followed by 18 u64 counters.
        #[repr(C)]
        struct RusageInfoV2 {
            uuid: [u8; 16],
            items: [u64; 18],
        }

        let mut info = RusageInfoV2 { uuid: [0; 16], items: [0; 18] };
        let pid = std::process::id() as libc::c_int;
        let rc = unsafe {
            libc::proc_pid_rusage(
                pid,
                RUSAGE_INFO_V2,
                &mut info as *mut RusageInfoV2 as *mut libc::rusage_info_t,
            )
        };
        if rc != 0 {
            return Err(ResourceError::Os(io::Error::last_os_error()));
        }
        Ok(IoCounters {
            bytes_read: info.items[DISKIO_BYTES_READ],
            bytes_written: info.items[DISKIO_BYTES_WRITTEN],
        })
    }
}

/// Fallback for platforms without a known I/O counter source.
#[derive(Debug, Clone, Copy)]
pub struct Unsupported {
    platform: &'static str,
}

impl Unsupported {
    pub fn new(platform: &'static str) -> Self {
        Self { platform }
    }
}

impl ResourceSnapshotProvider for Unsupported {
    fn io_counters(&self) -> Result<IoCounters, ResourceError> {
        Err(ResourceError::UnsupportedPlatform(self.platform))
    }
}

/// Pick the I/O counter strategy for the platform this was built for.
pub fn platform_provider() -> Arc<dyn ResourceSnapshotProvider> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(ProcSelfIo::new())
    }
    #[cfg(target_os = "macos")]
    {
        Arc::new(ProcPidRusage)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Arc::new(Unsupported::new(std::env::consts::OS))
    }
}

/// `getrusage(RUSAGE_SELF)` with peak RSS normalized to bytes.
#[cfg(unix)]
pub fn self_rusage() -> Result<CpuUsage, ResourceError> {
    use nix::sys::resource::{getrusage, UsageWho};
    use nix::sys::time::TimeVal;

    fn seconds(tv: TimeVal) -> f64 {
        tv.tv_sec() as f64 + tv.tv_usec() as f64 / 1_000_000.0
    }

    let usage = getrusage(UsageWho::RUSAGE_SELF).map_err(io::Error::from)?;
    let max_rss = u64::try_from(usage.max_rss()).unwrap_or(0);
    // Darwin reports ru_maxrss in bytes, everyone else in KiB.
    let peak_rss_bytes = if cfg!(any(target_os = "macos", target_os = "ios")) {
        max_rss
    } else {
        max_rss.saturating_mul(1024)
    };

    Ok(CpuUsage {
        user_cpu_seconds: seconds(usage.user_time()),
        system_cpu_seconds: seconds(usage.system_time()),
        peak_rss_bytes,
    })
}

#[cfg(not(unix))]
pub fn self_rusage() -> Result<CpuUsage, ResourceError> {
    Err(ResourceError::UnsupportedPlatform(std::env::consts::OS))
}
