#![allow(dead_code)]

use joblog::format::LineFormatter;
use joblog::init::{build_subscriber, JoblogConfig};
use joblog::resource::{CpuUsage, IoCounters, ResourceError, ResourceSnapshotProvider};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::Subscriber;

/// In-memory log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Resource provider returning fixed numbers.
pub struct FixedResources {
    pub cpu: CpuUsage,
    pub io: IoCounters,
}

impl FixedResources {
    pub fn job1() -> Self {
        Self {
            cpu: CpuUsage {
                user_cpu_seconds: 0.10,
                system_cpu_seconds: 0.02,
                peak_rss_bytes: 2_097_152,
            },
            io: IoCounters { bytes_read: 2048, bytes_written: 0 },
        }
    }
}

impl ResourceSnapshotProvider for FixedResources {
    fn io_counters(&self) -> Result<IoCounters, ResourceError> {
        Ok(self.io)
    }

    fn cpu_usage(&self) -> Result<CpuUsage, ResourceError> {
        Ok(self.cpu)
    }
}

/// File-sink-only subscriber writing into `capture`.
pub fn capture_subscriber(
    capture: &Capture,
    resources: Arc<dyn ResourceSnapshotProvider>,
) -> impl Subscriber + Send + Sync + 'static {
    let config = JoblogConfig { enable_console: false, ..JoblogConfig::default() };
    let writer = capture.clone();
    build_subscriber(move || writer.clone(), io::sink, &config, LineFormatter::new(resources))
}

/// Default sink levels, with the file and console each writing into their own capture.
pub fn dual_capture_subscriber(
    file: &Capture,
    console: &Capture,
    resources: Arc<dyn ResourceSnapshotProvider>,
) -> impl Subscriber + Send + Sync + 'static {
    let (file, console) = (file.clone(), console.clone());
    build_subscriber(
        move || file.clone(),
        move || console.clone(),
        &JoblogConfig::default(),
        LineFormatter::new(resources),
    )
}
