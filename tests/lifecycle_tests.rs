mod common;

use common::{capture_subscriber, Capture, FixedResources};
use joblog::identity::ProcessIdentity;
use joblog::lifecycle::{install_panic_hook, JobGuard};
use joblog::resource::{
    CpuUsage, IoCounters, ProcSelfIo, ResourceError, ResourceSnapshot, ResourceSnapshotProvider,
    Unsupported,
};
use joblog::ErrorReport;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

fn job1() -> ProcessIdentity {
    ProcessIdentity {
        program: "job1".into(),
        pid: 4242,
        hostname: "host1".into(),
        uid: 1000,
        user: "batch".into(),
        runtime: "rustc 1.79.0".into(),
        os: "Linux".into(),
        argv: vec!["./job1".into(), "--full".into()],
    }
}

fn log_path() -> PathBuf {
    PathBuf::from("logs/2024/202403/20240305/20240305_070809_job1_4242_host1.log")
}

/// Strip the severity/time/memory prefix, keeping the severity letter.
fn bodies(lines: &[String]) -> Vec<(char, String)> {
    lines
        .iter()
        .map(|l| match l.find("] ") {
            Some(i) => (l.chars().next().unwrap(), l[i + 2..].to_string()),
            None => (' ', l.clone()),
        })
        .collect()
}

#[test]
fn start_and_exit_lines() {
    let capture = Capture::default();
    let resources = Arc::new(FixedResources::job1());
    let subscriber = capture_subscriber(&capture, resources.clone());

    tracing::subscriber::with_default(subscriber, || {
        let job = JobGuard::begin(job1(), log_path(), resources);
        assert_eq!(job.log_path(), log_path().as_path());
        tracing::info!("working");
        job.finish();
    });

    let lines = bodies(&capture.lines());
    assert_eq!(
        lines[0],
        ('I', format!("logging to {}", log_path().display()))
    );
    assert_eq!(
        lines[1],
        ('I', "start job1: rustc 1.79.0 Linux, hostname host1, user 1000(batch)".to_string())
    );
    assert_eq!(lines[2], ('I', "invoked as: ./job1 --full".to_string()));
    assert_eq!(lines[3], (' ', String::new()));
    assert_eq!(lines[4], ('I', "working".to_string()));

    let (level, exit) = &lines[5];
    assert_eq!(*level, 'I');
    assert!(exit.starts_with("exit job1: pid 4242, real "), "{}", exit);
    assert!(
        exit.ends_with("s, user 0.10s, system 0.02s, read 2K, written 0, peak rss 2M"),
        "{}",
        exit
    );
    assert_eq!(lines.len(), 6);
}

#[test]
fn pending_failure_is_logged_before_the_summary() {
    let capture = Capture::default();
    let resources = Arc::new(FixedResources::job1());
    let subscriber = capture_subscriber(&capture, resources.clone());

    tracing::subscriber::with_default(subscriber, || {
        let job = JobGuard::begin(job1(), log_path(), resources);
        job.fail(ErrorReport::new("ValueError", "bad input").with_frame("file.ext", 10, Some("run")));
        drop(job);
    });

    let lines = bodies(&capture.lines());
    let n = lines.len();
    assert_eq!(lines[n - 3], ('E', "ValueError: bad input".to_string()));
    assert_eq!(lines[n - 2], ('E', "  file.ext:10 in run".to_string()));
    assert!(lines[n - 1].1.starts_with("exit job1: pid 4242"));
}

#[inline(never)]
fn record_timeout(job: &JobGuard) {
    job.fail(ErrorReport::new("Timeout", "upstream took too long"));
}

#[test]
fn fail_without_frames_records_the_call_stack() {
    let capture = Capture::default();
    let resources = Arc::new(FixedResources::job1());
    let subscriber = capture_subscriber(&capture, resources.clone());

    tracing::subscriber::with_default(subscriber, || {
        let job = JobGuard::begin(job1(), log_path(), resources);
        record_timeout(&job);
    });

    let errors = error_bodies(&capture.lines());
    assert_eq!(errors[0], "Timeout: upstream took too long");
    let frames = &errors[1..];
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|f| f.starts_with("  ") && f.contains(".rs:") && f.contains(" in ")));
    assert!(frames.iter().any(|f| f.contains("lifecycle_tests.rs:") && f.ends_with("::record_timeout")), "{:?}", frames);
}
#[test]
fn exit_runs_once() {
    let capture = Capture::default();
    let resources = Arc::new(FixedResources::job1());
    let subscriber = capture_subscriber(&capture, resources.clone());

    tracing::subscriber::with_default(subscriber, || {
        JobGuard::begin(job1(), log_path(), resources).finish();
    });

    let exits = capture.lines().iter().filter(|l| l.contains("] exit job1:")).count();
    assert_eq!(exits, 1);
}

fn error_bodies(lines: &[String]) -> Vec<String> {
    bodies(lines)
        .into_iter()
        .filter(|(level, _)| *level == 'E')
        .map(|(_, body)| body)
        .collect()
}

#[inline(never)]
fn inner_run() {
    panic!("bad input");
}

#[inline(never)]
fn outer_run() {
    inner_run();
}

#[test]
fn panic_while_unwinding_is_reported_with_its_trace() {
    install_panic_hook();
    let capture = Capture::default();
    let resources = Arc::new(FixedResources::job1());
    let subscriber = capture_subscriber(&capture, resources.clone());

    let worker = thread::Builder::new()
        .name("worker-7".into())
        .spawn(move || {
            tracing::subscriber::with_default(subscriber, || {
                let _job = JobGuard::begin(job1(), log_path(), resources);
                outer_run();
            });
        })
        .unwrap();
    assert!(worker.join().is_err());

    let lines = bodies(&capture.lines());
    assert!(lines.last().unwrap().1.starts_with("exit job1: pid 4242"));

    let errors = error_bodies(&capture.lines());
    assert_eq!(errors[0], "panic: bad input");
    let outer = errors.iter().position(|l| l.ends_with("::outer_run"));
    let inner = errors.iter().position(|l| l.ends_with("::inner_run"));
    assert!(outer.is_some() && inner.is_some(), "{:?}", errors);
    // Outermost call first, like a traceback.
    assert!(outer < inner);
    assert!(errors[1..].iter().all(|l| l.starts_with("  ") && l.contains(" in ")));
    assert!(!errors.iter().any(|l| l.contains("worker-7")));
}

#[test]
fn unsupported_platform_warns_once_and_zeroes_io() {
    let capture = Capture::default();
    let subscriber = capture_subscriber(&capture, Arc::new(FixedResources::job1()));

    let snapshot = tracing::subscriber::with_default(subscriber, || {
        Unsupported::new("plan9").capture()
    });

    assert_eq!(snapshot.bytes_read, 0);
    assert_eq!(snapshot.bytes_written, 0);
    let warnings: Vec<String> = capture.lines().into_iter().filter(|l| l.starts_with('W')).collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].ends_with("] (joblog) unable to read I/O stats: unsupported platform plan9"));
}

struct NothingReadable;

impl ResourceSnapshotProvider for NothingReadable {
    fn io_counters(&self) -> Result<IoCounters, ResourceError> {
        Err(ResourceError::UnsupportedPlatform("plan9"))
    }

    fn cpu_usage(&self) -> Result<CpuUsage, ResourceError> {
        Err(ResourceError::UnsupportedPlatform("plan9"))
    }
}

#[test]
fn nothing_readable_still_warns_once() {
    let capture = Capture::default();
    let subscriber = capture_subscriber(&capture, Arc::new(FixedResources::job1()));

    let snapshot = tracing::subscriber::with_default(subscriber, || NothingReadable.capture());

    assert_eq!(snapshot, ResourceSnapshot::default());
    let lines = capture.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with('W'));
    assert!(lines[0].ends_with(
        "] (joblog) unable to read resource usage or I/O stats: unsupported platform plan9"
    ));
}

#[test]
fn missing_proc_io_file_degrades_to_zero() {
    let dir = tempfile::tempdir().unwrap();
    let capture = Capture::default();
    let subscriber = capture_subscriber(&capture, Arc::new(FixedResources::job1()));

    let snapshot = tracing::subscriber::with_default(subscriber, || {
        ProcSelfIo::at(dir.path().join("io")).capture()
    });

    assert_eq!((snapshot.bytes_read, snapshot.bytes_written), (0, 0));
    let lines = capture.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with('W'));
    assert!(lines[0].contains("] (joblog) unable to read I/O stats: "));
}

#[test]
fn proc_io_file_is_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("io");
    std::fs::write(&path, "rchar: 3145728\nwchar: 1024\nsyscr: 5\n").unwrap();

    let io = ProcSelfIo::at(&path).io_counters().unwrap();
    assert_eq!((io.bytes_read, io.bytes_written), (3_145_728, 1024));
}
