use std::ffi::OsString;
use std::path::Path;

/// Facts about the running process, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    /// argv[0] without directory or extension.
    pub program: String,
    pub pid: u32,
    pub hostname: String,
    pub uid: u32,
    pub user: String,
    /// Compiler the binary was built with, e.g. `rustc 1.79.0`.
    pub runtime: String,
    /// Kernel name as `uname -s` prints it, e.g. `Linux`.
    pub os: String,
    pub argv: Vec<String>,
}

impl ProcessIdentity {
    pub fn resolve() -> Self {
        let argv: Vec<String> = std::env::args_os()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let program = argv.first().map(|a| program_name(a)).unwrap_or_default();
        let uid = current_uid();

        Self {
            program,
            pid: std::process::id(),
            hostname: hostname(),
            uid,
            user: user_name(uid),
            runtime: format!("rustc {}", rustc_version_runtime::version()),
            os: os_name(),
            argv,
        }
    }

    /// The `start ...` line logged once the sinks are up.
    pub fn start_line(&self) -> String {
        format!(
            "start {}: {} {}, hostname {}, user {}({})",
            self.program, self.runtime, self.os, self.hostname, self.uid, self.user
        )
    }

    /// The command line as typed, space separated.
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// `/usr/local/bin/job1.py` -> `job1`.
pub fn program_name(argv0: &str) -> String {
    Path::new(argv0)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h: OsString| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(unix))]
fn hostname() -> String {
    std::env::var_os("COMPUTERNAME")
        .or_else(|| std::env::var_os("HOSTNAME"))
        .and_then(|h: OsString| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn os_name() -> String {
    nix::sys::utsname::uname()
        .ok()
        .and_then(|u| u.sysname().to_str().map(str::to_string))
        .unwrap_or_else(|| capitalized(std::env::consts::OS))
}

#[cfg(not(unix))]
fn os_name() -> String {
    capitalized(std::env::consts::OS)
}

/// `windows` -> `Windows`.
fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(unix)]
fn current_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}

#[cfg(unix)]
fn user_name(uid: u32) -> String {
    use nix::unistd::{Uid, User};

    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => fallback_user_name(),
    }
}

#[cfg(not(unix))]
fn user_name(_uid: u32) -> String {
    fallback_user_name()
}

fn fallback_user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "?".to_string())
}
