/// Environment variable names read by [`JoblogConfig::from_env`].
///
/// These are purely helpers; [`crate::init::start`] itself ignores the
/// environment and always uses the defaults.
///
/// [`JoblogConfig::from_env`]: crate::init::JoblogConfig::from_env

/// Directory the dated log tree is created under. Default `logs`.
pub const JOBLOG_ROOT_ENV: &str = "JOBLOG_ROOT";

/// Minimum level for the console sink, e.g. `warn`. Default `info`.
pub const JOBLOG_CONSOLE_LEVEL_ENV: &str = "JOBLOG_CONSOLE_LEVEL";

/// Set to `0` or `false` to disable the console sink.
pub const JOBLOG_CONSOLE_ENV: &str = "JOBLOG_CONSOLE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Interpret common spellings of a boolean flag.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
