//! Process lifecycle logging for batch jobs.
//!
//! Call [`start`] first thing in `main` and keep the returned guard alive:
//!
//! ```no_run
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let _job = joblog::start()?;
//!     tracing::info!("processing");
//!     Ok(())
//! }
//! ```
//!
//! Every line is written as `I0305 070809.125 [2M] message`, to stderr and
//! to `logs/YYYY/YYYYMM/YYYYMMDD/YYYYMMDD_HHMMSS_<program>_<pid>_<host>.log`.

pub mod env;
pub mod format;
pub mod identity;
pub mod init;
pub mod lifecycle;
pub mod path;
pub mod record;
pub mod resource;
pub mod size;

pub use init::{start, start_with_config, InitError, JoblogConfig};
pub use lifecycle::JobGuard;
pub use record::ErrorReport;
pub use size::format_size;
