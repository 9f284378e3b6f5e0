use joblog::ErrorReport;
use std::num::ParseIntError;
use tracing::info;

fn parse_day(raw: &str) -> Result<u32, ParseIntError> {
    raw.parse()
}

fn main() {
    let job = match joblog::start() {
        Ok(job) => job,
        Err(e) => {
            eprintln!("cannot start logging: {}", e);
            std::process::exit(2);
        }
    };

    let raw = std::env::args().nth(1).unwrap_or_else(|| "tomorrow".to_string());
    match parse_day(&raw) {
        Ok(day) => info!("running for day {}", day),
        Err(e) => {
            job.fail(ErrorReport::from_error(&e));
            drop(job);
            std::process::exit(1);
        }
    }
}
