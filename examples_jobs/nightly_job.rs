use std::io::Write;
use tracing::{debug, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let job = joblog::start_with_config(joblog::JoblogConfig::from_env())?;

    let scratch = tempfile_path();
    let mut out = std::fs::File::create(&scratch)?;
    for batch in 0..8u32 {
        let rows = vec![batch as u8; 256 * 1024];
        out.write_all(&rows)?;
        debug!(batch, bytes = rows.len(), "wrote batch");
    }
    out.sync_all()?;
    info!("wrote {} to {}", joblog::format_size(8 * 256 * 1024), scratch.display());

    if std::fs::remove_file(&scratch).is_err() {
        warn!("could not remove {}", scratch.display());
    }

    info!("done after {:?}", job.elapsed());
    Ok(())
}

fn tempfile_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("nightly_job_{}.bin", std::process::id()))
}
