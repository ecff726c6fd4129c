pub mod check;
pub mod config;
pub mod plan;
pub mod probe;
pub mod process;

use std::path::Path;

use anyhow::Context;
use fragcut_job_model::ProcessingJob;

/// Read and validate a job file.
pub fn load_job(path: &Path) -> anyhow::Result<ProcessingJob> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {}", path.display()))?;
    let job: ProcessingJob = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse job file {}", path.display()))?;
    job.validate()
        .map_err(|e| anyhow::anyhow!("Invalid job: {e}"))?;
    Ok(job)
}
