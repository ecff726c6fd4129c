//! Show what a job would run, without encoding anything.

use std::path::PathBuf;

use fragcut_common::AppConfig;
use fragcut_render_engine::Orchestrator;

use super::load_job;

pub async fn run(config: &AppConfig, job_path: PathBuf) -> anyhow::Result<()> {
    let job = load_job(&job_path)?;
    let orchestrator = Orchestrator::new(config)?;
    let plan = orchestrator.plan(&job).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
