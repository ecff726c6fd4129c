//! Render a job end to end.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fragcut_common::AppConfig;
use fragcut_job_model::ProcessingResult;
use fragcut_render_engine::{ChannelObserver, JobEvent, Orchestrator};

use super::load_job;

pub async fn run(config: &AppConfig, job_path: PathBuf, json: bool) -> anyhow::Result<()> {
    let job = load_job(&job_path)?;
    let orchestrator = Orchestrator::new(config)?;

    let (observer, mut events) = ChannelObserver::channel();
    let handle = orchestrator.submit(job, Arc::new(observer))?;
    let job_id = handle.id();
    if !json {
        println!("Processing {} (job {job_id})", job_path.display());
        println!("  Output directory: {}", config.output.directory.display());
    }

    let waiter = tokio::task::spawn_blocking(move || handle.wait());
    let mut cancel_sent = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    render_event(&event, json)?;
                    if matches!(event, JobEvent::Complete { .. }) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel_sent => {
                cancel_sent = true;
                eprintln!("\nCancelling job {job_id}...");
                orchestrator.cancel(job_id);
            }
        }
    }

    let result = waiter.await?;
    if result.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{}",
            result
                .error_message
                .unwrap_or_else(|| "processing failed".to_string())
        ))
    }
}

fn render_event(event: &JobEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        JobEvent::Progress { percent, phase, .. } => {
            print!("\r  {phase}: {percent:>3}%   ");
            std::io::stdout().flush()?;
        }
        JobEvent::Status { state, message, .. } => {
            println!("\n[{state}] {message}");
        }
        JobEvent::Complete { result, .. } => print_result(result),
    }
    Ok(())
}

fn print_result(result: &ProcessingResult) {
    println!();
    if let Some(path) = &result.output_path {
        println!("Done: {}", path.display());
        println!(
            "  Size: {:.1} MB",
            result.output_size_bytes as f64 / (1024.0 * 1024.0)
        );
        if let Some(encoder) = &result.encoder {
            println!("  Encoder: {encoder}");
        }
    } else if let Some(message) = &result.error_message {
        println!("Failed: {message}");
    }
    println!("  Time: {:.1}s", result.processing_time_s);
}
