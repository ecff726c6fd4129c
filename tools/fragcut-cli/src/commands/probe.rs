//! Probe a video file.

use std::path::PathBuf;
use std::time::Duration;

use fragcut_common::AppConfig;
use fragcut_render_engine::{resolve_binary, FfprobeProber, MediaProbe};

pub async fn run(config: &AppConfig, path: PathBuf, json: bool) -> anyhow::Result<()> {
    let ffprobe = resolve_binary(config.binaries.ffprobe.as_deref(), "ffprobe")?;
    let prober = FfprobeProber::new(ffprobe).with_timeout(Duration::from_secs(
        config.watchdog.probe_timeout_secs.max(1),
    ));

    let info = prober.probe_video(&path).await?;
    let audio_kbps = prober.probe_audio_bitrate(&path).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "video": info,
                "audio_kbps": audio_kbps,
            }))?
        );
        return Ok(());
    }

    println!("File: {}", path.display());
    println!("  Duration: {:.3}s", info.duration_secs);
    println!(
        "  Video: {}x{} @ {} ({:.3} fps)",
        info.width,
        info.height,
        info.fps_expr,
        info.fps()
    );
    match (info.has_audio, audio_kbps) {
        (true, Some(kbps)) => println!("  Audio: {kbps} kbps"),
        (true, None) => println!("  Audio: present, bitrate unknown"),
        (false, _) => println!("  Audio: none"),
    }
    if info.size_bytes > 0 {
        println!(
            "  Size: {:.1} MB",
            info.size_bytes as f64 / (1024.0 * 1024.0)
        );
    }
    Ok(())
}
