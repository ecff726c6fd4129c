//! Check external tools and encoders.

use fragcut_common::AppConfig;
use fragcut_render_engine::encoder::parse_preference;
use fragcut_render_engine::process::free_disk_mb;
use fragcut_render_engine::{list_h264_encoders, resolve_binary, Encoder, FontCaptionBaker};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Fragcut System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;

    match resolve_binary(config.binaries.ffprobe.as_deref(), "ffprobe") {
        Ok(path) => println!("[OK] ffprobe: {}", path.display()),
        Err(e) => {
            println!("[FAIL] {e}");
            ready = false;
        }
    }

    let ffmpeg = match resolve_binary(config.binaries.ffmpeg.as_deref(), "ffmpeg") {
        Ok(path) => {
            println!("[OK] ffmpeg: {}", path.display());
            Some(path)
        }
        Err(e) => {
            println!("[FAIL] {e}");
            ready = false;
            None
        }
    };

    if let Some(ffmpeg) = ffmpeg {
        match list_h264_encoders(&ffmpeg).await {
            Ok(available) => {
                println!("[OK] H.264 encoders:");
                for encoder in Encoder::ALL {
                    let mark = if available.contains(&encoder) {
                        "available"
                    } else {
                        "missing"
                    };
                    println!("     {:<12} {mark}", encoder.name());
                }
                if !available.contains(&Encoder::X264) {
                    println!("[WARN] libx264 is missing; there is no software fallback");
                }
            }
            Err(e) => println!("[WARN] Could not list encoders: {e}"),
        }
    }

    match parse_preference(&config.encoding.preference) {
        Ok(order) => {
            let names: Vec<&str> = order.iter().map(|e| e.name()).collect();
            println!("[OK] Fallback order: {}", names.join(" -> "));
        }
        Err(e) => {
            println!("[FAIL] {e}");
            ready = false;
        }
    }

    if FontCaptionBaker::from_config(&config.caption).has_font() {
        println!("[OK] Caption font available");
    } else {
        println!("[WARN] No caption font; captions will be skipped");
    }

    let output_dir = &config.output.directory;
    match free_disk_mb(output_dir) {
        Some(free) if free < config.watchdog.min_free_disk_mb => {
            println!(
                "[WARN] Output volume has {free} MB free (minimum {} MB)",
                config.watchdog.min_free_disk_mb
            );
        }
        Some(free) => println!("[OK] Output volume: {free} MB free"),
        None => println!("[WARN] Could not read free space for {}", output_dir.display()),
    }

    println!();
    if ready {
        println!("Fragcut is ready.");
        Ok(())
    } else {
        Err(anyhow::anyhow!("Some required tools are missing. See above."))
    }
}
