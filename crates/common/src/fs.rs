//! Output naming and publishing helpers.
//!
//! Finished videos are rendered inside a per-job temp directory and only
//! moved into the user-visible output directory once complete. The temp
//! directory may live on a different filesystem, so moves fall back to
//! copy-and-rename when a plain rename fails with EXDEV.

use std::path::{Path, PathBuf};

use crate::error::FragcutResult;

/// Smallest `<dir>/<stem>-<n>.mp4` (n >= 1) that does not exist yet.
pub fn next_output_path(dir: &Path, stem: &str) -> PathBuf {
    let mut n: u32 = 1;
    loop {
        let candidate = dir.join(format!("{stem}-{n}.mp4"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// The destination's parent directory is created if needed. On a
/// cross-device move the data is copied to `<dst>.tmp` first and renamed
/// into place, so `dst` never holds a partially written file.
pub fn move_file(src: &Path, dst: &Path) -> FragcutResult<()> {
    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, falling back to copy"
            );
            copy_and_delete(src, dst)
        }
        Err(e) => Err(e.into()),
    }
}

/// EXDEV is 18 on Linux and macOS; Windows reports ERROR_NOT_SAME_DEVICE (17).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    if cfg!(windows) {
        e.raw_os_error() == Some(17)
    } else {
        e.raw_os_error() == Some(18)
    }
}

fn copy_and_delete(src: &Path, dst: &Path) -> FragcutResult<()> {
    let tmp_dst = dst.with_extension("tmp");
    std::fs::copy(src, &tmp_dst)?;

    if let Err(e) = std::fs::rename(&tmp_dst, dst) {
        let _ = std::fs::remove_file(&tmp_dst);
        return Err(e.into());
    }

    if let Err(e) = std::fs::remove_file(src) {
        tracing::warn!(path = %src.display(), error = %e, "Failed to remove source after copy");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_next_output_path_skips_existing_numbers() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            next_output_path(dir.path(), "Fortnite-Video"),
            dir.path().join("Fortnite-Video-1.mp4")
        );

        std::fs::write(dir.path().join("Fortnite-Video-1.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("Fortnite-Video-2.mp4"), b"x").unwrap();
        assert_eq!(
            next_output_path(dir.path(), "Fortnite-Video"),
            dir.path().join("Fortnite-Video-3.mp4")
        );
    }

    #[test]
    fn test_move_file_creates_parent_and_removes_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("final.mp4");
        let dst = dir.path().join("out").join("Fortnite-Video-1.mp4");
        std::fs::write(&src, b"video").unwrap();

        move_file(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"video");
    }

    #[test]
    fn test_cross_device_detection() {
        let code = if cfg!(windows) { 17 } else { 18 };
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(code)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}
