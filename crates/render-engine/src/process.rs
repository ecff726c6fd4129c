//! Child process plumbing: background spawning, tree kills, disk space.

use std::path::Path;

/// `CREATE_NO_WINDOW`: no console window for the child.
#[cfg(windows)]
pub const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// `CREATE_NEW_PROCESS_GROUP`: the child gets its own group for tree kills.
#[cfg(windows)]
pub const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Configure a command to run detached from any console.
///
/// On Unix the child leads a new process group so [`kill_tree`] can take
/// down everything it spawned. On Windows no console window is created.
pub fn configure_background(cmd: &mut tokio::process::Command) {
    cmd.stdin(std::process::Stdio::null());

    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    #[cfg(windows)]
    {
        cmd.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
    }
}

/// Forcefully kill a process and all of its descendants.
#[cfg(unix)]
pub fn kill_tree(pid: u32) {
    if pid == 0 {
        return;
    }
    // The child was spawned as a group leader, so its pgid equals its pid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pid, error = %err, "Failed to kill process group");
        }
    } else {
        tracing::debug!(pid, "Killed process group");
    }
}

/// Forcefully kill a process and all of its descendants.
#[cfg(windows)]
pub fn kill_tree(pid: u32) {
    use std::os::windows::process::CommandExt;

    if pid == 0 {
        return;
    }
    let result = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status();
    match result {
        Ok(status) if status.success() => tracing::debug!(pid, "Killed process tree"),
        Ok(status) => tracing::debug!(pid, code = ?status.code(), "taskkill reported failure"),
        Err(e) => tracing::warn!(pid, error = %e, "Failed to run taskkill"),
    }
}

/// Free space available to this user on the volume holding `path`, in MB.
///
/// Walks up to the nearest existing ancestor. `None` when it cannot be
/// determined.
pub fn free_disk_mb(path: &Path) -> Option<u64> {
    let existing = path.ancestors().find(|p| p.exists())?;
    free_bytes(existing).map(|bytes| bytes / (1024 * 1024))
}

#[cfg(unix)]
fn free_bytes(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    Some(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(windows)]
fn free_bytes(path: &Path) -> Option<u64> {
    use windows::core::{HSTRING, PCWSTR};
    use windows::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

    let dir = HSTRING::from(path.as_os_str());
    let mut available: u64 = 0;
    unsafe {
        GetDiskFreeSpaceExW(
            PCWSTR(dir.as_ptr()),
            Some(&mut available as *mut u64),
            None,
            None,
        )
    }
    .ok()?;
    Some(available)
}

#[cfg(not(any(unix, windows)))]
fn free_bytes(_path: &Path) -> Option<u64> {
    None
}
