//! Per-job cancellation and child process tracking.
//!
//! The caller only ever writes the cancel flag; the worker only ever
//! writes the child pid. Both are atomics, so no locking is needed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::process::kill_tree;

type Killer = Box<dyn Fn(u32) + Send + Sync>;

/// Shared between a running job and whoever may cancel it.
pub struct JobControl {
    cancelled: AtomicBool,
    child_pid: AtomicU32,
    kills: AtomicU32,
    killer: Killer,
}

impl fmt::Debug for JobControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobControl")
            .field("cancelled", &self.is_cancelled())
            .field("child_pid", &self.child_pid.load(Ordering::SeqCst))
            .field("kills", &self.kill_count())
            .finish()
    }
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl JobControl {
    pub fn new() -> Self {
        Self::with_killer(kill_tree)
    }

    /// Use a custom tree-kill function.
    pub fn with_killer(killer: impl Fn(u32) + Send + Sync + 'static) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            child_pid: AtomicU32::new(0),
            kills: AtomicU32::new(0),
            killer: Box::new(killer),
        }
    }

    /// Request cancellation. Idempotent and non-blocking.
    ///
    /// The first call kills the running child tree, if any. Returns whether
    /// this call was the one that flipped the flag.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::info!("Cancellation requested");
        self.kill_child();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Record the pid of the stage process that just started.
    ///
    /// If cancellation already happened the child is killed right away.
    pub fn attach_child(&self, pid: u32) {
        self.child_pid.store(pid, Ordering::SeqCst);
        if self.is_cancelled() {
            self.kill_child();
        }
    }

    /// Forget the current child once it has exited.
    pub fn detach_child(&self) {
        self.child_pid.store(0, Ordering::SeqCst);
    }

    /// Kill the current child tree. At most one kill per attached child.
    pub fn kill_child(&self) -> bool {
        let pid = self.child_pid.swap(0, Ordering::SeqCst);
        if pid == 0 {
            return false;
        }
        self.kills.fetch_add(1, Ordering::SeqCst);
        (self.killer)(pid);
        true
    }

    /// Number of tree kills issued so far.
    pub fn kill_count(&self) -> u32 {
        self.kills.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_control() -> (JobControl, Arc<Mutex<Vec<u32>>>) {
        let killed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&killed);
        let control = JobControl::with_killer(move |pid| sink.lock().unwrap().push(pid));
        (control, killed)
    }

    #[test]
    fn test_double_cancel_kills_once() {
        let (control, killed) = recording_control();
        control.attach_child(4242);
        assert!(control.cancel());
        assert!(!control.cancel());
        assert_eq!(*killed.lock().unwrap(), vec![4242]);
        assert_eq!(control.kill_count(), 1);
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let (control, killed) = recording_control();
        control.attach_child(7);
        control.detach_child();
        control.cancel();
        assert!(killed.lock().unwrap().is_empty());
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_child_started_after_cancel_is_killed() {
        let (control, killed) = recording_control();
        control.cancel();
        control.attach_child(99);
        assert_eq!(*killed.lock().unwrap(), vec![99]);
    }
}
