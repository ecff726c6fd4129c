//! Stage progress parsing and job-level progress accounting.

use std::sync::atomic::{AtomicU8, Ordering};

/// Accumulates `key=value` lines from `ffmpeg -progress`.
#[derive(Debug, Default, Clone)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub complete: bool,
}

impl ProgressState {
    /// Feed one line. Returns true on a `progress=` line, which closes a
    /// report block.
    pub fn update_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };
        match key {
            // Despite its name, out_time_ms is in microseconds too.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<f64>() {
                    if us >= 0.0 {
                        self.out_time_secs = us / 1_000_000.0;
                    }
                }
                false
            }
            "progress" => {
                self.complete = value.trim() == "end";
                true
            }
            _ => false,
        }
    }

    /// Percent of `expected_secs` covered, clamped to 0..=100.
    pub fn percent(&self, expected_secs: f64) -> u8 {
        if self.complete {
            return 100;
        }
        if !(expected_secs > 0.0) {
            return 0;
        }
        ((self.out_time_secs / expected_secs) * 100.0).clamp(0.0, 100.0) as u8
    }
}

/// Maps a stage's 0..=100 onto its slice of the job's overall progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressScaler {
    start: u8,
    end: u8,
}

impl ProgressScaler {
    pub const CORE: ProgressScaler = ProgressScaler { start: 0, end: 80 };
    pub const INTRO: ProgressScaler = ProgressScaler { start: 80, end: 90 };
    pub const ASSEMBLY: ProgressScaler = ProgressScaler { start: 90, end: 100 };

    pub fn new(start: u8, end: u8) -> Self {
        Self {
            start: start.min(end),
            end: end.min(100),
        }
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    pub fn scale(&self, stage_percent: u8) -> u8 {
        let span = (self.end - self.start) as u32;
        self.start + (span * stage_percent.min(100) as u32 / 100) as u8
    }
}

/// Drops any report that would move progress backwards.
#[derive(Debug, Default)]
pub struct MonotoneProgress {
    last: AtomicU8,
    started: std::sync::atomic::AtomicBool,
}

impl MonotoneProgress {
    /// Returns the value to publish, or `None` if it would not advance.
    ///
    /// The first report always passes so that 0 is published once.
    pub fn advance(&self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        if !self.started.swap(true, Ordering::SeqCst) {
            self.last.store(percent, Ordering::SeqCst);
            return Some(percent);
        }
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        (percent > previous).then_some(percent)
    }

    pub fn current(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}
