//! Epoch-based progress reporting for long trace parses, mirroring
//! `original_source/common/ProgressTracker.h`: log a line every N records
//! instead of per-line, so stdout buffering doesn't hide slowness, and
//! instead of writing to a side file (the original's approach, needed
//! because it ran alongside a GUI), we just emit through `log` at `info`
//! level, which the CLI wires to stderr.

const DEFAULT_LOG_INTERVAL: u64 = 1_000_000;

pub struct ProgressTracker {
    records_seen: u64,
    log_interval: u64,
    label: String,
}

impl ProgressTracker {
    pub fn new(label: impl Into<String>) -> Self {
        ProgressTracker {
            records_seen: 0,
            log_interval: DEFAULT_LOG_INTERVAL,
            label: label.into(),
        }
    }

    #[cfg(test)]
    fn with_interval(label: impl Into<String>, interval: u64) -> Self {
        ProgressTracker {
            records_seen: 0,
            log_interval: interval,
            label: label.into(),
        }
    }

    /// Record that one more trace record was processed, logging a progress
    /// line whenever the counter crosses a multiple of `log_interval`.
    pub fn tick(&mut self) {
        self.records_seen += 1;
        if self.records_seen % self.log_interval == 0 {
            log::info!("{}: {} records processed", self.label, self.records_seen);
        }
    }

    pub fn finish(&self) {
        log::info!("{}: done, {} records processed", self.label, self.records_seen);
    }

    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate() {
        let mut tracker = ProgressTracker::with_interval("test", 2);
        tracker.tick();
        tracker.tick();
        tracker.tick();
        assert_eq!(tracker.records_seen(), 3);
    }
}
