//! Fetch progress reporting.
//!
//! A report is due whenever the whole-percent value changes, or every
//! [`UNKNOWN_TOTAL_STEP`] bytes when the source does not know its size.
//! Every due report is also a cancellation checkpoint.

/// Report interval in bytes for sources without a known length.
pub const UNKNOWN_TOTAL_STEP: u64 = 1024 * 1024;

/// One due progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub bytes_done: u64,
    /// Whole percent, when the total is known.
    pub percent: Option<u8>,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    last_percent: Option<u8>,
    last_report_bytes: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the current byte count. Returns a checkpoint when a report is due.
    pub fn observe(&mut self, bytes_done: u64, total: Option<u64>) -> Option<Checkpoint> {
        match total.filter(|t| *t > 0) {
            Some(total) => {
                let percent = percent(bytes_done, total);
                if self.last_percent == Some(percent) {
                    return None;
                }
                self.last_percent = Some(percent);
                Some(Checkpoint {
                    bytes_done,
                    percent: Some(percent),
                })
            }
            None => {
                if bytes_done < self.last_report_bytes + UNKNOWN_TOTAL_STEP {
                    return None;
                }
                self.last_report_bytes = bytes_done;
                Some(Checkpoint {
                    bytes_done,
                    percent: None,
                })
            }
        }
    }
}

fn percent(done: u64, total: u64) -> u8 {
    (done.saturating_mul(100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_percent() {
        let mut t = ProgressTracker::new();
        assert_eq!(t.observe(0, Some(1000)).unwrap().percent, Some(0));
        assert!(t.observe(5, Some(1000)).is_none());
        assert_eq!(t.observe(10, Some(1000)).unwrap().percent, Some(1));
        assert!(t.observe(19, Some(1000)).is_none());
        assert_eq!(t.observe(1000, Some(1000)).unwrap().percent, Some(100));
    }

    #[test]
    fn unknown_total_reports_by_step() {
        let mut t = ProgressTracker::new();
        assert!(t.observe(10, None).is_none());
        let cp = t.observe(UNKNOWN_TOTAL_STEP, None).unwrap();
        assert_eq!(cp.percent, None);
        assert!(t.observe(UNKNOWN_TOTAL_STEP + 1, None).is_none());
        assert!(t.observe(2 * UNKNOWN_TOTAL_STEP, None).is_some());
    }

    #[test]
    fn zero_total_counts_as_unknown() {
        let mut t = ProgressTracker::new();
        assert!(t.observe(0, Some(0)).is_none());
    }

    #[test]
    fn percent_clamps_overrun() {
        assert_eq!(percent(150, 100), 100);
    }
}
