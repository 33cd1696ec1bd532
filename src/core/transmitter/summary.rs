//! Export summary

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of one poll export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    /// Window start (inclusive)
    pub window_start: Option<DateTime<Utc>>,

    /// Window end (exclusive)
    pub window_end: Option<DateTime<Utc>>,

    /// Source records matched by the window query
    pub records_found: usize,

    /// Items inside successfully published envelopes
    pub published: usize,

    /// Envelopes published
    pub chunks: usize,

    /// Rate-limit pauses taken
    pub pauses: usize,

    /// Records out of scope for export
    pub skipped: usize,

    /// Records whose transform or publish failed
    pub failed: usize,

    pub duration: Duration,
}

impl ExportSummary {
    pub fn new(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            window_start: Some(window_start),
            window_end: Some(window_end),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn is_successful(&self) -> bool {
        self.failed == 0
    }

    /// Merges another run into this one; the window spans both
    pub fn absorb(&mut self, other: &ExportSummary) {
        self.window_start = match (self.window_start, other.window_start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.window_end = match (self.window_end, other.window_end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.records_found += other.records_found;
        self.published += other.published;
        self.chunks += other.chunks;
        self.pauses += other.pauses;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.duration += other.duration;
    }

    pub fn log_summary(&self) {
        tracing::info!(
            window_start = ?self.window_start,
            window_end = ?self.window_end,
            records_found = self.records_found,
            published = self.published,
            chunks = self.chunks,
            pauses = self.pauses,
            skipped = self.skipped,
            failed = self.failed,
            duration_ms = self.duration.as_millis() as u64,
            "Export finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_absorb_widens_window() {
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();

        let mut total = ExportSummary::new(t2, t3);
        total.published = 4;
        let mut earlier = ExportSummary::new(t1, t2);
        earlier.published = 6;
        earlier.failed = 1;

        total.absorb(&earlier);
        assert_eq!(total.window_start, Some(t1));
        assert_eq!(total.window_end, Some(t3));
        assert_eq!(total.published, 10);
        assert!(!total.is_successful());
    }
}
