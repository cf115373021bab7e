//! Boot timing records

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// One timed step of the boot sequence
#[derive(Debug, Clone, Serialize)]
pub struct TimingRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Default)]
pub struct BootTiming {
    records: Mutex<Vec<TimingRecord>>,
}

impl BootTiming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a record and return its index
    pub fn start(&self, name: impl Into<String>) -> usize {
        let mut records = self.records.lock();
        records.push(TimingRecord {
            name: name.into(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        });
        records.len() - 1
    }

    /// Close the record at `index`; closing twice keeps the first end time
    pub fn end(&self, index: usize) {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(index) {
            if record.finished_at.is_none() {
                let now = Utc::now();
                record.duration_ms = Some((now - record.started_at).num_milliseconds());
                record.finished_at = Some(now);
            }
        }
    }

    /// Close the most recent open record named `name`
    pub fn end_named(&self, name: &str) {
        let index = self
            .records
            .lock()
            .iter()
            .rposition(|r| r.name == name && r.finished_at.is_none());
        if let Some(index) = index {
            self.end(index);
        }
    }

    pub fn records(&self) -> Vec<TimingRecord> {
        self.records.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_end() {
        let timing = BootTiming::new();
        let index = timing.start("config_will_load");
        timing.start("did_load");
        timing.end(index);
        timing.end_named("did_load");

        let records = timing.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.finished_at.is_some()));
        assert!(records[0].duration_ms.unwrap() >= 0);
    }

    #[test]
    fn test_end_unknown_is_ignored() {
        let timing = BootTiming::new();
        timing.end(3);
        timing.end_named("missing");
        assert!(timing.records().is_empty());
    }
}
