//! Credential health reporting
//!
//! The dispatcher reports every classified success or failure here,
//! fire-and-forget. The boundary layer (dashboards, the dev panel) decides
//! what to do with the signal; this crate only keeps the running record.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Outcome of one dispatch, from the credential's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    Success,
    Failure,
}

/// Collaborator that consumes health reports. Implementations must return
/// promptly; the dispatcher never awaits or inspects the result.
pub trait HealthReporter: Send + Sync {
    fn report_status(&self, nickname: &str, provider: &str, outcome: HealthOutcome, detail: &str);
}

/// Running health record for one credential nickname.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub nickname: String,
    pub provider: String,
    pub last_outcome: HealthOutcome,
    pub last_checked: DateTime<Utc>,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_error: String,
}

/// Default reporter: keeps per-nickname counters in memory and logs
/// transitions through the `log` facade.
#[derive(Default)]
pub struct LogHealthReporter {
    records: Mutex<HashMap<String, HealthRecord>>,
}

impl LogHealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, for status displays.
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }
}

impl HealthReporter for LogHealthReporter {
    fn report_status(&self, nickname: &str, provider: &str, outcome: HealthOutcome, detail: &str) {
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(nickname.to_string())
            .or_insert_with(|| HealthRecord {
                nickname: nickname.to_string(),
                provider: provider.to_string(),
                last_outcome: outcome,
                last_checked: Utc::now(),
                success_count: 0,
                failure_count: 0,
                last_error: String::new(),
            });

        record.last_outcome = outcome;
        record.last_checked = Utc::now();
        match outcome {
            HealthOutcome::Success => {
                record.success_count += 1;
                record.last_error.clear();
                log::debug!("health: '{}' ({}) ok", nickname, provider);
            }
            HealthOutcome::Failure => {
                record.failure_count += 1;
                record.last_error = detail.to_string();
                log::warn!(
                    "health: '{}' ({}) failed: {}",
                    nickname,
                    provider,
                    detail
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_nickname() {
        let reporter = LogHealthReporter::new();
        reporter.report_status("PRIMARY", "Gemini", HealthOutcome::Success, "");
        reporter.report_status("PRIMARY", "Gemini", HealthOutcome::Failure, "quota");
        reporter.report_status("ALT", "Gemini", HealthOutcome::Success, "");

        let mut records = reporter.snapshot();
        records.sort_by(|a, b| a.nickname.cmp(&b.nickname));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].nickname, "ALT");
        assert_eq!(records[0].success_count, 1);
        assert_eq!(records[1].nickname, "PRIMARY");
        assert_eq!(records[1].success_count, 1);
        assert_eq!(records[1].failure_count, 1);
        assert_eq!(records[1].last_error, "quota");
        assert_eq!(records[1].last_outcome, HealthOutcome::Failure);
    }

    #[test]
    fn success_clears_the_last_error() {
        let reporter = LogHealthReporter::new();
        reporter.report_status("PRIMARY", "Gemini", HealthOutcome::Failure, "boom");
        reporter.report_status("PRIMARY", "Gemini", HealthOutcome::Success, "");

        let records = reporter.snapshot();
        assert_eq!(records[0].last_error, "");
        assert_eq!(records[0].last_outcome, HealthOutcome::Success);
    }
}
