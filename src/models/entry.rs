use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical column order shared by both store backends.
pub const COLUMNS: [&str; 6] = ["date", "steps", "sleep", "study", "comment", "ai_msg"];

/// One persisted daily activity entry. The log is append-only and rows carry
/// no identifier; insertion order is the only ordering.
///
/// Numeric fields deserialize leniently: both backends hand us loosely-typed
/// text (CSV cells, spreadsheet cells), and a corrupt cell must count as zero
/// rather than fail the whole read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub steps: u64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub sleep: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub study: f64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub ai_msg: String,
}

/// Aggregates recomputed from the full log on every read. Nothing
/// incremental is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStatus {
    pub entries: usize,
    pub total_steps: u64,
    pub total_study: f64,
}

impl LogStatus {
    pub fn from_records(records: &[ActivityRecord]) -> Self {
        Self {
            entries: records.len(),
            total_steps: records.iter().map(|r| r.steps).sum(),
            total_study: records.iter().map(|r| r.study).sum(),
        }
    }
}

/// POST /api/entries
#[derive(Debug, Deserialize)]
pub struct SubmitEntryRequest {
    /// Defaults to today (UTC). Dates are not unique; resubmitting the same
    /// day appends a second row.
    pub date: Option<NaiveDate>,
    pub steps: u64,
    pub sleep: f64,
    pub study: f64,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitEntryResponse {
    pub record: ActivityRecord,
    pub ai_msg: String,
    pub status: LogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub entries: Vec<ActivityRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: LogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

/// Lenient numeric coercion: unparseable or missing text counts as zero.
pub mod lenient {
    use serde::{Deserialize, Deserializer};

    pub fn u64_from_text(s: &str) -> u64 {
        s.trim().parse().unwrap_or(0)
    }

    pub fn f64_from_text(s: &str) -> f64 {
        s.trim().parse().unwrap_or(0.0)
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Ok(u64_from_text(&String::deserialize(d)?))
    }

    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(f64_from_text(&String::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, steps: u64, sleep: f64, study: f64) -> ActivityRecord {
        ActivityRecord {
            date: date.into(),
            steps,
            sleep,
            study,
            comment: String::new(),
            ai_msg: String::new(),
        }
    }

    #[test]
    fn test_status_over_empty_log() {
        let status = LogStatus::from_records(&[]);
        assert_eq!(status.entries, 0);
        assert_eq!(status.total_steps, 0);
        assert_eq!(status.total_study, 0.0);
    }

    #[test]
    fn test_status_sums_full_log() {
        let records = vec![
            record("2025-01-01", 3000, 7.0, 1.0),
            record("2025-01-02", 4000, 6.5, 2.0),
            record("2025-01-02", 1000, 8.0, 0.5),
        ];
        let status = LogStatus::from_records(&records);
        assert_eq!(status.entries, 3);
        assert_eq!(status.total_steps, 8000);
        assert!((status.total_study - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lenient_coercion_treats_garbage_as_zero() {
        assert_eq!(lenient::u64_from_text("5000"), 5000);
        assert_eq!(lenient::u64_from_text(" 5000 "), 5000);
        assert_eq!(lenient::u64_from_text("abc"), 0);
        assert_eq!(lenient::u64_from_text(""), 0);
        assert_eq!(lenient::u64_from_text("-3"), 0);
        assert_eq!(lenient::f64_from_text("7.5"), 7.5);
        assert_eq!(lenient::f64_from_text("n/a"), 0.0);
    }
}
