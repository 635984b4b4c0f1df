use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::entry::ActivityRecord;

use super::ActivityStore;

/// Local-file backend: one CSV file holding the whole log.
///
/// Every append re-reads the current contents and rewrites the file in full.
/// That is a known scaling limit, not a correctness requirement — the log is
/// a personal daily journal, a handful of rows per week. There is no file
/// locking; under concurrent writers the last one wins.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<Vec<ActivityRecord>> {
        // First run: no file yet is an empty log, not an error.
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;

        let mut records = Vec::new();
        for row in reader.deserialize() {
            match row {
                Ok(record) => records.push(record),
                Err(e) => {
                    // Tolerate a mangled row instead of losing the whole log.
                    tracing::warn!(path = %self.path.display(), error = %e, "Skipping unreadable CSV row");
                }
            }
        }
        Ok(records)
    }

    fn write_all(&self, records: &[ActivityRecord]) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("writing {}", self.path.display()))?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for CsvStore {
    async fn load(&self) -> Result<Vec<ActivityRecord>> {
        self.read_all()
    }

    async fn append(&self, record: &ActivityRecord) -> Result<()> {
        let mut records = self.read_all()?;
        records.push(record.clone());
        self.write_all(&records)
    }

    fn backend_name(&self) -> &'static str {
        "csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, steps: u64, comment: &str) -> ActivityRecord {
        ActivityRecord {
            date: date.into(),
            steps,
            sleep: 7.0,
            study: 1.0,
            comment: comment.into(),
            ai_msg: "nice work".into(),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> CsvStore {
        CsvStore::new(dir.path().join("activity_log.csv"))
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let records = store.load().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_append_then_load_returns_record_last() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.append(&record("2025-03-01", 3000, "gym")).await.unwrap();
        store
            .append(&record("2025-03-02", 5000, "ran today"))
            .await
            .unwrap();

        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], record("2025-03-02", 5000, "ran today"));
    }

    #[tokio::test]
    async fn test_first_append_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity_log.csv");
        let store = CsvStore::new(path.clone());

        store.append(&record("2025-03-01", 100, "")).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("date,steps,sleep,study,comment,ai_msg"));
    }

    #[tokio::test]
    async fn test_comment_with_commas_and_newlines_survives() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let tricky = record("2025-03-01", 42, "gym, then \"sushi\"\ntired");

        store.append(&tricky).await.unwrap();

        let records = store.load().await.unwrap();
        assert_eq!(records[0].comment, tricky.comment);
    }

    #[tokio::test]
    async fn test_corrupt_numeric_cell_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity_log.csv");
        std::fs::write(
            &path,
            "date,steps,sleep,study,comment,ai_msg\n2025-03-01,abc,7.0,1.0,hi,msg\n",
        )
        .unwrap();

        let store = CsvStore::new(path);
        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].steps, 0);
        assert_eq!(records[0].sleep, 7.0);
    }
}
