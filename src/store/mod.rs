use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::Config;
use crate::models::entry::ActivityRecord;

pub mod csv;
pub mod sheets;

/// Persistence contract shared by both backend variants. The log is strictly
/// append-only: there is no update or delete.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Full log in insertion order. An empty or missing store yields an
    /// empty vec, never an error.
    async fn load(&self) -> Result<Vec<ActivityRecord>>;

    /// Appends one record at the end of the log.
    async fn append(&self, record: &ActivityRecord) -> Result<()>;

    /// Short backend label for logs and health output.
    fn backend_name(&self) -> &'static str;
}

/// Picks the backend once at startup: remote sheet when a service-account
/// credential is resolvable, local CSV otherwise. No runtime switching.
pub fn select_store(config: &Config) -> Arc<dyn ActivityStore> {
    let has_credentials = Path::new(&config.google_credentials_file).exists()
        || config.google_credentials_json.is_some();

    if has_credentials {
        tracing::info!(sheet = %config.sheet_name, "Using Google Sheets activity store");
        Arc::new(sheets::SheetStore::new(
            config.sheet_name.clone(),
            config.google_credentials_file.clone(),
            config.google_credentials_json.clone(),
        ))
    } else {
        tracing::info!(path = %config.csv_path, "Using local CSV activity store");
        Arc::new(csv::CsvStore::new(config.csv_path.clone()))
    }
}
