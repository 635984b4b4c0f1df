use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::entry::{lenient, ActivityRecord, COLUMNS};

use super::ActivityStore;

const OAUTH_SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.file";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Remote backend: a Google spreadsheet with a fixed name, first worksheet.
///
/// Authorization and sheet lookup happen again on every call — no cached
/// token, no persistent connection. Row-append atomicity is whatever the
/// Sheets API provides; this side never coordinates writers.
pub struct SheetStore {
    sheet_name: String,
    credentials_file: String,
    credentials_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

/// OAuth2 JWT-bearer grant claims (RFC 7523).
#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// One call's worth of connection state.
struct SheetSession {
    http: reqwest::Client,
    access_token: String,
    spreadsheet_id: String,
}

impl SheetStore {
    pub fn new(
        sheet_name: String,
        credentials_file: String,
        credentials_json: Option<String>,
    ) -> Self {
        Self {
            sheet_name,
            credentials_file,
            credentials_json,
        }
    }

    /// Two-step credential lookup: the local key file wins when present
    /// (dev mode), otherwise the env-provided secret bundle (deployed mode).
    fn read_credentials(&self) -> Result<ServiceAccountKey> {
        let raw = if Path::new(&self.credentials_file).exists() {
            std::fs::read_to_string(&self.credentials_file)
                .with_context(|| format!("reading {}", self.credentials_file))?
        } else if let Some(json) = &self.credentials_json {
            json.clone()
        } else {
            bail!(
                "no service-account credential: {} missing and GOOGLE_SERVICE_ACCOUNT_JSON unset",
                self.credentials_file
            );
        };

        serde_json::from_str(&raw).context("parsing service-account key JSON")
    }

    async fn fetch_access_token(
        &self,
        http: &reqwest::Client,
        key: &ServiceAccountKey,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = GrantClaims {
            iss: &key.client_email,
            scope: OAUTH_SCOPES,
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(60)).timestamp(),
        };

        let assertion = encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                .context("parsing service-account private key")?,
        )
        .context("signing service-account JWT")?;

        let response = http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("requesting OAuth access token")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("OAuth token error {}: {}", status, body);
        }

        let token: TokenResponse = response.json().await.context("decoding OAuth response")?;
        Ok(token.access_token)
    }

    /// Resolves the spreadsheet id from its fixed name via the Drive API.
    async fn lookup_spreadsheet(&self, http: &reqwest::Client, token: &str) -> Result<String> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            self.sheet_name.replace('\'', "\\'"),
            SPREADSHEET_MIME,
        );

        let response = http
            .get("https://www.googleapis.com/drive/v3/files")
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("pageSize", "1")])
            .send()
            .await
            .context("listing Drive files")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Drive API error {}: {}", status, body);
        }

        let list: FileList = response.json().await.context("decoding Drive response")?;
        match list.files.into_iter().next() {
            Some(file) => Ok(file.id),
            None => bail!("spreadsheet '{}' not found", self.sheet_name),
        }
    }

    async fn connect(&self) -> Result<SheetSession> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let key = self.read_credentials()?;
        let access_token = self.fetch_access_token(&http, &key).await?;
        let spreadsheet_id = self.lookup_spreadsheet(&http, &access_token).await?;

        Ok(SheetSession {
            http,
            access_token,
            spreadsheet_id,
        })
    }
}

impl SheetSession {
    fn values_url(&self, suffix: &str) -> String {
        // A bare range addresses the first worksheet.
        format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}",
            self.spreadsheet_id, suffix
        )
    }

    async fn fetch_values(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let response = self
            .http
            .get(self.values_url(range))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("fetching sheet values")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Sheets API error {}: {}", status, body);
        }

        let range: ValueRange = response.json().await.context("decoding sheet values")?;
        Ok(range.values)
    }

    async fn append_row(&self, row: Vec<Value>) -> Result<()> {
        let response = self
            .http
            .post(format!(
                "{}:append?valueInputOption=USER_ENTERED",
                self.values_url("A:F")
            ))
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": [row] }))
            .send()
            .await
            .context("appending sheet row")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Sheets API error {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for SheetStore {
    async fn load(&self) -> Result<Vec<ActivityRecord>> {
        let session = self.connect().await?;
        let rows = session.fetch_values("A:F").await?;
        Ok(records_from_rows(&rows))
    }

    async fn append(&self, record: &ActivityRecord) -> Result<()> {
        let session = self.connect().await?;

        // A blank sheet gets the canonical header before its first row.
        if session.fetch_values("1:1").await?.is_empty() {
            session
                .append_row(COLUMNS.iter().map(|c| json!(c)).collect())
                .await?;
        }

        session
            .append_row(vec![
                json!(record.date),
                json!(record.steps),
                json!(record.sleep),
                json!(record.study),
                json!(record.comment),
                json!(record.ai_msg),
            ])
            .await
    }

    fn backend_name(&self) -> &'static str {
        "sheets"
    }
}

/// Maps the sheet's header row to field names and coerces the data rows.
/// Cell values arrive loosely typed; unparseable numerics count as zero so a
/// single corrupt cell never poisons the whole read.
fn records_from_rows(rows: &[Vec<Value>]) -> Vec<ActivityRecord> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };

    let index_of = |name: &str| {
        header
            .iter()
            .position(|cell| cell_text(cell).trim().eq_ignore_ascii_case(name))
    };
    let columns: Vec<Option<usize>> = COLUMNS.iter().map(|name| index_of(name)).collect();

    let cell = |row: &[Value], col: usize| -> String {
        columns[col]
            .and_then(|i| row.get(i))
            .map(cell_text)
            .unwrap_or_default()
    };

    data.iter()
        .map(|row| ActivityRecord {
            date: cell(row, 0),
            steps: lenient::u64_from_text(&cell(row, 1)),
            sleep: lenient::f64_from_text(&cell(row, 2)),
            study: lenient::f64_from_text(&cell(row, 3)),
            comment: cell(row, 4),
            ai_msg: cell(row, 5),
        })
        .collect()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::LogStatus;

    fn row(cells: &[&str]) -> Vec<Value> {
        cells.iter().map(|c| json!(c)).collect()
    }

    #[test]
    fn test_empty_sheet_yields_no_records() {
        assert!(records_from_rows(&[]).is_empty());
        // Header only, no data rows.
        let rows = vec![row(&["date", "steps", "sleep", "study", "comment", "ai_msg"])];
        assert!(records_from_rows(&rows).is_empty());
    }

    #[test]
    fn test_header_mapping_follows_sheet_order() {
        let rows = vec![
            row(&["steps", "date", "comment", "sleep", "study", "ai_msg"]),
            row(&["5000", "2025-03-01", "ran today", "7", "1.5", "nice!"]),
        ];
        let records = records_from_rows(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "2025-03-01");
        assert_eq!(records[0].steps, 5000);
        assert_eq!(records[0].sleep, 7.0);
        assert_eq!(records[0].study, 1.5);
        assert_eq!(records[0].comment, "ran today");
    }

    #[test]
    fn test_corrupt_cell_counts_as_zero_in_totals() {
        let rows = vec![
            row(&["date", "steps", "sleep", "study", "comment", "ai_msg"]),
            row(&["2025-03-01", "3000", "7", "1", "", ""]),
            row(&["2025-03-02", "abc", "8", "2", "", ""]),
        ];
        let records = records_from_rows(&rows);
        assert_eq!(records[1].steps, 0);

        let status = LogStatus::from_records(&records);
        assert_eq!(status.entries, 2);
        assert_eq!(status.total_steps, 3000);
    }

    #[test]
    fn test_short_rows_pad_with_defaults() {
        let rows = vec![
            row(&["date", "steps", "sleep", "study", "comment", "ai_msg"]),
            row(&["2025-03-01", "1200"]),
        ];
        let records = records_from_rows(&rows);
        assert_eq!(records[0].steps, 1200);
        assert_eq!(records[0].sleep, 0.0);
        assert_eq!(records[0].comment, "");
    }

    #[test]
    fn test_numeric_cells_need_not_be_strings() {
        let rows = vec![
            row(&["date", "steps", "sleep", "study", "comment", "ai_msg"]),
            vec![
                json!("2025-03-01"),
                json!(4200),
                json!(6.5),
                json!(2),
                json!(""),
                json!(""),
            ],
        ];
        let records = records_from_rows(&rows);
        assert_eq!(records[0].steps, 4200);
        assert_eq!(records[0].sleep, 6.5);
        assert_eq!(records[0].study, 2.0);
    }

    #[test]
    fn test_credential_file_preferred_over_env_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.json");
        std::fs::write(
            &path,
            r#"{"client_email":"file@example.iam.gserviceaccount.com","private_key":"pem"}"#,
        )
        .unwrap();

        let store = SheetStore::new(
            "activity-log".into(),
            path.to_string_lossy().into_owned(),
            Some(r#"{"client_email":"env@example.iam.gserviceaccount.com","private_key":"pem"}"#.into()),
        );
        let key = store.read_credentials().unwrap();
        assert_eq!(key.client_email, "file@example.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_env_bundle_used_when_file_missing() {
        let store = SheetStore::new(
            "activity-log".into(),
            "/nonexistent/sa.json".into(),
            Some(r#"{"client_email":"env@example.iam.gserviceaccount.com","private_key":"pem"}"#.into()),
        );
        let key = store.read_credentials().unwrap();
        assert_eq!(key.client_email, "env@example.iam.gserviceaccount.com");
    }

    #[test]
    fn test_missing_credentials_is_an_error() {
        let store = SheetStore::new("activity-log".into(), "/nonexistent/sa.json".into(), None);
        assert!(store.read_credentials().is_err());
    }
}
