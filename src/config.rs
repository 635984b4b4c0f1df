use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    pub gemini_api_key: String,
    pub gemini_model: String,

    pub csv_path: String,

    pub sheet_name: String,
    pub google_credentials_file: String,
    pub google_credentials_json: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            gemini_api_key: env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set"),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".into()),

            csv_path: env::var("ACTIVITY_LOG_CSV").unwrap_or_else(|_| "activity_log.csv".into()),

            sheet_name: env::var("ACTIVITY_LOG_SHEET").unwrap_or_else(|_| "activity-log".into()),
            google_credentials_file: env::var("GOOGLE_SERVICE_ACCOUNT_FILE")
                .unwrap_or_else(|_| "service_account.json".into()),
            google_credentials_json: env::var("GOOGLE_SERVICE_ACCOUNT_JSON")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
