use crate::config::Config;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Builds the motivational message for one day's record: one templated
/// prompt, one generation call, no history, no retry. Failures never
/// propagate — the caller always gets a message string, possibly the
/// fallback with the raw error embedded.
#[derive(Clone)]
pub struct FeedbackGenerator {
    api_key: String,
    model: String,
    api_base: String,
}

impl FeedbackGenerator {
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            api_base: GEMINI_API_BASE.into(),
        }
    }

    #[cfg(test)]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub async fn generate(&self, steps: u64, sleep: f64, study: f64, comment: &str) -> String {
        let prompt = build_prompt(steps, sleep, study, comment);

        match self.call_gemini(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Generation service unavailable, using fallback message");
                fallback_message(&e)
            }
        }
    }

    async fn call_gemini(&self, prompt: &str) -> Result<String, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let response = client
            .post(format!(
                "{}/models/{}:generateContent",
                self.api_base, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "contents": [{
                    "parts": [{ "text": prompt }]
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {}: {}", status, body);
        }

        let body: serde_json::Value = response.json().await?;
        match body["candidates"][0]["content"]["parts"][0]["text"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => anyhow::bail!("Gemini response carried no text"),
        }
    }
}

/// Fixed template: the four inputs go in verbatim, no sanitization and no
/// length capping on the comment.
fn build_prompt(steps: u64, sleep: f64, study: f64, comment: &str) -> String {
    format!(
        r#"You are an endlessly supportive RPG companion character who celebrates the player's every effort.
Read today's activity record and cheer them on with full enthusiasm.

Today's record:
- Steps: {steps} (distance traveled)
- Sleep: {sleep} hours (HP recovered)
- Work/study: {study} hours (XP earned)
- Player's note: {comment}

Rules:
- Keep the tone warm, playful and encouraging.
- Reference the actual numbers concretely (e.g. "10000 steps?! A legendary trek!").
- Stay under roughly 150 characters and use plenty of emoji."#
    )
}

/// Persisted to the log as `ai_msg` like any genuine message, raw error
/// detail included.
fn fallback_message(error: &anyhow::Error) -> String {
    format!(
        "The coach is offline right now, but you showed up and logged your day anyway. That counts! (Error: {error})"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_inputs_verbatim() {
        let prompt = build_prompt(5000, 7.5, 1.0, "ran today, felt great");
        assert!(prompt.contains("5000"));
        assert!(prompt.contains("7.5"));
        assert!(prompt.contains("ran today, felt great"));
        assert!(prompt.contains("150 characters"));
    }

    #[test]
    fn test_fallback_embeds_error_detail() {
        let msg = fallback_message(&anyhow::anyhow!("quota exceeded"));
        assert!(!msg.is_empty());
        assert!(msg.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_unreachable_service_yields_fallback() {
        let generator = FeedbackGenerator {
            api_key: "test-key".into(),
            model: "gemini-2.5-flash".into(),
            api_base: GEMINI_API_BASE.into(),
        }
        .with_api_base("http://127.0.0.1:9");

        let msg = generator.generate(5000, 7.0, 1.0, "ran today").await;
        assert!(!msg.is_empty());
        assert!(msg.contains("Error:"));
    }
}
