//! HTTP extractor for OpenAI-compatible chat-completions endpoints (Groq by default).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::extractor::{ExtractError, Extractor, ImageRef, RawExtraction};
use crate::json::recover_object;
use crate::prompt::build_prompt;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

#[derive(Debug, Clone)]
pub struct HttpExtractorConfig {
    pub api_key: String,
    /// Like `https://api.groq.com/openai/v1` (trailing slash tolerated).
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl HttpExtractorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
        }
    }
}

/// Extractor backed by a chat-completions model.
pub struct HttpExtractor {
    client: reqwest::Client,
    config: HttpExtractorConfig,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpExtractor {
    pub fn new(mut config: HttpExtractorConfig) -> Result<Self, ExtractError> {
        if config.api_key.trim().is_empty() {
            return Err(ExtractError::Config("API key is empty".into()));
        }
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn request_body(&self, text: &str, image: Option<&ImageRef>, force_guess: bool) -> Value {
        let prompt = build_prompt(text, image.is_some(), force_guess);
        let content = match image {
            None => json!(prompt),
            Some(img) => json!([
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": img.data_url()}},
            ]),
        };
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [{"role": "user", "content": content}],
        })
    }
}

/// Pull the assistant text out of a completion response body.
fn completion_text(body: &str) -> Result<String, ExtractError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| ExtractError::Backend(format!("malformed completion response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ExtractError::Unparseable("completion has no content".into()))
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(
        &self,
        text: &str,
        image: Option<&ImageRef>,
        force_guess: bool,
    ) -> Result<RawExtraction, ExtractError> {
        let url = self.endpoint();
        let body = self.request_body(text, image, force_guess);

        info!(
            url = %url,
            model = %self.config.model,
            force_guess,
            has_image = image.is_some(),
            "requesting extraction"
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let raw = resp.text().await?;
        let content = completion_text(&raw)?;
        debug!(content = %content, "model answered");
        recover_object(&content).ok_or(ExtractError::Unparseable(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> HttpExtractor {
        let mut config = HttpExtractorConfig::new("test-key");
        config.base_url = "http://localhost:8080/v1/".into();
        HttpExtractor::new(config).unwrap()
    }

    #[test]
    fn trims_trailing_slash() {
        assert_eq!(extractor().endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn empty_key_is_config_error() {
        let err = HttpExtractor::new(HttpExtractorConfig::new(" ")).err().unwrap();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn text_only_body_uses_plain_content() {
        let body = extractor().request_body("Lunch 120", None, false);
        assert_eq!(body["model"], DEFAULT_MODEL);
        let content = &body["messages"][0]["content"];
        assert!(content.as_str().unwrap().contains("Lunch 120"));
    }

    #[test]
    fn image_body_has_data_url_part() {
        let img = ImageRef::new("image/png", vec![1u8, 2, 3]);
        let body = extractor().request_body("", Some(&img), true);
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(parts[0]["text"].as_str().unwrap().contains("best guess"));
    }

    #[test]
    fn completion_text_extracts_first_choice() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"Name\": \"Tea\"}"}}]}"#;
        assert_eq!(completion_text(raw).unwrap(), r#"{"Name": "Tea"}"#);
    }

    #[test]
    fn completion_without_choices_is_unparseable() {
        let err = completion_text(r#"{"choices": []}"#).unwrap_err();
        assert!(err.is_unparseable());
        let err = completion_text("not json").unwrap_err();
        assert!(matches!(err, ExtractError::Backend(_)));
    }
}
