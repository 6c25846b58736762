//! Gemini answer generator.
//!
//! Calls `models/{model}:generateContent` on the Generative Language API
//! with a low temperature for factual answers and the standard
//! medium-and-above safety thresholds. The API key comes from
//! `GEMINI_API_KEY`.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use research_rag_core::answer::AnswerGenerator;

use crate::config::LlmConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1/models";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Build the configured generator, or `None` when the LLM is disabled.
pub fn create_generator(config: &LlmConfig) -> Result<Option<Arc<dyn AnswerGenerator>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "gemini" => Ok(Some(Arc::new(GeminiGenerator::new(config)?))),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub struct GeminiGenerator {
    model: String,
    api_key: String,
    max_output_tokens: u32,
    temperature: f64,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            client,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let safety: Vec<serde_json::Value> = SAFETY_CATEGORIES
            .iter()
            .map(|category| {
                serde_json::json!({
                    "category": category,
                    "threshold": "BLOCK_MEDIUM_AND_ABOVE",
                })
            })
            .collect();

        serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": self.max_output_tokens,
            },
            "safetySettings": safety,
        })
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model);
        debug!(model = %self.model, prompt_chars = prompt.len(), "calling Gemini");

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Gemini API error: {} - {}", status.as_u16(), body);
        }

        let json: serde_json::Value = response.json().await?;
        Ok(extract_answer(&json))
    }
}

/// Text of the first candidate's first part, trimmed; empty if absent.
fn extract_answer(json: &serde_json::Value) -> String {
    json.pointer("/candidates/0/content/parts/0/text")
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}
