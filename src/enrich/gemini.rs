use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::InferenceError;
use super::requester::Inference;
use crate::settings::LlmSettings;

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            temperature: 0.1,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 8192,
            response_mime_type: "application/json",
        }
    }
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Default)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate, empty if absent.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default()
    }
}

impl GeminiClient {
    pub fn new(cfg: &LlmSettings, api_key: String) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;
        let url = format!(
            "{}/models/{}:generateContent",
            cfg.endpoint.trim_end_matches('/'),
            cfg.model
        );
        Ok(GeminiClient { http, url, api_key })
    }

    async fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig::default(),
        };

        let resp = self
            .http
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(InferenceError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::Response(e.to_string()))?;
        if parsed.candidates.is_empty() {
            warn!("No candidates in response for prompt: {}...", preview(prompt));
        }
        Ok(parsed.into_text())
    }
}

impl Inference for GeminiClient {
    async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
        self.generate(prompt).await
    }
}

/// Only the delay-seconds form of `Retry-After` is honoured.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Short prefix of a prompt for log lines.
pub(crate) fn preview(prompt: &str) -> String {
    let tail = prompt.rsplit('\n').next().unwrap_or(prompt);
    tail.chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: "hello" }],
            }],
            generation_config: GenerationConfig::default(),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(v["generationConfig"]["topK"], 1);
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn response_text_extraction() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"parsed_prerequisites\":[]}"}]}}]}"#;
        let resp: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.into_text(), "{\"parsed_prerequisites\":[]}");

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.into_text(), "");
    }

    #[test]
    fn retry_after_seconds_only() {
        assert_eq!(parse_retry_after("12"), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn url_from_settings() {
        let cfg = LlmSettings {
            endpoint: "https://example.test/v1beta/".into(),
            ..Default::default()
        };
        let client = GeminiClient::new(&cfg, "k".into()).unwrap();
        assert_eq!(
            client.url,
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
