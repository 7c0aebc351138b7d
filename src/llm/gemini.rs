use crate::{
    config::Config,
    llm::{AnswerClient, LlmError},
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl GeminiClient {
    /// Create a client for `model` at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Build a client from the Gemini settings in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.gemini_url.clone(),
            config.google_api_key.clone(),
            config.gemini_model.clone(),
        )
        .with_temperature(config.gemini_temperature)
    }

    /// Override the sampling temperature sent with every request.
    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait]
impl AnswerClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        if let Some(temperature) = self.temperature {
            payload["generationConfig"] = json!({ "temperature": temperature });
        }

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                LlmError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ProviderUnavailable(format!(
                "Gemini model {} not found at {}",
                self.model,
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::GenerationFailed(format!(
                "Gemini returned {status}: {body}"
            )));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|error| {
            LlmError::InvalidResponse(format!("failed to decode Gemini response: {error}"))
        })?;

        let Some(candidate) = body.candidates.into_iter().next() else {
            return Err(LlmError::EmptyResponse {
                block_reason: body.prompt_feedback.and_then(|feedback| feedback.block_reason),
            });
        };

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        let text = text.trim();

        if text.is_empty() {
            // A normal stop with no text carries no useful reason.
            return Err(LlmError::EmptyResponse {
                block_reason: candidate
                    .finish_reason
                    .filter(|reason| reason != "STOP"),
            });
        }

        tracing::debug!(model = %self.model, chars = text.len(), "Gemini answer received");
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    const PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(server.base_url(), "test-key", "gemini-1.5-flash")
    }

    #[tokio::test]
    async fn gemini_client_joins_candidate_parts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(PATH)
                    .header("x-goog-api-key", "test-key")
                    .json_body_partial(r#"{"contents":[{"parts":[{"text":"What color is the sky?"}]}]}"#);
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [
                                { "text": "The sky is blue " },
                                { "text": "[SOURCE: doc1.pdf, PAGE: 1]." }
                            ]
                        },
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await;

        let answer = client(&server)
            .generate("What color is the sky?")
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "The sky is blue [SOURCE: doc1.pdf, PAGE: 1].");
    }

    #[tokio::test]
    async fn temperature_is_forwarded() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(PATH)
                    .json_body_partial(r#"{"generationConfig":{"temperature":0.5}}"#);
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
                }));
            })
            .await;

        client(&server)
            .with_temperature(Some(0.5))
            .generate("prompt")
            .await
            .expect("answer");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn blocked_prompt_reports_reason() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH);
                then.status(200).json_body(json!({
                    "promptFeedback": { "blockReason": "SAFETY" }
                }));
            })
            .await;

        let error = client(&server).generate("prompt").await.unwrap_err();
        assert!(matches!(
            error,
            LlmError::EmptyResponse { block_reason: Some(ref reason) } if reason == "SAFETY"
        ));
        assert!(error.to_string().contains("blocked: SAFETY"));
    }

    #[tokio::test]
    async fn candidate_without_text_is_empty_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH);
                then.status(200).json_body(json!({
                    "candidates": [{ "finishReason": "SAFETY" }]
                }));
            })
            .await;

        let error = client(&server).generate("prompt").await.unwrap_err();
        assert!(matches!(
            error,
            LlmError::EmptyResponse { block_reason: Some(ref reason) } if reason == "SAFETY"
        ));
    }

    #[tokio::test]
    async fn whitespace_answer_is_empty_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH);
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "  \n" }] },
                        "finishReason": "STOP"
                    }]
                }));
            })
            .await;

        let error = client(&server).generate("prompt").await.unwrap_err();
        assert!(matches!(error, LlmError::EmptyResponse { block_reason: None }));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH);
                then.status(403).body("API key not valid");
            })
            .await;

        let error = client(&server).generate("prompt").await.unwrap_err();
        assert!(matches!(error, LlmError::GenerationFailed(message) if message.contains("403")));
    }

    #[tokio::test]
    async fn unknown_model_is_provider_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(PATH);
                then.status(404);
            })
            .await;

        let error = client(&server).generate("prompt").await.unwrap_err();
        assert!(matches!(error, LlmError::ProviderUnavailable(_)));
    }
}
