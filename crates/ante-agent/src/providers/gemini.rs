use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ensure_success_status, join_parts};
use crate::error::{AgentError, Result};
use crate::provider::Provider;
use crate::types::{ProviderKind, ProviderSettings, Reply, Request};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<PartOut<'a>>,
}

#[derive(Debug, Serialize)]
struct PartOut<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_json_schema: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    include_thoughts: bool,
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartIn>,
}

#[derive(Debug, Deserialize)]
struct PartIn {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

impl GeminiProvider {
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn build_request<'a>(request: &'a Request) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![PartOut {
                    text: &request.prompt,
                }],
            }],
            system_instruction: request.system.as_deref().map(|text| Content {
                role: None,
                parts: vec![PartOut { text }],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                thinking_config: request.thinking_tokens().map(|thinking_budget| ThinkingConfig {
                    include_thoughts: true,
                    thinking_budget,
                }),
                response_mime_type: request.schema.as_ref().map(|_| "application/json"),
                response_json_schema: request.schema.as_ref(),
            },
        }
    }

    fn extract_reply(response: GenerateContentResponse) -> Result<Reply> {
        let parts: Vec<PartIn> = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        let text = join_parts(
            parts
                .iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text.as_deref()),
        );
        let rationale = join_parts(
            parts
                .iter()
                .filter(|p| p.thought)
                .filter_map(|p| p.text.as_deref()),
        );
        if text.trim().is_empty() {
            return Err(AgentError::Response {
                provider: ProviderKind::Gemini,
                message: "no candidate text in reply".into(),
            });
        }
        Ok(Reply { text, rationale })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn complete(&self, request: &Request) -> Result<Reply> {
        let key = self.settings.api_key(ProviderKind::Gemini)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url_or(DEFAULT_BASE_URL),
            self.settings.model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", key)
            .json(&Self::build_request(request))
            .send()
            .await?;
        let response = ensure_success_status(ProviderKind::Gemini, response).await?;
        let parsed: GenerateContentResponse = response.json().await?;
        Self::extract_reply(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_json_mode_when_schema_given() {
        let req = Request::new("state", "turn 4")
            .system("sys")
            .max_tokens(2000)
            .thinking(0.5)
            .schema(json!({"type": "object"}));
        let body = serde_json::to_value(GeminiProvider::build_request(&req)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "state");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        let cfg = &body["generationConfig"];
        assert_eq!(cfg["maxOutputTokens"], 2000);
        assert_eq!(cfg["thinkingConfig"]["thinkingBudget"], 1000);
        assert_eq!(cfg["responseMimeType"], "application/json");
        assert_eq!(cfg["responseJsonSchema"]["type"], "object");
    }

    #[test]
    fn free_text_request_has_no_mime_type() {
        let body = serde_json::to_value(GeminiProvider::build_request(&Request::new("p", "c")))
            .unwrap();
        assert!(body["generationConfig"].get("responseMimeType").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn thoughts_become_rationale() {
        let parsed: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "flush is likely", "thought": true},
                    {"text": "{\"action\":\"discard\"}"}
                ]}
            }]
        }))
        .unwrap();
        let reply = GeminiProvider::extract_reply(parsed).unwrap();
        assert_eq!(reply.text, "{\"action\":\"discard\"}");
        assert_eq!(reply.rationale, "flush is likely");
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let parsed: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(GeminiProvider::extract_reply(parsed).is_err());
    }
}
