use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ensure_success_status, join_parts};
use crate::error::{AgentError, Result};
use crate::provider::Provider;
use crate::types::{ProviderKind, ProviderSettings, Reply, Request};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const STRUCTURED_OUTPUTS_BETA: &str = "structured-outputs-2025-11-13";
/// The API rejects thinking budgets below this.
const MIN_THINKING_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_format: Option<OutputFormat<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Thinking {
    r#type: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OutputFormat<'a> {
    r#type: &'static str,
    schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

impl AnthropicProvider {
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn build_request<'a>(&'a self, request: &'a Request) -> MessagesRequest<'a> {
        let thinking = request
            .thinking_tokens()
            .filter(|t| *t >= MIN_THINKING_TOKENS)
            .map(|budget_tokens| Thinking {
                r#type: "enabled",
                budget_tokens,
            });
        MessagesRequest {
            model: &self.settings.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            thinking,
            output_format: request.schema.as_ref().map(|schema| OutputFormat {
                r#type: "json_schema",
                schema,
            }),
        }
    }

    fn extract_reply(response: MessagesResponse) -> Result<Reply> {
        let text = join_parts(response.content.iter().filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        }));
        let rationale = join_parts(response.content.iter().filter_map(|b| match b {
            ContentBlock::Thinking { thinking } => Some(thinking.as_str()),
            _ => None,
        }));
        if text.trim().is_empty() {
            return Err(AgentError::Response {
                provider: ProviderKind::Claude,
                message: "no text block in reply".into(),
            });
        }
        Ok(Reply { text, rationale })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    async fn complete(&self, request: &Request) -> Result<Reply> {
        let key = self.settings.api_key(ProviderKind::Claude)?;
        let url = format!("{}/v1/messages", self.settings.base_url_or(DEFAULT_BASE_URL));
        let body = self.build_request(request);

        let mut builder = self
            .client
            .post(url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION);
        if body.output_format.is_some() {
            builder = builder.header("anthropic-beta", STRUCTURED_OUTPUTS_BETA);
        }
        let response = builder.json(&body).send().await?;
        let response = ensure_success_status(ProviderKind::Claude, response).await?;
        let parsed: MessagesResponse = response.json().await?;
        Self::extract_reply(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(
            ProviderSettings {
                model: "claude-test".into(),
                api_key_env: "ANTE_TEST_UNSET_ANTHROPIC_KEY".into(),
                base_url: None,
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn request_carries_thinking_and_schema() {
        let p = provider();
        let req = Request::new("play", "turn 1")
            .system("be good")
            .max_tokens(5000)
            .thinking(0.95)
            .schema(json!({"type": "object"}));
        let body = serde_json::to_value(p.build_request(&req)).unwrap();
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["system"], "be good");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["thinking"]["budget_tokens"], 4750);
        assert_eq!(body["output_format"]["type"], "json_schema");
    }

    #[test]
    fn small_budget_skips_thinking() {
        let p = provider();
        let req = Request::new("play", "turn 1").max_tokens(1000).thinking(0.5);
        let body = serde_json::to_value(p.build_request(&req)).unwrap();
        assert!(body.get("thinking").is_none());
        assert!(body.get("output_format").is_none());
    }

    #[test]
    fn reply_splits_text_and_thinking() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "pairs are weak", "signature": "x"},
                {"type": "text", "text": "{\"action\":\"play\"}"}
            ]
        }))
        .unwrap();
        let reply = AnthropicProvider::extract_reply(parsed).unwrap();
        assert_eq!(reply.text, "{\"action\":\"play\"}");
        assert_eq!(reply.rationale, "pairs are weak");
    }

    #[test]
    fn reply_without_text_is_an_error() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "redacted_thinking", "data": "..."}]
        }))
        .unwrap();
        assert!(matches!(
            AnthropicProvider::extract_reply(parsed),
            Err(AgentError::Response { .. })
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_before_sending() {
        let err = provider()
            .complete(&Request::new("p", "ctx"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MissingCredentials { .. }));
    }
}
