use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ensure_success_status, join_parts};
use crate::error::{AgentError, Result};
use crate::provider::Provider;
use crate::types::{ProviderKind, ProviderSettings, Reply, Request};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiProvider {
    settings: ProviderSettings,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    input: &'a str,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextOptions<'a>>,
}

#[derive(Debug, Serialize)]
struct Reasoning {
    effort: &'static str,
    summary: &'static str,
}

#[derive(Debug, Serialize)]
struct TextOptions<'a> {
    format: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    r#type: &'static str,
    name: &'static str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    Reasoning {
        #[serde(default)]
        summary: Vec<SummaryText>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputContent {
    OutputText {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct SummaryText {
    #[serde(default)]
    text: String,
}

impl OpenAiProvider {
    pub fn new(settings: ProviderSettings, client: reqwest::Client) -> Self {
        Self { settings, client }
    }

    fn build_request<'a>(&'a self, request: &'a Request) -> ResponsesRequest<'a> {
        ResponsesRequest {
            model: &self.settings.model,
            instructions: request.system.as_deref(),
            input: &request.prompt,
            max_output_tokens: request.max_tokens,
            reasoning: request.thinking_budget.map(|_| Reasoning {
                effort: "high",
                summary: "auto",
            }),
            text: request.schema.as_ref().map(|schema| TextOptions {
                format: JsonSchemaFormat {
                    r#type: "json_schema",
                    name: "reply",
                    schema,
                    strict: false,
                },
            }),
        }
    }

    fn extract_reply(response: ResponsesResponse) -> Result<Reply> {
        let mut texts = Vec::new();
        let mut summaries = Vec::new();
        for item in &response.output {
            match item {
                OutputItem::Message { content } => {
                    for c in content {
                        if let OutputContent::OutputText { text } = c {
                            texts.push(text.as_str());
                        }
                    }
                }
                OutputItem::Reasoning { summary } => {
                    summaries.extend(summary.iter().map(|s| s.text.as_str()));
                }
                OutputItem::Other => {}
            }
        }
        let text = join_parts(texts);
        if text.trim().is_empty() {
            return Err(AgentError::Response {
                provider: ProviderKind::OpenAi,
                message: "no output_text in reply".into(),
            });
        }
        Ok(Reply {
            text,
            rationale: join_parts(summaries),
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn complete(&self, request: &Request) -> Result<Reply> {
        let key = self.settings.api_key(ProviderKind::OpenAi)?;
        let url = format!("{}/v1/responses", self.settings.base_url_or(DEFAULT_BASE_URL));
        let response = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(&self.build_request(request))
            .send()
            .await?;
        let response = ensure_success_status(ProviderKind::OpenAi, response).await?;
        let parsed: ResponsesResponse = response.json().await?;
        Self::extract_reply(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(
            ProviderSettings {
                model: "gpt-test".into(),
                api_key_env: "ANTE_TEST_UNSET_OPENAI_KEY".into(),
                base_url: None,
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn request_shape() {
        let p = provider();
        let req = Request::new("hand", "turn 2")
            .system("sys")
            .thinking(0.9)
            .schema(json!({"type": "object"}));
        let body = serde_json::to_value(p.build_request(&req)).unwrap();
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["instructions"], "sys");
        assert_eq!(body["input"], "hand");
        assert_eq!(body["reasoning"]["summary"], "auto");
        assert_eq!(body["text"]["format"]["type"], "json_schema");
    }

    #[test]
    fn reply_collects_text_and_summary() {
        let parsed: ResponsesResponse = serde_json::from_value(json!({
            "output": [
                {"type": "reasoning", "summary": [{"type": "summary_text", "text": "go big"}]},
                {"type": "message", "content": [{"type": "output_text", "text": "{}"}]},
                {"type": "web_search_call"}
            ]
        }))
        .unwrap();
        let reply = OpenAiProvider::extract_reply(parsed).unwrap();
        assert_eq!(reply.text, "{}");
        assert_eq!(reply.rationale, "go big");
    }

    #[test]
    fn reply_without_message_is_an_error() {
        let parsed: ResponsesResponse =
            serde_json::from_value(json!({"output": [{"type": "reasoning", "summary": []}]}))
                .unwrap();
        assert!(OpenAiProvider::extract_reply(parsed).is_err());
    }
}
