//! HTTP providers. Each one maps a [`Request`](crate::Request) onto its vendor
//! API and pulls the answer text plus any exposed reasoning back out.

mod anthropic;
mod gemini;
mod openai;

use std::sync::Arc;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use crate::error::{AgentError, Result};
use crate::provider::Provider;
use crate::types::{ProviderKind, ProviderSettings};

/// Build the HTTP provider for `kind`, sharing one connection pool.
pub fn build(
    kind: ProviderKind,
    settings: ProviderSettings,
    client: reqwest::Client,
) -> Arc<dyn Provider> {
    match kind {
        ProviderKind::Claude => Arc::new(AnthropicProvider::new(settings, client)),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(settings, client)),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(settings, client)),
    }
}

pub(crate) async fn ensure_success_status(
    provider: ProviderKind,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::Status {
        provider,
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Join non-empty fragments with newlines.
pub(crate) fn join_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(part);
    }
    out
}
