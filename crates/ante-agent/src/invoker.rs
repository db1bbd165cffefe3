use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{AgentError, Result};
use crate::provider::Provider;
use crate::providers;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::types::{ProviderKind, ProviderSettings, Reply, Request};

/// Dispatches requests to a registered provider under a shared retry policy.
#[derive(Clone)]
pub struct Invoker {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    policy: RetryPolicy,
}

impl Invoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            providers: HashMap::new(),
            policy,
        }
    }

    /// Register the HTTP provider for every configured kind.
    pub fn from_settings(
        settings: impl IntoIterator<Item = (ProviderKind, ProviderSettings)>,
        policy: RetryPolicy,
    ) -> Self {
        let client = reqwest::Client::new();
        let mut invoker = Self::new(policy);
        for (kind, s) in settings {
            invoker = invoker.with_provider(providers::build(kind, s, client.clone()));
        }
        invoker
    }

    /// Register (or replace) a provider under its own kind.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn provider(&self, kind: ProviderKind) -> Result<&Arc<dyn Provider>> {
        self.providers
            .get(&kind)
            .ok_or(AgentError::NotConfigured(kind))
    }

    /// Free-text call. Returns the provider's reply untouched.
    pub async fn invoke_text(&self, kind: ProviderKind, request: &Request) -> Result<Reply> {
        let provider = self.provider(kind)?;
        retry_with_backoff(&self.policy, &request.context, |attempt| async move {
            debug!(provider = %kind, attempt, "sending request");
            provider.complete(request).await
        })
        .await
    }

    /// Structured call. `decode` turns the reply text into `T`; a decode
    /// failure counts as a failed attempt and the identical request is sent
    /// again. Returns the decoded value and the provider's rationale.
    pub async fn invoke_structured<T, D>(
        &self,
        kind: ProviderKind,
        request: &Request,
        decode: D,
    ) -> Result<(T, String)>
    where
        D: Fn(&str) -> std::result::Result<T, String>,
    {
        let provider = self.provider(kind)?;
        let decode = &decode;
        retry_with_backoff(&self.policy, &request.context, |attempt| async move {
            debug!(provider = %kind, attempt, "sending structured request");
            let reply = provider.complete(request).await?;
            let value = decode(json_body(&reply.text)).map_err(AgentError::Rejected)?;
            Ok((value, reply.rationale))
        })
        .await
    }
}

/// Strip a surrounding markdown code fence, if the model added one.
pub fn json_body(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
