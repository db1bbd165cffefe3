use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ProviderKind, Reply, Request};

/// A remote model that turns a prompt into a reply.
///
/// Implementations make exactly one attempt per call. Retries belong to the
/// [`Invoker`](crate::Invoker).
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn complete(&self, request: &Request) -> Result<Reply>;
}
