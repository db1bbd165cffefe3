//! `ante-agent`: the remote decision invoker.
//!
//! A [`Provider`] makes one HTTP call to a model vendor. The [`Invoker`]
//! owns one provider per [`ProviderKind`] and wraps every call in the
//! configured [`RetryPolicy`]. Structured calls decode the reply text with a
//! caller-supplied function, and a decode failure is retried exactly like a
//! transport failure.
//!
//! ```text
//! Request ──▶ Invoker ──retry──▶ Provider (claude | gemini | openai)
//!                │                    │
//!                ◀──── (value, rationale) ◀── Reply
//! ```

pub mod error;
pub mod invoker;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod types;

pub use error::{AgentError, Result};
pub use invoker::{json_body, Invoker};
pub use provider::Provider;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use types::{ProviderKind, ProviderSettings, Reply, Request};
