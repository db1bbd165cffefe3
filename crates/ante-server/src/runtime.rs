//! Process-wide handles, created once at server start.

use std::sync::Arc;

use ante_agent::{Invoker, ProviderKind, ProviderSettings, Request, RetryPolicy};
use ante_core::action::Decision;
use ante_core::config::{Config, ProviderConfig};
use ante_core::store::Store;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::analysis::Analyst;
use crate::game::{GameController, Launch};
use crate::hub::ObserverHub;
use crate::offload::with_store;
use crate::orchestrator::{Decider, DecisionRequest, Orchestrator, RunControl, TurnSettings};
use crate::reflection::Reflector;

/// Shared state handed to every route handler.
pub type AppState = Arc<Runtime>;

pub struct Runtime {
    pub config: Config,
    pub store: Store,
    pub hub: Arc<ObserverHub>,
    pub game: Arc<GameController>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Runtime {
    /// Open the store and wire the HTTP providers from `config`.
    pub fn open(config: Config) -> anyhow::Result<Arc<Self>> {
        let store = Store::open(&config.db_path)?;
        let decider = Arc::new(AgentDecider::from_config(&config));
        Ok(Self::with_decider(config, store, decider))
    }

    /// Assemble the runtime around an already-open store and any decider.
    pub fn with_decider(config: Config, store: Store, decider: Arc<dyn Decider>) -> Arc<Self> {
        let hub = Arc::new(ObserverHub::new());
        let game = Arc::new(GameController::new(&config.game));

        let planner = config.analysis.plan_from_reflections.then(|| {
            Reflector::new(
                store.clone(),
                decider.clone(),
                hub.clone(),
                Analyst::new(store.clone(), decider.clone(), config.analysis.workers),
                config.default_provider.clone(),
            )
        });
        let control = Arc::new(Lifecycle {
            store: store.clone(),
            game: game.clone(),
            planner,
            default_provider: config.default_provider.clone(),
            autostart: config.game.autostart,
        });

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            decider,
            hub.clone(),
            control,
            config.analysis.workers,
            TurnSettings::from_config(&config),
        ));

        Arc::new(Self {
            config,
            store,
            hub,
            game,
            orchestrator,
        })
    }

    /// Stop the game process, if one is running.
    pub async fn shutdown(&self) {
        let outcome = self.game.stop().await;
        info!(?outcome, "runtime shut down");
    }
}

// ---------------------------------------------------------------------------
// AgentDecider
// ---------------------------------------------------------------------------

/// [`Decider`] backed by the retrying HTTP invoker.
pub struct AgentDecider {
    invoker: Invoker,
    max_tokens: u32,
    thinking_budget: f64,
}

const COMPOSE_MAX_TOKENS: u32 = 8000;
const COMPOSE_THINKING: f64 = 0.5;

fn settings(p: &ProviderConfig) -> ProviderSettings {
    ProviderSettings {
        model: p.model.clone(),
        api_key_env: p.api_key_env.clone(),
        base_url: p.base_url.clone(),
    }
}

impl AgentDecider {
    pub fn from_config(config: &Config) -> Self {
        let providers = [
            (ProviderKind::Claude, settings(&config.providers.claude)),
            (ProviderKind::Gemini, settings(&config.providers.gemini)),
            (ProviderKind::OpenAi, settings(&config.providers.openai)),
        ];
        let policy = RetryPolicy::from_secs(config.retry.attempts, &config.retry.backoff_secs);
        Self::new(
            Invoker::from_settings(providers, policy),
            config.turn.max_tokens,
            config.turn.thinking_budget,
        )
    }

    pub fn new(invoker: Invoker, max_tokens: u32, thinking_budget: f64) -> Self {
        Self {
            invoker,
            max_tokens,
            thinking_budget,
        }
    }
}

#[async_trait]
impl Decider for AgentDecider {
    async fn decide(&self, request: DecisionRequest<'_>) -> anyhow::Result<Decision> {
        let kind: ProviderKind = request.provider.parse()?;
        let schema = request.schema;
        let req = Request::new(
            request.prompt,
            format!("Turn {} of {}", request.turn + 1, request.run_id),
        )
        .max_tokens(self.max_tokens)
        .thinking(self.thinking_budget)
        .schema(schema.json_schema());

        let (action, rationale) = self
            .invoker
            .invoke_structured(kind, &req, |text| {
                schema.parse_str(text).map_err(|r| r.to_string())
            })
            .await?;
        Ok(Decision {
            action,
            reasoning: rationale,
        })
    }

    async fn compose(&self, provider: &str, prompt: String, context: String) -> anyhow::Result<String> {
        let kind: ProviderKind = provider.parse()?;
        let req = Request::new(prompt, context)
            .max_tokens(COMPOSE_MAX_TOKENS)
            .thinking(COMPOSE_THINKING);
        let reply = self.invoker.invoke_text(kind, &req).await?;
        Ok(reply.text)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Run lifecycle effects: stopping the game and opening the next run.
struct Lifecycle {
    store: Store,
    game: Arc<GameController>,
    planner: Option<Reflector>,
    default_provider: String,
    autostart: bool,
}

#[async_trait]
impl RunControl for Lifecycle {
    async fn stop_game(&self) {
        let outcome = self.game.stop().await;
        info!(?outcome, "game stopped after run end");
    }

    async fn start_fresh_run(&self) -> anyhow::Result<String> {
        let provider = self.default_provider.clone();
        let run = with_store(&self.store, move |store| {
            let run = store.create_run(&provider)?;
            store.set_current_run(&run.run_id)?;
            Ok(run)
        })
        .await?;
        info!(run_id = %run.run_id, "fresh run started");

        if let Some(planner) = &self.planner {
            match planner.game_plan(&run.run_id).await {
                Ok(Some(_)) => {}
                Ok(None) => info!(run_id = %run.run_id, "no reflections yet; no game plan"),
                Err(e) => warn!(run_id = %run.run_id, "game plan failed: {e:#}"),
            }
        }
        if self.autostart {
            if let Err(e) = self.game.start(Launch::NewRun { seed: None }).await {
                error!(run_id = %run.run_id, "could not start game: {e:#}");
            }
        }
        Ok(run.run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ante_agent::{Provider, Reply};
    use ante_core::action::{ActionSchema, Verb};
    use ante_core::state::Phase;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies with canned text in order.
    struct Canned {
        replies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Provider for Canned {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Gemini
        }

        async fn complete(&self, _request: &Request) -> ante_agent::Result<Reply> {
            let text = self.replies.lock().unwrap().remove(0);
            Ok(Reply {
                text,
                rationale: "thought it through".into(),
            })
        }
    }

    fn decider(replies: &[&str]) -> AgentDecider {
        let provider = Arc::new(Canned {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
        });
        let invoker = Invoker::new(RetryPolicy::from_secs(2, &[0])).with_provider(provider);
        AgentDecider::new(invoker, 5000, 0.2)
    }

    #[tokio::test]
    async fn invalid_reply_is_retried_then_accepted() {
        let d = decider(&[r#"{"action": "discard"}"#, r#"{"action": "play_round"}"#]);
        let schema = ActionSchema::for_phase(Phase::BlindSelect);

        let decision = d
            .decide(DecisionRequest {
                run_id: "r1",
                turn: 0,
                provider: "gemini",
                prompt: "choose",
                schema: &schema,
            })
            .await
            .unwrap();

        assert_eq!(decision.action.verb, Verb::PlayRound);
        assert_eq!(decision.reasoning, "thought it through");
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_fast() {
        let d = decider(&[]);
        let err = d
            .compose("claude", "hi".into(), "ctx".into())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("claude"));
    }

    #[tokio::test]
    async fn fresh_run_becomes_current() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("ante.redb")).unwrap();
        let config = Config::default();
        let control = Lifecycle {
            store: store.clone(),
            game: Arc::new(GameController::new(&config.game)),
            planner: None,
            default_provider: "claude".into(),
            autostart: false,
        };

        let run_id = control.start_fresh_run().await.unwrap();

        assert_eq!(store.current_run().unwrap().as_deref(), Some(run_id.as_str()));
        assert_eq!(store.provider(&run_id).unwrap().as_deref(), Some("claude"));
    }
}
