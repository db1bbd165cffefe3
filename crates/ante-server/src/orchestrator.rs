//! Turn orchestration: one inbound state in, at most one stored decision out.
//!
//! ```text
//! POST /state ─▶ ingest ──spawn──▶ process_turn
//!                                   1. turn = next_turn(run)
//!                                   2. backfill previous hand result
//!                                   3. terminal? ─▶ end run, start fresh run
//!                                   4. store snapshot, publish ─▶ decide ─▶ store reply, publish
//! GET /action ─▶ take_pending(run)
//! ```
//!
//! Collaborators are injected as traits so the engine can be driven by
//! scripted fakes in tests.

use std::path::PathBuf;
use std::sync::Arc;

use ante_core::action::{ActionSchema, Decision};
use ante_core::config::Config;
use ante_core::objects::{collect_objects, ObjectRef};
use ante_core::prompt::{group_turns, TurnPrompt};
use ante_core::render::render_state;
use ante_core::state::{GameOverStats, GameState, HandResult, Phase, StateSnapshot};
use ante_core::store::{BlobKind, NoteRecord, Outcome, Store};
use ante_core::CoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analysis::Analyst;
use crate::hub::{ObserverHub, ObserverMessage};
use crate::offload::with_store;
use crate::reflection::Reflector;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Everything needed to ask for one decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub run_id: &'a str,
    pub turn: u64,
    pub provider: &'a str,
    pub prompt: &'a str,
    pub schema: &'a ActionSchema,
}

/// The remote decision maker. `decide` returns an action already validated
/// against the request's schema; `compose` returns free text.
#[async_trait]
pub trait Decider: Send + Sync {
    async fn decide(&self, request: DecisionRequest<'_>) -> anyhow::Result<Decision>;

    async fn compose(&self, provider: &str, prompt: String, context: String)
        -> anyhow::Result<String>;
}

/// Where snapshots, decisions and reflections are announced.
pub trait Publisher: Send + Sync {
    fn publish(&self, msg: ObserverMessage);
}

impl Publisher for ObserverHub {
    fn publish(&self, msg: ObserverMessage) {
        ObserverHub::publish(self, msg)
    }
}

/// Run lifecycle side effects outside the store.
#[async_trait]
pub trait RunControl: Send + Sync {
    /// Best-effort stop of the external game.
    async fn stop_game(&self);

    /// Create a run, make it current and return its id.
    async fn start_fresh_run(&self) -> anyhow::Result<String>;
}

// ---------------------------------------------------------------------------
// Settings and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub context_turns: usize,
    pub default_provider: String,
    pub strategy: Option<String>,
    pub save_path: Option<PathBuf>,
    pub screenshot_path: Option<PathBuf>,
    /// Write first-impression notes for unseen objects before deciding.
    pub analyze_objects: bool,
    /// Reflect on a run once it is won or lost.
    pub reflect_on_finish: bool,
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            context_turns: config.turn.context_turns,
            default_provider: config.default_provider.clone(),
            strategy: config.strategy.clone(),
            save_path: config.game.save_path.clone(),
            screenshot_path: config.game.screenshot_path.clone(),
            analyze_objects: config.analysis.enabled,
            reflect_on_finish: config.analysis.enabled,
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A decision was stored and is waiting in the mailbox.
    Decided { turn: u64, decision: Decision },
    /// A non-actionable state was stored; nothing to decide.
    Recorded { turn: u64 },
    /// The game ended; a fresh run is now current.
    RunEnded { turn: u64, next_run: String },
}

/// Handle returned by [`Orchestrator::ingest`].
pub struct Ingested {
    pub run_id: String,
    pub task: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    store: Store,
    decider: Arc<dyn Decider>,
    publisher: Arc<dyn Publisher>,
    control: Arc<dyn RunControl>,
    analyst: Analyst,
    reflector: Reflector,
    settings: TurnSettings,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        decider: Arc<dyn Decider>,
        publisher: Arc<dyn Publisher>,
        control: Arc<dyn RunControl>,
        workers: usize,
        settings: TurnSettings,
    ) -> Self {
        let analyst = Analyst::new(store.clone(), decider.clone(), workers);
        let reflector = Reflector::new(
            store.clone(),
            decider.clone(),
            publisher.clone(),
            analyst.clone(),
            settings.default_provider.clone(),
        );
        Self {
            store,
            decider,
            publisher,
            control,
            analyst,
            reflector,
            settings,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn reflector(&self) -> &Reflector {
        &self.reflector
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Accept a state from the game. Seed consistency is checked here so a
    /// mismatch reaches the caller; everything else runs in a background task
    /// whose failure is logged and never returned.
    ///
    /// The seed check touches the store synchronously, so callers run this on
    /// the blocking pool; it needs a runtime handle to spawn the turn.
    pub fn ingest(self: &Arc<Self>, raw: Value) -> Result<Ingested, CoreError> {
        let state = GameState::from_value(raw)?;
        let run = self.store.current_or_create(&self.settings.default_provider)?;
        if let Some(seed) = state.seed() {
            self.store.record_seed(&run.run_id, &seed)?;
        }

        let this = Arc::clone(self);
        let run_id = run.run_id.clone();
        let task = tokio::spawn(async move {
            match this.process_turn(&run_id, state).await {
                Ok(outcome) => debug!(run_id = %run_id, ?outcome, "turn processed"),
                Err(e) => error!(run_id = %run_id, "turn processing failed: {e:#}"),
            }
        });
        Ok(Ingested {
            run_id: run.run_id,
            task,
        })
    }

    /// Handle one state for `run_id`.
    pub async fn process_turn(&self, run_id: &str, state: GameState) -> anyhow::Result<TurnOutcome> {
        let played = state.last_played_hand().map(HandResult::from);
        let rid = run_id.to_string();
        let turn = with_store(&self.store, move |store| {
            let turn = store.next_turn(&rid)?;
            backfill_hand_result(store, &rid, turn, played)?;
            Ok(turn)
        })
        .await?;

        let phase = state.phase();
        if phase.is_terminal() {
            info!(run_id, turn, "game over");
            let next_run = self
                .finish_run(run_id, Outcome::Lost, state.game_over_stats())
                .await?;
            return Ok(TurnOutcome::RunEnded { turn, next_run });
        }

        let state_string = render_state(&state);
        if !phase.is_actionable() {
            let snapshot = StateSnapshot {
                game_state: state.raw().clone(),
                state_string,
                prompt: String::new(),
            };
            self.record_state(run_id, turn, &state, &snapshot).await?;
            debug!(run_id, turn, phase = %phase, "non-actionable state recorded");
            return Ok(TurnOutcome::Recorded { turn });
        }

        let rid = run_id.to_string();
        let provider = with_store(&self.store, move |store| store.provider(&rid))
            .await?
            .unwrap_or_else(|| self.settings.default_provider.clone());

        if self.settings.analyze_objects {
            let report = self
                .analyst
                .analyze_new_objects(&provider, [state.raw()])
                .await?;
            if !report.is_empty() {
                info!(
                    run_id,
                    turn,
                    written = report.written.len(),
                    failed = report.failed.len(),
                    "first-impression notes"
                );
            }
        }

        let schema = ActionSchema::for_state(&state);
        let visible: Vec<ObjectRef> = collect_objects([state.raw()]).into_keys().collect();
        let rid = run_id.to_string();
        let context_turns = self.settings.context_turns;
        let (recent, notes, plan) = with_store(&self.store, move |store| {
            let recent = store.recent_turns(&rid, context_turns)?;
            let notes = relevant_notes(store, &visible)?;
            let plan = store.plan(&rid)?;
            Ok((recent, notes, plan))
        })
        .await?;
        let history = group_turns(&recent);
        let prompt = TurnPrompt::new(&state_string, &schema)
            .strategy(self.settings.strategy.as_deref())
            .plan(plan.as_deref())
            .history(&history)
            .notes(&notes)
            .build();

        let snapshot = StateSnapshot {
            game_state: state.raw().clone(),
            state_string,
            prompt,
        };
        // Stored before the decision so observers see the state right away.
        self.record_state(run_id, turn, &state, &snapshot).await?;

        let decision = self
            .decider
            .decide(DecisionRequest {
                run_id,
                turn,
                provider: &provider,
                prompt: &snapshot.prompt,
                schema: &schema,
            })
            .await?;

        let reply = serde_json::to_value(&decision)?;
        let rid = run_id.to_string();
        with_store(&self.store, move |store| store.save_reply(&rid, turn, reply)).await?;
        info!(run_id, turn, command = %decision.action.command(), "decision stored");
        self.publisher.publish(ObserverMessage::DecisionResponse {
            run_id: run_id.to_string(),
            turn,
            timestamp: Utc::now(),
            action: decision.action.verb,
            positions: decision.action.positions.clone(),
            reasoning: decision.reasoning.clone(),
        });

        Ok(TurnOutcome::Decided { turn, decision })
    }

    /// Record an outcome for `run_id`, optionally reflect on it in the
    /// background, and start the next run. Returns the new run id.
    pub async fn finish_run(
        &self,
        run_id: &str,
        outcome: Outcome,
        stats: Option<GameOverStats>,
    ) -> anyhow::Result<String> {
        if outcome == Outcome::Lost {
            self.control.stop_game().await;
        }
        let rid = run_id.to_string();
        with_store(&self.store, move |store| store.set_outcome(&rid, outcome)).await?;
        info!(run_id, ?outcome, "run finished");

        if self.settings.reflect_on_finish {
            let reflector = self.reflector.clone();
            let run = run_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = reflector.reflect(&run, stats).await {
                    error!(run_id = %run, "reflection failed: {e:#}");
                }
            });
        }

        self.control.start_fresh_run().await
    }

    async fn record_state(
        &self,
        run_id: &str,
        turn: u64,
        state: &GameState,
        snapshot: &StateSnapshot,
    ) -> anyhow::Result<()> {
        let value = serde_json::to_value(snapshot)?;
        let (rid, tag, ante) = (run_id.to_string(), state.tag().to_string(), state.ante());
        with_store(&self.store, move |store| {
            store.save_state(&rid, turn, value, &tag, ante)
        })
        .await?;
        self.capture_blob(run_id, turn, BlobKind::Save, self.settings.save_path.as_ref())
            .await;
        self.capture_blob(
            run_id,
            turn,
            BlobKind::Screenshot,
            self.settings.screenshot_path.as_ref(),
        )
        .await;

        self.publisher.publish(ObserverMessage::StateUpdate {
            run_id: run_id.to_string(),
            turn,
            timestamp: Utc::now(),
            game_state: snapshot.game_state.clone(),
            state_string: snapshot.state_string.clone(),
            prompt: snapshot.prompt.clone(),
        });
        Ok(())
    }

    /// Copy a file the game wrote into the blob store. Missing files are
    /// normal (no save yet) and only logged.
    async fn capture_blob(&self, run_id: &str, turn: u64, kind: BlobKind, path: Option<&PathBuf>) {
        let Some(path) = path else {
            return;
        };
        match tokio::fs::read(path).await {
            Ok(data) => {
                let rid = run_id.to_string();
                let saved =
                    with_store(&self.store, move |store| store.save_blob(&rid, turn, kind, &data))
                        .await;
                if let Err(e) = saved {
                    warn!(run_id, turn, ?kind, "failed to store blob: {e:#}");
                }
            }
            Err(e) => debug!(run_id, turn, ?kind, path = %path.display(), error = %e, "no blob captured"),
        }
    }
}

/// Attach the hand just played to the previous turn when that turn was a
/// hand selection.
fn backfill_hand_result(
    store: &Store,
    run_id: &str,
    turn: u64,
    played: Option<HandResult>,
) -> ante_core::Result<()> {
    let Some(prev_turn) = turn.checked_sub(1) else {
        return Ok(());
    };
    let prev = store
        .turn_state(run_id, prev_turn)?
        .ok_or_else(|| CoreError::MissingPreviousTurn {
            run_id: run_id.to_string(),
            turn: prev_turn,
        })?;
    let prev_phase = prev
        .phase
        .as_deref()
        .map(Phase::from_tag)
        .unwrap_or(Phase::Unknown);
    if prev_phase != Phase::SelectingHand {
        return Ok(());
    }
    if let Some(hand) = played {
        debug!(run_id, turn = prev_turn, hand = %hand.hand_type, "backfilling hand result");
        store.attach_hand_result(run_id, prev_turn, hand)?;
    }
    Ok(())
}

/// Latest notes for the given objects.
fn relevant_notes(store: &Store, objects: &[ObjectRef]) -> ante_core::Result<Vec<NoteRecord>> {
    let mut notes = Vec::new();
    for object in objects {
        if let Some(note) = store.read_note(&object.name, object.kind)? {
            notes.push(note);
        }
    }
    Ok(notes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted decisions; `compose` echoes the request context.
    #[derive(Default)]
    pub struct ScriptedDecider {
        pub decisions: Mutex<VecDeque<anyhow::Result<Decision>>>,
        pub prompts: Mutex<Vec<String>>,
        pub failing_contexts: Vec<String>,
    }

    impl ScriptedDecider {
        pub fn with(decisions: Vec<anyhow::Result<Decision>>) -> Self {
            Self {
                decisions: Mutex::new(decisions.into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Decider for ScriptedDecider {
        async fn decide(&self, request: DecisionRequest<'_>) -> anyhow::Result<Decision> {
            self.prompts.lock().unwrap().push(request.prompt.to_string());
            self.decisions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted decision")))
        }

        async fn compose(
            &self,
            _provider: &str,
            prompt: String,
            context: String,
        ) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt);
            if self.failing_contexts.iter().any(|c| context.contains(c.as_str())) {
                anyhow::bail!("scripted failure for {context}");
            }
            Ok(format!("text for {context}"))
        }
    }

    #[derive(Default)]
    pub struct Recorder {
        pub messages: Mutex<Vec<ObserverMessage>>,
    }

    impl Recorder {
        pub fn kinds(&self) -> Vec<&'static str> {
            self.messages.lock().unwrap().iter().map(|m| m.kind()).collect()
        }
    }

    impl Publisher for Recorder {
        fn publish(&self, msg: ObserverMessage) {
            self.messages.lock().unwrap().push(msg);
        }
    }

    /// Creates fresh runs directly in the store and counts game stops.
    pub struct StoreControl {
        pub store: Store,
        pub stops: Mutex<u32>,
    }

    #[async_trait]
    impl RunControl for StoreControl {
        async fn stop_game(&self) {
            *self.stops.lock().unwrap() += 1;
        }

        async fn start_fresh_run(&self) -> anyhow::Result<String> {
            let run = self.store.create_run("gemini")?;
            self.store.set_current_run(&run.run_id)?;
            Ok(run.run_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use ante_core::action::{Action, HandType, Verb};
    use ante_core::store::EntryKind;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Store,
        decider: Arc<ScriptedDecider>,
        recorder: Arc<Recorder>,
        control: Arc<StoreControl>,
        orch: Arc<Orchestrator>,
    }

    fn harness(decisions: Vec<anyhow::Result<Decision>>, settings: TurnSettings) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("ante.redb")).unwrap();
        let decider = Arc::new(ScriptedDecider::with(decisions));
        let recorder = Arc::new(Recorder::default());
        let control = Arc::new(StoreControl {
            store: store.clone(),
            stops: Mutex::new(0),
        });
        let orch = Arc::new(Orchestrator::new(
            store.clone(),
            decider.clone(),
            recorder.clone(),
            control.clone(),
            2,
            settings,
        ));
        Harness {
            _dir: dir,
            store,
            decider,
            recorder,
            control,
            orch,
        }
    }

    fn decision(verb: Verb, positions: Vec<i64>) -> anyhow::Result<Decision> {
        Ok(Decision {
            action: Action::new(verb, positions),
            reasoning: "scripted".into(),
        })
    }

    fn play(positions: Vec<i64>) -> anyhow::Result<Decision> {
        let mut action = Action::new(Verb::Play, positions);
        action.intended_hand_type = Some(HandType::Pair);
        action.estimated_chips = Some(40);
        Ok(Decision {
            action,
            reasoning: "pair".into(),
        })
    }

    fn state(tag: &str, extra: Value) -> GameState {
        let mut raw = json!({"state": tag, "ante": 1, "round_number": 1});
        if let (Some(obj), Some(more)) = (raw.as_object_mut(), extra.as_object()) {
            for (k, v) in more {
                obj.insert(k.clone(), v.clone());
            }
        }
        GameState::from_value(raw).unwrap()
    }

    fn new_run(h: &Harness) -> String {
        h.store.current_or_create("gemini").unwrap().run_id
    }

    #[tokio::test]
    async fn actionable_state_stores_snapshot_then_reply() {
        let h = harness(vec![decision(Verb::PlayRound, vec![])], TurnSettings::default());
        let run = new_run(&h);

        let outcome = h
            .orch
            .process_turn(&run, state("BLIND_SELECT", json!({})))
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Decided { turn: 0, .. }));
        let history = h.store.run_history(&run).unwrap();
        let kinds: Vec<EntryKind> = history.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::State, EntryKind::Reply]);
        assert!(!history[1].delivered);
        assert_eq!(h.recorder.kinds(), vec!["state_update", "decision_response"]);

        let taken = h.store.take_pending(&run).unwrap().unwrap();
        assert_eq!(taken.payload["action"], "play_round");
    }

    #[tokio::test]
    async fn prompt_carries_history_and_commands() {
        let h = harness(
            vec![decision(Verb::PlayRound, vec![]), play(vec![1, 2])],
            TurnSettings {
                strategy: Some("Always build flushes.".into()),
                ..TurnSettings::default()
            },
        );
        let run = new_run(&h);
        h.orch
            .process_turn(&run, state("BLIND_SELECT", json!({})))
            .await
            .unwrap();
        h.orch
            .process_turn(&run, state("SELECTING_HAND", json!({})))
            .await
            .unwrap();

        let prompts = h.decider.prompts.lock().unwrap();
        let second = &prompts[1];
        assert!(second.starts_with("The following context"));
        assert!(second.contains("Always build flushes."));
        assert!(second.contains("[PREVIOUS STATE - Turn 1]"));
        assert!(second.contains("[MY PREVIOUS ACTION - Turn 1]"));
        assert!(second.contains("[CURRENT STATE - Take action from this state]"));
        assert!(second.contains("# Available Commands"));
    }

    #[tokio::test]
    async fn hand_result_is_backfilled_onto_previous_hand_selection() {
        let h = harness(
            vec![play(vec![1, 2]), decision(Verb::BuyCard, vec![1])],
            TurnSettings::default(),
        );
        let run = new_run(&h);
        h.orch
            .process_turn(&run, state("SELECTING_HAND", json!({})))
            .await
            .unwrap();
        h.orch
            .process_turn(
                &run,
                state(
                    "SHOP",
                    json!({"played_hands": [{"hand_name": "Pair", "chips_earned": 64}]}),
                ),
            )
            .await
            .unwrap();

        let prev = h.store.turn_state(&run, 0).unwrap().unwrap();
        let result = prev.hand_result.unwrap();
        assert_eq!(result.hand_type, "Pair");
        assert_eq!(result.chips_earned, 64);
    }

    #[tokio::test]
    async fn missing_previous_snapshot_is_fatal() {
        let h = harness(vec![], TurnSettings::default());
        let run = new_run(&h);
        // A reply without its state: turn 1 is next, turn 0 has no snapshot.
        h.store
            .save_reply(&run, 0, json!({"action": "play_round", "positions": []}))
            .unwrap();

        let err = h
            .orch
            .process_turn(&run, state("SHOP", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::MissingPreviousTurn { turn: 0, .. })
        ));
    }

    #[tokio::test]
    async fn game_over_marks_lost_and_starts_fresh_run() {
        let h = harness(vec![], TurnSettings::default());
        let run = new_run(&h);

        let outcome = h
            .orch
            .process_turn(&run, state("GAME_OVER", json!({})))
            .await
            .unwrap();

        let TurnOutcome::RunEnded { next_run, .. } = outcome else {
            panic!("expected RunEnded, got {outcome:?}");
        };
        assert_ne!(next_run, run);
        assert_eq!(h.store.run(&run).unwrap().unwrap().outcome(), Some(Outcome::Lost));
        assert_eq!(h.store.current_run().unwrap().as_deref(), Some(next_run.as_str()));
        assert_eq!(*h.control.stops.lock().unwrap(), 1);
        assert!(h.decider.prompts.lock().unwrap().is_empty());
        assert!(h.store.run_history(&run).unwrap().is_empty());
    }

    #[tokio::test]
    async fn transitional_state_is_recorded_without_decision() {
        let h = harness(vec![], TurnSettings::default());
        let run = new_run(&h);

        let outcome = h
            .orch
            .process_turn(&run, state("HAND_PLAYED", json!({})))
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Recorded { turn: 0 });
        assert_eq!(h.store.run_history(&run).unwrap().len(), 1);
        assert!(h.store.pending_action(&run).unwrap().is_none());
        assert_eq!(h.recorder.kinds(), vec!["state_update"]);
    }

    #[tokio::test]
    async fn failed_decision_leaves_snapshot_but_no_reply() {
        let h = harness(
            vec![Err(anyhow::anyhow!("provider exhausted"))],
            TurnSettings::default(),
        );
        let run = new_run(&h);

        assert!(h
            .orch
            .process_turn(&run, state("SHOP", json!({})))
            .await
            .is_err());
        let history = h.store.run_history(&run).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, EntryKind::State);
        assert!(h.store.pending_action(&run).unwrap().is_none());
    }

    #[tokio::test]
    async fn ingest_rejects_seed_mismatch_before_spawning() {
        let h = harness(vec![decision(Verb::PlayRound, vec![])], TurnSettings::default());
        let first = h
            .orch
            .ingest(json!({"state": "BLIND_SELECT", "seed": "AAAA"}))
            .unwrap();
        first.task.await.unwrap();

        let err = h
            .orch
            .ingest(json!({"state": "BLIND_SELECT", "seed": "BBBB"}))
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::SeedMismatch { .. }));
        assert_eq!(h.store.seed(&first.run_id).unwrap().as_deref(), Some("AAAA"));
    }

    #[tokio::test]
    async fn ingest_swallows_background_failures() {
        let h = harness(vec![], TurnSettings::default());
        let ingested = h.orch.ingest(json!({"state": "SHOP"})).unwrap();
        // The task completes normally even though no decision was scripted.
        ingested.task.await.unwrap();
        assert!(h.store.pending_action(&ingested.run_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn save_file_is_captured_per_turn() {
        let dir = TempDir::new().unwrap();
        let save = dir.path().join("save.jkr");
        std::fs::write(&save, b"SAVE").unwrap();
        let h = harness(
            vec![decision(Verb::PlayRound, vec![])],
            TurnSettings {
                save_path: Some(save),
                ..TurnSettings::default()
            },
        );
        let run = new_run(&h);
        h.orch
            .process_turn(&run, state("BLIND_SELECT", json!({})))
            .await
            .unwrap();

        assert_eq!(
            h.store.blob(&run, 0, BlobKind::Save).unwrap().as_deref(),
            Some(&b"SAVE"[..])
        );
    }

    #[tokio::test]
    async fn existing_notes_are_added_to_prompt() {
        let h = harness(vec![decision(Verb::SellJoker, vec![1])], TurnSettings::default());
        let run = new_run(&h);
        h.store
            .write_note("Baron", ante_core::objects::ObjectKind::Joker, "Kings in hand.")
            .unwrap();
        h.orch
            .process_turn(
                &run,
                state("SHOP", json!({"jokers": [{"name": "Baron", "rarity": 3}]})),
            )
            .await
            .unwrap();

        let prompts = h.decider.prompts.lock().unwrap();
        assert!(prompts[0].contains("Kings in hand."));
    }
}
