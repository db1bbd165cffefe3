//! End-of-run reflection and game-plan synthesis.

use std::sync::Arc;

use ante_core::prompt::{
    ante_history, ante_summary_prompt, final_reflection_prompt, game_plan_prompt, group_turns,
    hands_trajectory, views_by_ante, TurnView,
};
use ante_core::state::GameOverStats;
use ante_core::store::{Outcome, Store};
use chrono::Utc;
use tracing::{info, warn};

use crate::analysis::Analyst;
use crate::hub::ObserverMessage;
use crate::offload::with_store;
use crate::orchestrator::{Decider, Publisher};

#[derive(Clone)]
pub struct Reflector {
    store: Store,
    decider: Arc<dyn Decider>,
    publisher: Arc<dyn Publisher>,
    analyst: Analyst,
    default_provider: String,
}

impl Reflector {
    pub fn new(
        store: Store,
        decider: Arc<dyn Decider>,
        publisher: Arc<dyn Publisher>,
        analyst: Analyst,
        default_provider: String,
    ) -> Self {
        Self {
            store,
            decider,
            publisher,
            analyst,
            default_provider,
        }
    }

    /// Revise object notes and write the run's narrative. Note revision and
    /// the narrative run concurrently; a failed note is logged, a failed
    /// narrative is returned.
    pub async fn reflect(&self, run_id: &str, stats: Option<GameOverStats>) -> anyhow::Result<String> {
        let rid = run_id.to_string();
        let (run, history) = with_store(&self.store, move |store| {
            let run = store.require_run(&rid)?;
            let history = store.run_history(&rid)?;
            Ok((run, history))
        })
        .await?;
        let provider = run
            .provider
            .clone()
            .unwrap_or_else(|| self.default_provider.clone());
        let views = group_turns(&history);
        let stats = stats.or_else(|| derive_stats(&views));

        let (notes, narrative) = tokio::join!(
            self.analyst.postgame_notes(&provider, &views),
            self.narrative(&provider, run_id, run.plan.as_deref(), run.outcome(), stats, views.clone()),
        );
        match notes {
            Ok(report) => info!(
                run_id,
                written = report.written.len(),
                failed = report.failed.len(),
                "post-run notes revised"
            ),
            Err(e) => warn!(run_id, "post-run notes failed: {e:#}"),
        }
        let reflection = narrative?;

        let (rid, text) = (run_id.to_string(), reflection.clone());
        with_store(&self.store, move |store| store.save_reflection(&rid, &text, stats)).await?;
        info!(run_id, "reflection stored");
        self.publisher.publish(ObserverMessage::Reflection {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            reflection: reflection.clone(),
            stats,
        });
        Ok(reflection)
    }

    /// Per-ante summaries, latest ante first so each summary can see what
    /// came after it, then one final reflection over all of them.
    async fn narrative(
        &self,
        provider: &str,
        run_id: &str,
        plan: Option<&str>,
        outcome: Option<Outcome>,
        stats: Option<GameOverStats>,
        views: Vec<TurnView>,
    ) -> anyhow::Result<String> {
        let mut summaries: Vec<(i64, String)> = Vec::new();
        for (ante, ante_views) in views_by_ante(views).into_iter().rev() {
            let later: String = summaries
                .iter()
                .rev()
                .map(|(a, s)| format!("## Ante {a} Summary\n{s}\n"))
                .collect::<Vec<_>>()
                .join("\n");
            let prompt = ante_summary_prompt(ante, &ante_history(&ante_views), &later);
            let summary = self
                .decider
                .compose(provider, prompt, format!("Summarizing ante {ante} of {run_id}"))
                .await?;
            summaries.push((ante, summary));
        }
        summaries.reverse();

        let summaries_text = summaries
            .iter()
            .map(|(a, s)| format!("## Ante {a} Summary\n{s}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        let outcome_text = match outcome {
            Some(Outcome::Won) => "The run was won.",
            Some(Outcome::Lost) => "The run was lost.",
            None => "The run did not finish.",
        };
        let stats_text = stats
            .map(|s| {
                format!(
                    "Final ante: {}\nFinal round: {}\nBest hand: {} chips\n",
                    s.final_ante, s.final_round, s.best_hand
                )
            })
            .unwrap_or_default();
        let prompt = final_reflection_prompt(plan, &summaries_text, outcome_text, &stats_text);
        let final_reflection = self
            .decider
            .compose(provider, prompt, format!("Reflecting on {run_id}"))
            .await?;

        Ok(format!(
            "# Per-Ante Summaries\n{summaries_text}\n\n# Final Reflection\n{final_reflection}"
        ))
    }

    /// Synthesize a plan for `run_id` from earlier reflections. Returns
    /// `None` when no reflected run exists yet.
    pub async fn game_plan(&self, run_id: &str) -> anyhow::Result<Option<String>> {
        let rid = run_id.to_string();
        let (past, provider) = with_store(&self.store, move |store| {
            Ok((store.reflected_runs()?, store.provider(&rid)?))
        })
        .await?;
        let Some(prompt) = game_plan_prompt(&past) else {
            return Ok(None);
        };
        let provider = provider.unwrap_or_else(|| self.default_provider.clone());
        let plan = self
            .decider
            .compose(&provider, prompt, format!("Planning {run_id}"))
            .await?;
        let (rid, text) = (run_id.to_string(), plan.clone());
        with_store(&self.store, move |store| store.set_plan(&rid, &text)).await?;
        info!(run_id, from_runs = past.len(), "game plan stored");
        Ok(Some(plan))
    }
}

/// Stats recovered from stored turns when the game did not report them.
fn derive_stats(views: &[TurnView]) -> Option<GameOverStats> {
    let last = views.iter().rev().find_map(|v| v.state.as_ref())?;
    let raw = &last.game_state;
    let best_hand = hands_trajectory(views)
        .iter()
        .map(|h| h.actual_chips)
        .max()
        .unwrap_or(0);
    Some(GameOverStats {
        best_hand,
        final_ante: raw.get("ante").and_then(|v| v.as_i64()).unwrap_or(0),
        final_round: raw.get("round_number").and_then(|v| v.as_i64()).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testutil::{Recorder, ScriptedDecider};
    use ante_core::state::StateSnapshot;
    use serde_json::json;
    use tempfile::TempDir;

    struct Setup {
        _dir: TempDir,
        store: Store,
        decider: Arc<ScriptedDecider>,
        recorder: Arc<Recorder>,
        reflector: Reflector,
    }

    fn setup(failing: &[&str]) -> Setup {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("ante.redb")).unwrap();
        let decider = Arc::new(ScriptedDecider {
            failing_contexts: failing.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        let recorder = Arc::new(Recorder::default());
        let analyst = Analyst::new(store.clone(), decider.clone(), 2);
        let reflector = Reflector::new(
            store.clone(),
            decider.clone(),
            recorder.clone(),
            analyst,
            "gemini".into(),
        );
        Setup {
            _dir: dir,
            store,
            decider,
            recorder,
            reflector,
        }
    }

    fn save(store: &Store, run: &str, turn: u64, ante: i64) {
        let snapshot = StateSnapshot {
            game_state: json!({"state": "SHOP", "ante": ante, "round_number": turn + 1}),
            state_string: format!("shop at ante {ante}"),
            prompt: String::new(),
        };
        store
            .save_state(run, turn, serde_json::to_value(&snapshot).unwrap(), "SHOP", Some(ante))
            .unwrap();
    }

    #[tokio::test]
    async fn reflection_summarizes_antes_latest_first() {
        let s = setup(&[]);
        let run = s.store.create_run("gemini").unwrap().run_id;
        save(&s.store, &run, 0, 1);
        save(&s.store, &run, 1, 2);
        s.store.set_outcome(&run, Outcome::Lost).unwrap();

        let text = s.reflector.reflect(&run, None).await.unwrap();

        assert!(text.starts_with("# Per-Ante Summaries\n## Ante 1 Summary"));
        assert!(text.contains("# Final Reflection\ntext for Reflecting on"));
        let prompts = s.decider.prompts.lock().unwrap();
        // Ante 2 is summarized first; ante 1 sees it as later context.
        assert!(prompts[0].contains("Summarize ante 2"));
        assert!(prompts[1].contains("Summarize ante 1"));
        assert!(prompts[1].contains("## Ante 2 Summary"));

        let record = s.store.run(&run).unwrap().unwrap();
        assert_eq!(record.reflection.as_deref(), Some(text.as_str()));
        assert_eq!(record.final_ante, Some(2));
        assert_eq!(record.final_round, Some(2));
        assert_eq!(s.recorder.kinds(), vec!["reflection"]);
    }

    #[tokio::test]
    async fn reported_stats_win_over_derived_ones() {
        let s = setup(&[]);
        let run = s.store.create_run("gemini").unwrap().run_id;
        save(&s.store, &run, 0, 1);
        let stats = GameOverStats {
            best_hand: 1200,
            final_ante: 3,
            final_round: 9,
        };

        s.reflector.reflect(&run, Some(stats)).await.unwrap();

        let record = s.store.run(&run).unwrap().unwrap();
        assert_eq!(record.best_hand, Some(1200));
        assert_eq!(record.final_ante, Some(3));
    }

    #[tokio::test]
    async fn failed_narrative_stores_nothing() {
        let s = setup(&["Reflecting"]);
        let run = s.store.create_run("gemini").unwrap().run_id;
        save(&s.store, &run, 0, 1);

        assert!(s.reflector.reflect(&run, None).await.is_err());
        assert!(s.store.run(&run).unwrap().unwrap().reflection.is_none());
        assert!(s.recorder.kinds().is_empty());
    }

    #[tokio::test]
    async fn game_plan_needs_reflected_runs() {
        let s = setup(&[]);
        let fresh = s.store.create_run("gemini").unwrap().run_id;
        assert_eq!(s.reflector.game_plan(&fresh).await.unwrap(), None);

        let old = s.store.create_run("gemini").unwrap().run_id;
        s.store.set_outcome(&old, Outcome::Lost).unwrap();
        s.store
            .save_reflection(
                &old,
                "Too greedy on rerolls.",
                Some(GameOverStats {
                    best_hand: 300,
                    final_ante: 2,
                    final_round: 5,
                }),
            )
            .unwrap();

        let plan = s.reflector.game_plan(&fresh).await.unwrap().unwrap();
        assert_eq!(s.store.plan(&fresh).unwrap().as_deref(), Some(plan.as_str()));
        let prompts = s.decider.prompts.lock().unwrap();
        assert!(prompts.last().unwrap().contains("Too greedy on rerolls."));
    }

    #[tokio::test]
    async fn unknown_run_is_an_error() {
        let s = setup(&[]);
        assert!(s.reflector.reflect("missing", None).await.is_err());
    }
}
