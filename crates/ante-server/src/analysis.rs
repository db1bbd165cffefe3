//! Object-note generation through a bounded pool of concurrent requests.
//!
//! Each item is persisted as soon as its text arrives. One failed request
//! never discards notes already written by its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;

use ante_core::objects::{collect_objects, ObjectKind, ObjectRef};
use ante_core::prompt::{first_impression_prompt, format_trajectory, hands_trajectory, postgame_object_prompt, TurnView};
use ante_core::store::Store;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use crate::offload::with_store;
use crate::orchestrator::Decider;

/// What a batch produced, per object.
#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub written: Vec<ObjectRef>,
    pub failed: Vec<(ObjectRef, String)>,
}

impl AnalysisReport {
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct Analyst {
    store: Store,
    decider: Arc<dyn Decider>,
    workers: usize,
}

impl Analyst {
    pub fn new(store: Store, decider: Arc<dyn Decider>, workers: usize) -> Self {
        Self {
            store,
            decider,
            workers: workers.max(1),
        }
    }

    /// First-impression notes for objects in `states` that have none yet.
    pub async fn analyze_new_objects<'a, I>(
        &self,
        provider: &str,
        states: I,
    ) -> anyhow::Result<AnalysisReport>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let objects = collect_objects(states);
        let unseen = with_store(&self.store, move |store| {
            let mut unseen = Vec::new();
            for (object, description) in objects {
                if store.read_note(&object.name, object.kind)?.is_none() {
                    unseen.push((object, description));
                }
            }
            Ok(unseen)
        })
        .await?;
        let jobs = unseen
            .into_iter()
            .map(|(object, description)| {
                let prompt = first_impression_prompt(&object, &description);
                (object, prompt)
            })
            .collect();
        Ok(self.run_batch(provider, jobs).await)
    }

    /// Revised notes for every joker and consumable seen during a run, using
    /// the hands actually played as evidence.
    pub async fn postgame_notes(
        &self,
        provider: &str,
        views: &[TurnView],
    ) -> anyhow::Result<AnalysisReport> {
        let trajectory = format_trajectory(&hands_trajectory(views));
        let states = views
            .iter()
            .filter_map(|v| v.state.as_ref())
            .map(|s| &s.game_state);
        let objects: BTreeMap<ObjectRef, String> = collect_objects(states)
            .into_iter()
            .filter(|(o, _)| matches!(o.kind, ObjectKind::Joker | ObjectKind::Consumable))
            .collect();

        let objects: Vec<ObjectRef> = objects.into_keys().collect();
        let previous = with_store(&self.store, move |store| {
            objects
                .into_iter()
                .map(|object| {
                    let note = store.read_note(&object.name, object.kind)?;
                    Ok((object, note))
                })
                .collect::<ante_core::Result<Vec<_>>>()
        })
        .await?;
        let jobs = previous
            .into_iter()
            .map(|(object, note)| {
                let prompt =
                    postgame_object_prompt(&object, &trajectory, note.as_ref().map(|n| n.text.as_str()));
                (object, prompt)
            })
            .collect();
        Ok(self.run_batch(provider, jobs).await)
    }

    async fn run_batch(&self, provider: &str, jobs: Vec<(ObjectRef, String)>) -> AnalysisReport {
        if jobs.is_empty() {
            return AnalysisReport::default();
        }
        let total = jobs.len();
        let results: Vec<(ObjectRef, anyhow::Result<u32>)> = stream::iter(jobs)
            .map(|(object, prompt)| async move {
                let result = self.analyze_one(provider, &object, prompt).await;
                (object, result)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut report = AnalysisReport::default();
        for (object, result) in results {
            match result {
                Ok(_) => report.written.push(object),
                Err(e) => {
                    warn!(object = %object, "note generation failed: {e:#}");
                    report.failed.push((object, format!("{e:#}")));
                }
            }
        }
        info!(
            total,
            written = report.written.len(),
            failed = report.failed.len(),
            "object analysis finished"
        );
        report
    }

    async fn analyze_one(&self, provider: &str, object: &ObjectRef, prompt: String) -> anyhow::Result<u32> {
        let text = self
            .decider
            .compose(provider, prompt, format!("Analyzing {object}"))
            .await?;
        let (name, kind) = (object.name.clone(), object.kind);
        with_store(&self.store, move |store| store.write_note(&name, kind, &text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testutil::ScriptedDecider;
    use ante_core::action::{Action, Decision, HandType, Verb};
    use ante_core::state::{HandResult, StateSnapshot};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(failing: &[&str]) -> (TempDir, Store, Analyst) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("ante.redb")).unwrap();
        let decider = Arc::new(ScriptedDecider {
            failing_contexts: failing.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        let analyst = Analyst::new(store.clone(), decider, 2);
        (dir, store, analyst)
    }

    fn shop_state() -> Value {
        json!({
            "state": "SHOP",
            "jokers": [
                {"name": "Baron", "main_description": "Kings held give x1.5 Mult"},
                {"name": "Blueprint", "main_description": "Copies the joker to the right"}
            ],
            "consumeables": [{"name": "The Fool", "type": "Tarot"}]
        })
    }

    #[tokio::test]
    async fn only_unnoted_objects_are_analyzed() {
        let (_dir, store, analyst) = setup(&[]);
        store.write_note("Baron", ObjectKind::Joker, "known").unwrap();

        let state = shop_state();
        let report = analyst.analyze_new_objects("gemini", [&state]).await.unwrap();

        let names: Vec<&str> = report.written.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Blueprint"));
        assert!(names.contains(&"The Fool"));
        assert_eq!(store.read_note("Baron", ObjectKind::Joker).unwrap().unwrap().version, 1);
        assert_eq!(
            store.read_note("Blueprint", ObjectKind::Joker).unwrap().unwrap().text,
            "text for Analyzing Blueprint (joker)"
        );
    }

    #[tokio::test]
    async fn sibling_failure_keeps_successful_notes() {
        let (_dir, store, analyst) = setup(&["Blueprint"]);
        let state = shop_state();

        let report = analyst.analyze_new_objects("gemini", [&state]).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.name, "Blueprint");
        assert_eq!(report.written.len(), 2);
        assert!(store.read_note("Baron", ObjectKind::Joker).unwrap().is_some());
        assert!(store.read_note("Blueprint", ObjectKind::Joker).unwrap().is_none());
    }

    #[tokio::test]
    async fn postgame_revises_jokers_and_consumables() {
        let (_dir, store, analyst) = setup(&[]);
        store.write_note("Baron", ObjectKind::Joker, "first look").unwrap();

        let mut action = Action::new(Verb::Play, vec![1, 2]);
        action.intended_hand_type = Some(HandType::Pair);
        action.estimated_chips = Some(50);
        let mut raw = shop_state();
        raw["state"] = json!("SELECTING_HAND");
        raw["owned_vouchers"] = json!(["Overstock"]);
        let views = vec![TurnView {
            turn: 0,
            ante: Some(1),
            state: Some(StateSnapshot {
                game_state: raw,
                state_string: String::new(),
                prompt: String::new(),
            }),
            decision: Some(Decision {
                action,
                reasoning: String::new(),
            }),
            hand_result: Some(HandResult {
                hand_type: "Pair".into(),
                chips_earned: 44,
            }),
        }];

        let report = analyst.postgame_notes("gemini", &views).await.unwrap();

        assert_eq!(report.written.len(), 3);
        assert!(report.written.iter().all(|o| o.kind != ObjectKind::Voucher));
        assert_eq!(store.read_note("Baron", ObjectKind::Joker).unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let (_dir, _store, analyst) = setup(&[]);
        let state = json!({"state": "MENU"});
        let report = analyst.analyze_new_objects("gemini", [&state]).await.unwrap();
        assert!(report.is_empty());
    }
}
