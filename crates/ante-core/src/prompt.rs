//! Prompt assembly: context windows over stored turns, the per-turn decision
//! prompt, and the analysis prompts used for notes and reflections.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::action::{ActionSchema, Decision, Verb};
use crate::objects::{ObjectKind, ObjectRef};
use crate::state::{HandResult, Phase, StateSnapshot};
use crate::store::{EntryKind, NoteRecord, RunRecord, TurnEntry};

// ---------------------------------------------------------------------------
// TurnView
// ---------------------------------------------------------------------------

/// A turn's state and reply entries joined back together.
#[derive(Debug, Clone, Default)]
pub struct TurnView {
    pub turn: u64,
    pub ante: Option<i64>,
    pub state: Option<StateSnapshot>,
    pub decision: Option<Decision>,
    pub hand_result: Option<HandResult>,
}

/// Group entries by turn, ascending. Payloads that fail to decode are left
/// out of the view rather than failing the whole history.
pub fn group_turns(entries: &[TurnEntry]) -> Vec<TurnView> {
    let mut by_turn: BTreeMap<u64, TurnView> = BTreeMap::new();
    for entry in entries {
        let view = by_turn.entry(entry.turn).or_insert_with(|| TurnView {
            turn: entry.turn,
            ..Default::default()
        });
        match entry.kind {
            EntryKind::State => {
                view.state = serde_json::from_value(entry.payload.clone()).ok();
                view.ante = entry.ante;
                view.hand_result = entry.hand_result.clone();
            }
            EntryKind::Reply => {
                view.decision = serde_json::from_value(entry.payload.clone()).ok();
            }
        }
    }
    by_turn.into_values().collect()
}

/// Prior turns rendered for the decision prompt, oldest first. Turn numbers
/// are shown 1-based.
pub fn context_window(views: &[TurnView]) -> String {
    let mut parts = Vec::new();
    for view in views {
        if let Some(state) = &view.state {
            parts.push(format!(
                "[PREVIOUS STATE - Turn {}]\n{}",
                view.turn + 1,
                state.state_string
            ));
        }
        if let Some(decision) = &view.decision {
            let mut block = format!("[MY PREVIOUS ACTION - Turn {}]\n", view.turn + 1);
            if !decision.reasoning.is_empty() {
                block.push_str(&format!("Reasoning: {}\n", decision.reasoning));
            }
            block.push_str(&format!("Command: {}\n", decision.action.command()));
            parts.push(block);
        }
    }
    if parts.is_empty() {
        return String::new();
    }
    parts.join("\n\n") + "\n"
}

/// Notes for the objects relevant to the current state.
pub fn notes_section(notes: &[NoteRecord]) -> String {
    if notes.is_empty() {
        return String::new();
    }
    let blocks: Vec<String> = notes
        .iter()
        .map(|n| format!("### {} ({})\n{}", n.name, n.kind, n.text))
        .collect();
    format!("# Game Object Notes\n{}\n", blocks.join("\n\n"))
}

// ---------------------------------------------------------------------------
// TurnPrompt
// ---------------------------------------------------------------------------

const TURN_PREAMBLE: &str = "The following context includes three parts:
1) the state and your actions taken for the last few turns
2) the current game state that you must take action from
3) metadata about the current game state

";

/// Builder for the decision prompt of one turn.
#[derive(Debug, Default)]
pub struct TurnPrompt<'a> {
    strategy: Option<&'a str>,
    plan: Option<&'a str>,
    context: String,
    state_text: &'a str,
    notes: String,
    commands: String,
}

impl<'a> TurnPrompt<'a> {
    pub fn new(state_text: &'a str, schema: &ActionSchema) -> Self {
        TurnPrompt {
            state_text,
            commands: schema.commands_reference(),
            ..Default::default()
        }
    }

    pub fn strategy(mut self, strategy: Option<&'a str>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn plan(mut self, plan: Option<&'a str>) -> Self {
        self.plan = plan;
        self
    }

    pub fn history(mut self, views: &[TurnView]) -> Self {
        self.context = context_window(views);
        self
    }

    pub fn notes(mut self, notes: &[NoteRecord]) -> Self {
        self.notes = notes_section(notes);
        self
    }

    pub fn build(self) -> String {
        let mut acc = String::from(TURN_PREAMBLE);
        for text in [self.strategy, self.plan].into_iter().flatten() {
            acc.push_str(text);
            acc.push_str("\n\n");
        }
        acc.push_str(&self.context);
        acc.push_str("[CURRENT STATE - Take action from this state]\n");
        acc.push_str(self.state_text);
        acc.push_str(&self.notes);
        acc.push_str(&self.commands);
        acc.push_str(
            "\n# Task\nAnalyze the total game state and context above, \
             and respond with the appropriate action to take next.",
        );
        acc
    }
}

// ---------------------------------------------------------------------------
// Played-hand trajectory
// ---------------------------------------------------------------------------

/// One played hand: what the agent intended versus what happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandRecord {
    pub turn: u64,
    pub ante: Option<i64>,
    pub jokers: Vec<String>,
    pub consumables_used: Vec<String>,
    pub vouchers_redeemed: Vec<String>,
    pub intended_hand_type: Option<String>,
    pub estimated_chips: Option<i64>,
    pub actual_hand_type: String,
    pub actual_chips: i64,
}

fn names(state: &serde_json::Value, key: &str) -> Vec<String> {
    state
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|i| i.get("name").and_then(|n| n.as_str()).unwrap_or("Unknown").to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// The item at a 1-based position of a state list, by name and type.
fn picked(state: &serde_json::Value, key: &str, position: Option<&i64>) -> Option<(String, String)> {
    let idx = usize::try_from(*position? - 1).ok()?;
    let item = state.get(key)?.as_array()?.get(idx)?;
    let name = item.get("name")?.as_str()?.to_string();
    let ty = item.get("type").and_then(|t| t.as_str()).unwrap_or("").to_string();
    Some((name, ty))
}

/// Every hand played in a run, with the jokers held, tarot and planet cards
/// used and vouchers bought since the previous hand. Plays without a
/// backfilled result (the run ended mid-hand) are skipped.
pub fn hands_trajectory(views: &[TurnView]) -> Vec<HandRecord> {
    let mut hands = Vec::new();
    let mut consumables: Vec<String> = Vec::new();
    let mut vouchers: Vec<String> = Vec::new();

    for view in views {
        let (Some(state), Some(decision)) = (&view.state, &view.decision) else {
            continue;
        };
        let raw = &state.game_state;
        let action = &decision.action;
        match action.verb {
            Verb::UseConsumable => {
                if let Some((name, ty)) = picked(raw, "consumeables", action.positions.first()) {
                    if ty == "Tarot" || ty == "Planet" {
                        consumables.push(name);
                    }
                }
            }
            Verb::BuyVoucher => {
                if let Some((name, _)) = picked(raw, "shop_vouchers", action.positions.first()) {
                    vouchers.push(name);
                }
            }
            Verb::Play if state.phase() == Phase::SelectingHand => {
                let Some(result) = &view.hand_result else {
                    continue;
                };
                hands.push(HandRecord {
                    turn: view.turn,
                    ante: view.ante.or_else(|| raw.get("ante").and_then(|a| a.as_i64())),
                    jokers: names(raw, "jokers"),
                    consumables_used: std::mem::take(&mut consumables),
                    vouchers_redeemed: std::mem::take(&mut vouchers),
                    intended_hand_type: action.intended_hand_type.map(|h| h.as_str().to_string()),
                    estimated_chips: action.estimated_chips,
                    actual_hand_type: result.hand_type.clone(),
                    actual_chips: result.chips_earned,
                });
            }
            _ => {}
        }
    }
    hands
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

pub fn format_trajectory(hands: &[HandRecord]) -> String {
    hands
        .iter()
        .map(|h| {
            format!(
                "Ante {}, Turn {}:\n  Jokers: [{}]\n  Consumables used before hand: [{}]\n  \
                 Vouchers redeemed before hand: [{}]\n  Intended: {} (est. {} chips)\n  \
                 Actual: {} for {} chips",
                h.ante.map(|a| a.to_string()).unwrap_or_else(|| "?".into()),
                h.turn,
                list_or_none(&h.jokers),
                list_or_none(&h.consumables_used),
                list_or_none(&h.vouchers_redeemed),
                h.intended_hand_type.as_deref().unwrap_or("?"),
                h.estimated_chips.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
                h.actual_hand_type,
                h.actual_chips
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Turns of a single ante, rendered for its summary.
pub fn ante_history(views: &[TurnView]) -> String {
    let mut parts = Vec::new();
    for view in views {
        let mut block = format!("--- Turn {} ---\n", view.turn + 1);
        if let Some(state) = &view.state {
            block.push_str(&format!("Game State:\n{}\n", state.state_string));
        }
        if let Some(decision) = &view.decision {
            block.push_str(&format!("My Reasoning: {}\n", decision.reasoning));
            block.push_str(&format!("My Action: {}\n", decision.action.command()));
        }
        parts.push(block);
    }
    parts.join("\n")
}

/// Views split by ante, ascending. Turns without an ante are dropped.
pub fn views_by_ante(views: Vec<TurnView>) -> BTreeMap<i64, Vec<TurnView>> {
    let mut out: BTreeMap<i64, Vec<TurnView>> = BTreeMap::new();
    for view in views {
        if let Some(ante) = view.ante.filter(|a| *a > 0) {
            out.entry(ante).or_default().push(view);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Analysis prompts
// ---------------------------------------------------------------------------

fn object_noun(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Joker => "joker",
        ObjectKind::Consumable => "consumable card",
        ObjectKind::Voucher => "voucher",
        ObjectKind::Tag => "skip tag",
        ObjectKind::BossBlind => "boss blind",
    }
}

/// First impression of an object seen for the first time.
pub fn first_impression_prompt(object: &ObjectRef, description: &str) -> String {
    let noun = object_noun(object.kind);
    let focus = if object.kind == ObjectKind::BossBlind {
        "Explain what this boss blind punishes, which builds it threatens, and how to prepare for it."
    } else {
        "Explain when this is worth acquiring, what it synergizes with, and when to pass on it."
    };
    format!(
        "You are building a knowledge base for playing Balatro.\n\
         A {noun} called \"{}\" has just been seen for the first time.\n\n\
         Description:\n{description}\n\n{focus}\n\
         Keep the notes concise and practical.",
        object.name
    )
}

/// Revised notes for an object after a completed run.
pub fn postgame_object_prompt(object: &ObjectRef, trajectory: &str, previous: Option<&str>) -> String {
    let noun = object_noun(object.kind);
    let previous = previous
        .map(|p| format!("\n---\n## Last analysis of this object\n\n{p}\n---\n"))
        .unwrap_or_default();
    format!(
        "You are maintaining notes on the {noun} \"{}\" in Balatro.\n\
         Below is every hand played in the last run: the jokers held, items used, the hand \
         you intended with its chip estimate, and what actually scored.\n\n{trajectory}\n{previous}\n\
         Rewrite the notes for \"{}\" using this evidence. Call out where estimates were wrong \
         and why, and when the {noun} should or should not be prioritized.",
        object.name, object.name
    )
}

pub fn ante_summary_prompt(ante: i64, history: &str, later_summaries: &str) -> String {
    let later = if later_summaries.is_empty() {
        String::new()
    } else {
        format!("\nFor context, here is what happened in later antes:\n{later_summaries}\n")
    };
    format!(
        "Summarize ante {ante} of a Balatro run from the turn log below. Note key purchases, \
         hands played, mistakes, and how the blinds were beaten or lost.\n{later}\n\
         # Ante {ante} log\n{history}"
    )
}

pub fn final_reflection_prompt(
    plan: Option<&str>,
    summaries: &str,
    outcome: &str,
    stats: &str,
) -> String {
    let plan = plan
        .map(|p| format!("# Game plan followed\n{p}\n\n"))
        .unwrap_or_default();
    format!(
        "{plan}# Per-ante summaries\n{summaries}\n\n# Outcome\n{outcome}\n{stats}\n\
         Reflect on the run as a whole. What decided the outcome? What should change next time?"
    )
}

/// Synthesize a plan for a new run from reflections on past runs.
pub fn game_plan_prompt(runs: &[RunRecord]) -> Option<String> {
    let mut text = String::new();
    let mut n = 0;
    for run in runs {
        let (Some(ante), Some(round), Some(best), Some(reflection)) =
            (run.final_ante, run.final_round, run.best_hand, run.reflection.as_deref())
        else {
            continue;
        };
        n += 1;
        text.push_str(&format!(
            "\n## Game {n} (Run ID: {})\nFinal Ante: {ante}\nFinal Round: {round}\n\
             Best Hand Chips: {best}\n\nReflection:\n{reflection}\n",
            run.run_id
        ));
    }
    if n == 0 {
        return None;
    }
    Some(format!(
        "Here are reflections from past Balatro runs:\n{text}\n\
         Synthesize these into a concise game plan for the next run: which jokers and hands to \
         build around, how to manage money, and which mistakes to avoid."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, HandType};
    use crate::state::Phase;
    use chrono::Utc;
    use serde_json::{json, Value};

    fn entry(turn: u64, kind: EntryKind, payload: Value) -> TurnEntry {
        TurnEntry {
            run_id: "r".into(),
            turn,
            kind,
            payload,
            timestamp: Utc::now(),
            phase: None,
            ante: Some(1),
            hand_result: None,
            delivered: false,
        }
    }

    fn snapshot(state: Value, text: &str) -> Value {
        json!({"game_state": state, "state_string": text, "prompt": ""})
    }

    #[test]
    fn context_window_renders_state_then_action() {
        let mut play = Action::new(Verb::Play, vec![1, 2]);
        play.intended_hand_type = Some(HandType::Pair);
        play.estimated_chips = Some(50);
        let entries = vec![
            entry(0, EntryKind::State, snapshot(json!({"state": "SELECTING_HAND"}), "S0")),
            entry(
                0,
                EntryKind::Reply,
                serde_json::to_value(Decision {
                    action: play,
                    reasoning: "pair up".into(),
                })
                .unwrap(),
            ),
        ];
        let text = context_window(&group_turns(&entries));
        assert_eq!(
            text,
            "[PREVIOUS STATE - Turn 1]\nS0\n\n[MY PREVIOUS ACTION - Turn 1]\n\
             Reasoning: pair up\nCommand: play 1 2 pair 50\n\n"
        );
        assert!(context_window(&[]).is_empty());
    }

    #[test]
    fn turn_prompt_orders_sections() {
        let schema = ActionSchema::for_phase(Phase::Shop);
        let prompt = TurnPrompt::new("STATE TEXT\n", &schema)
            .strategy(Some("STRATEGY"))
            .plan(None)
            .history(&[])
            .build();
        let s = prompt.find("STRATEGY").unwrap();
        let c = prompt.find("[CURRENT STATE").unwrap();
        let r = prompt.find("# Available Commands").unwrap();
        assert!(s < c && c < r);
        assert!(prompt.contains("reroll_shop"));
        assert!(!prompt.contains("# Game Object Notes"));
    }

    #[test]
    fn trajectory_tracks_items_between_hands() {
        let mut e = vec![
            entry(
                0,
                EntryKind::State,
                snapshot(
                    json!({"state": "SELECTING_HAND", "consumeables": [{"name": "Jupiter", "type": "Planet"}]}),
                    "",
                ),
            ),
            entry(
                0,
                EntryKind::Reply,
                serde_json::to_value(Decision {
                    action: Action::new(Verb::UseConsumable, vec![1]),
                    reasoning: String::new(),
                })
                .unwrap(),
            ),
        ];
        let mut play = Action::new(Verb::Play, vec![1, 2, 3, 4, 5]);
        play.intended_hand_type = Some(HandType::Flush);
        play.estimated_chips = Some(200);
        let mut state = entry(
            1,
            EntryKind::State,
            snapshot(json!({"state": "SELECTING_HAND", "jokers": [{"name": "Joker"}]}), ""),
        );
        state.hand_result = Some(HandResult {
            hand_type: "Flush".into(),
            chips_earned: 240,
        });
        e.push(state);
        e.push(entry(
            1,
            EntryKind::Reply,
            serde_json::to_value(Decision {
                action: play,
                reasoning: String::new(),
            })
            .unwrap(),
        ));

        let hands = hands_trajectory(&group_turns(&e));
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].consumables_used, vec!["Jupiter".to_string()]);
        assert_eq!(hands[0].jokers, vec!["Joker".to_string()]);
        assert_eq!(hands[0].actual_chips, 240);
        assert!(format_trajectory(&hands).contains("Intended: flush (est. 200 chips)"));
    }

    #[test]
    fn game_plan_needs_complete_reflections() {
        let mut run = RunRecord {
            run_id: "abcd1234".into(),
            started_at: Utc::now(),
            provider: None,
            seed: None,
            plan: None,
            reflection: Some("went broke".into()),
            best_hand: Some(500),
            final_ante: Some(3),
            final_round: None,
            ended_at: None,
            completed: true,
            won: Some(false),
        };
        assert!(game_plan_prompt(std::slice::from_ref(&run)).is_none());
        run.final_round = Some(9);
        let prompt = game_plan_prompt(&[run]).unwrap();
        assert!(prompt.contains("Game 1 (Run ID: abcd1234)"));
        assert!(prompt.contains("went broke"));
    }

    #[test]
    fn views_split_by_ante() {
        let mut a = entry(0, EntryKind::State, snapshot(json!({"state": "SHOP"}), ""));
        a.ante = Some(1);
        let mut b = entry(1, EntryKind::State, snapshot(json!({"state": "SHOP"}), ""));
        b.ante = Some(2);
        let mut c = entry(2, EntryKind::State, snapshot(json!({"state": "MENU"}), ""));
        c.ante = None;
        let split = views_by_ante(group_turns(&[a, b, c]));
        assert_eq!(split.len(), 2);
        assert_eq!(split[&2][0].turn, 1);
    }
}
