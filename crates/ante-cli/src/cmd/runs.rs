use crate::config::open_store;
use crate::output::{excerpt, or_dash, print_json, print_table};
use ante_core::config::Config;
use ante_core::prompt::group_turns;
use ante_core::store::{Outcome, RunRecord};

fn outcome_label(run: &RunRecord) -> &'static str {
    match run.outcome() {
        Some(Outcome::Won) => "won",
        Some(Outcome::Lost) => "lost",
        None => "active",
    }
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

pub fn list(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let runs = store.list_runs()?;
    let current = store.current_run()?;

    if json {
        return print_json(&runs);
    }
    if runs.is_empty() {
        println!("No runs.");
        return Ok(());
    }

    let rows = runs
        .iter()
        .map(|r| {
            let marker = if current.as_deref() == Some(r.run_id.as_str()) {
                "*"
            } else {
                ""
            };
            vec![
                format!("{}{marker}", r.run_id),
                r.started_at.format("%Y-%m-%d %H:%M").to_string(),
                or_dash(r.provider.as_deref()),
                or_dash(r.seed.as_deref()),
                outcome_label(r).to_string(),
                or_dash(r.final_ante),
                or_dash(r.best_hand),
            ]
        })
        .collect();
    print_table(
        &["RUN", "STARTED", "PROVIDER", "SEED", "OUTCOME", "ANTE", "BEST"],
        rows,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

pub fn history(config: &Config, run_id: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let run = store.require_run(run_id)?;
    let entries = store.run_history(run_id)?;

    if json {
        return print_json(&serde_json::json!({ "run": run, "turns": entries }));
    }

    println!("Run {} ({})", run.run_id, outcome_label(&run));
    if entries.is_empty() {
        println!("No turns recorded.");
        return Ok(());
    }

    let rows = group_turns(&entries)
        .into_iter()
        .map(|view| {
            let phase = view
                .state
                .as_ref()
                .map(|s| s.phase().to_string())
                .unwrap_or_else(|| "-".to_string());
            let (command, reasoning) = match &view.decision {
                Some(d) => (d.action.command(), excerpt(&d.reasoning, 60)),
                None => ("-".to_string(), String::new()),
            };
            let result = view
                .hand_result
                .as_ref()
                .map(|h| format!("{} for {}", h.hand_type, h.chips_earned))
                .unwrap_or_default();
            vec![
                (view.turn + 1).to_string(),
                or_dash(view.ante),
                phase,
                command,
                result,
                reasoning,
            ]
        })
        .collect();
    print_table(
        &["TURN", "ANTE", "PHASE", "ACTION", "RESULT", "REASONING"],
        rows,
    );
    Ok(())
}
