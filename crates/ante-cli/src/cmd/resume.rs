use crate::config::open_store;
use crate::output::print_json;
use ante_core::config::Config;
use ante_core::store::BlobKind;
use ante_core::CoreError;
use anyhow::{anyhow, Context};

/// Restore the save captured at `turn` and cut the run back to it. The game
/// picks the run up on its next start with `CONTINUE=true`.
pub fn run(config: &Config, run_id: &str, turn: u64, json: bool) -> anyhow::Result<()> {
    let save_path = config
        .game
        .save_path
        .as_ref()
        .ok_or_else(|| anyhow!("game.save_path is not configured"))?;
    let store = open_store(config)?;
    store.require_run(run_id)?;

    let save = store
        .blob(run_id, turn, BlobKind::Save)?
        .ok_or_else(|| CoreError::SnapshotNotFound {
            run_id: run_id.to_string(),
            turn,
        })?;
    ante_core::io::atomic_write(save_path, &save)
        .with_context(|| format!("failed to restore save to {}", save_path.display()))?;
    let removed = store.truncate_run_from(run_id, turn)?;

    if json {
        return print_json(&serde_json::json!({
            "status": "continued",
            "run_id": run_id,
            "turn": turn,
            "removed": removed,
        }));
    }
    println!(
        "Run {run_id} rewound to turn {}: save restored to {}, {removed} records removed.",
        turn + 1,
        save_path.display()
    );
    Ok(())
}
