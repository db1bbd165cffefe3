use crate::config::open_store;
use crate::output::print_json;
use ante_core::config::Config;

pub fn run(config: &Config, run_id: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store.require_run(run_id)?;
    store.purge_run(run_id)?;

    if json {
        return print_json(&serde_json::json!({ "status": "deleted", "run_id": run_id }));
    }
    println!("Run {run_id} purged.");
    Ok(())
}
