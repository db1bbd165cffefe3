use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    db_err, remove_range, run_bounds, Store, BLOBS, CURRENT_RUN_KEY, META, RUNS, TURNS,
};
use crate::error::{CoreError, Result};
use crate::state::GameOverStats;

// ---------------------------------------------------------------------------
// Outcome / RunRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Won,
    Lost,
}

/// One play-through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Decision provider, fixed for the lifetime of the run.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub best_hand: Option<i64>,
    #[serde(default)]
    pub final_ante: Option<i64>,
    #[serde(default)]
    pub final_round: Option<i64>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub won: Option<bool>,
}

impl RunRecord {
    /// Forget how the run ended so it can be played on.
    fn clear_outcome(&mut self) {
        self.won = None;
        self.completed = false;
        self.ended_at = None;
        self.reflection = None;
        self.best_hand = None;
        self.final_ante = None;
        self.final_round = None;
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.won {
            Some(true) => Some(Outcome::Won),
            Some(false) => Some(Outcome::Lost),
            None => None,
        }
    }
}

fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn decode(bytes: &[u8]) -> Result<RunRecord> {
    serde_json::from_slice(bytes).map_err(db_err)
}

// ---------------------------------------------------------------------------
// Store: runs
// ---------------------------------------------------------------------------

impl Store {
    /// Create a run with a fresh 8-character id.
    pub fn create_run(&self, provider: &str) -> Result<RunRecord> {
        let record = RunRecord {
            run_id: new_run_id(),
            started_at: Utc::now(),
            provider: Some(provider.to_string()),
            seed: None,
            plan: None,
            reflection: None,
            best_hand: None,
            final_ante: None,
            final_round: None,
            ended_at: None,
            completed: false,
            won: None,
        };
        let value = serde_json::to_vec(&record)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(RUNS).map_err(db_err)?;
            table
                .insert(record.run_id.as_bytes(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(record)
    }

    pub fn run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(RUNS).map_err(db_err)?;
        let value = table.get(run_id.as_bytes()).map_err(db_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    pub fn require_run(&self, run_id: &str) -> Result<RunRecord> {
        self.run(run_id)?
            .ok_or_else(|| CoreError::RunNotFound(run_id.to_string()))
    }

    /// All runs, newest first.
    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(RUNS).map_err(db_err)?;
        let mut result = Vec::new();
        for item in table.iter().map_err(db_err)? {
            let (_, v) = item.map_err(db_err)?;
            result.push(decode(v.value())?);
        }
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    /// Read-modify-write a run inside one transaction.
    fn update_run<T>(&self, run_id: &str, f: impl FnOnce(&mut RunRecord) -> Result<T>) -> Result<T> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let out = {
            let mut table = wt.open_table(RUNS).map_err(db_err)?;
            let current = table
                .get(run_id.as_bytes())
                .map_err(db_err)?
                .map(|v| decode(v.value()))
                .transpose()?;
            let mut record = current.ok_or_else(|| CoreError::RunNotFound(run_id.to_string()))?;
            let out = f(&mut record)?;
            let value = serde_json::to_vec(&record)?;
            table
                .insert(run_id.as_bytes(), value.as_slice())
                .map_err(db_err)?;
            out
        };
        wt.commit().map_err(db_err)?;
        Ok(out)
    }

    pub fn seed(&self, run_id: &str) -> Result<Option<String>> {
        Ok(self.require_run(run_id)?.seed)
    }

    /// Record the seed reported by the game. The first seed sticks; a
    /// different seed later is an error.
    pub fn record_seed(&self, run_id: &str, seed: &str) -> Result<()> {
        self.update_run(run_id, |r| match r.seed.as_deref() {
            None => {
                r.seed = Some(seed.to_string());
                Ok(())
            }
            Some(existing) if existing == seed => Ok(()),
            Some(existing) => Err(CoreError::SeedMismatch {
                run_id: run_id.to_string(),
                expected: existing.to_string(),
                actual: seed.to_string(),
            }),
        })
    }

    /// Provider recorded on the run, if any.
    pub fn provider(&self, run_id: &str) -> Result<Option<String>> {
        Ok(self.run(run_id)?.and_then(|r| r.provider))
    }

    pub fn plan(&self, run_id: &str) -> Result<Option<String>> {
        Ok(self.run(run_id)?.and_then(|r| r.plan))
    }

    pub fn set_plan(&self, run_id: &str, plan: &str) -> Result<()> {
        self.update_run(run_id, |r| {
            r.plan = Some(plan.to_string());
            Ok(())
        })
    }

    /// Mark the run won or lost and completed.
    pub fn set_outcome(&self, run_id: &str, outcome: Outcome) -> Result<()> {
        self.update_run(run_id, |r| {
            r.won = Some(outcome == Outcome::Won);
            r.completed = true;
            r.ended_at = Some(Utc::now());
            Ok(())
        })
    }

    pub fn save_reflection(
        &self,
        run_id: &str,
        reflection: &str,
        stats: Option<GameOverStats>,
    ) -> Result<()> {
        self.update_run(run_id, |r| {
            r.reflection = Some(reflection.to_string());
            if let Some(s) = stats {
                r.best_hand = Some(s.best_hand);
                r.final_ante = Some(s.final_ante);
                r.final_round = Some(s.final_round);
            }
            Ok(())
        })
    }

    /// Undo a terminal outcome so the run can continue from a restored save.
    pub fn clear_outcome(&self, run_id: &str) -> Result<()> {
        self.update_run(run_id, |r| {
            r.clear_outcome();
            Ok(())
        })
    }

    /// Completed runs that carry a reflection, oldest first.
    pub fn reflected_runs(&self) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .list_runs()?
            .into_iter()
            .filter(|r| r.completed && r.reflection.is_some())
            .collect();
        runs.reverse();
        Ok(runs)
    }

    /// Delete a run with all its turns and blobs. Clears the current-run
    /// pointer if it pointed at this run.
    pub fn purge_run(&self, run_id: &str) -> Result<()> {
        let (lo, hi) = run_bounds(run_id, 0)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut runs = wt.open_table(RUNS).map_err(db_err)?;
            let existed = runs.remove(run_id.as_bytes()).map_err(db_err)?.is_some();
            if !existed {
                return Err(CoreError::RunNotFound(run_id.to_string()));
            }

            for def in [TURNS, BLOBS] {
                let mut table = wt.open_table(def).map_err(db_err)?;
                let keys: Vec<Vec<u8>> = table
                    .range(lo.as_slice()..=hi.as_slice())
                    .map_err(db_err)?
                    .map(|item| item.map(|(k, _)| k.value().to_vec()).map_err(db_err))
                    .collect::<Result<_>>()?;
                for key in &keys {
                    table.remove(key.as_slice()).map_err(db_err)?;
                }
            }

            let mut meta = wt.open_table(META).map_err(db_err)?;
            let is_current = meta
                .get(CURRENT_RUN_KEY)
                .map_err(db_err)?
                .is_some_and(|v| v.value() == run_id.as_bytes());
            if is_current {
                meta.remove(CURRENT_RUN_KEY).map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// Cut a run back to just before `turn` so it can continue from the save
    /// captured at that turn: drops turns and blobs from `turn` on, clears
    /// the outcome and makes it the current run. Restoring the save file is
    /// the caller's job and must happen first.
    ///
    /// All of it commits in one write transaction or not at all.
    pub fn truncate_run_from(&self, run_id: &str, turn: u64) -> Result<usize> {
        let (lo, hi) = run_bounds(run_id, turn)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut runs = wt.open_table(RUNS).map_err(db_err)?;
            let mut record = runs
                .get(run_id.as_bytes())
                .map_err(db_err)?
                .map(|v| decode(v.value()))
                .transpose()?
                .ok_or_else(|| CoreError::RunNotFound(run_id.to_string()))?;
            record.clear_outcome();
            let value = serde_json::to_vec(&record)?;
            runs
                .insert(run_id.as_bytes(), value.as_slice())
                .map_err(db_err)?;

            let mut turns = wt.open_table(TURNS).map_err(db_err)?;
            let mut blobs = wt.open_table(BLOBS).map_err(db_err)?;
            let removed =
                remove_range(&mut turns, &lo, &hi)? + remove_range(&mut blobs, &lo, &hi)?;

            let mut meta = wt.open_table(META).map_err(db_err)?;
            meta
                .insert(CURRENT_RUN_KEY, run_id.as_bytes())
                .map_err(db_err)?;
            removed
        };
        wt.commit().map_err(db_err)?;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Current-run pointer
    // -----------------------------------------------------------------------

    pub fn current_run(&self) -> Result<Option<String>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(META).map_err(db_err)?;
        let value = table.get(CURRENT_RUN_KEY).map_err(db_err)?;
        Ok(value.map(|v| String::from_utf8_lossy(v.value()).into_owned()))
    }

    pub fn set_current_run(&self, run_id: &str) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(META).map_err(db_err)?;
            table
                .insert(CURRENT_RUN_KEY, run_id.as_bytes())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// The current run, creating and recording one with `provider` when no
    /// current run exists or the pointer is stale.
    pub fn current_or_create(&self, provider: &str) -> Result<RunRecord> {
        if let Some(id) = self.current_run()? {
            if let Some(run) = self.run(&id)? {
                return Ok(run);
            }
        }
        let run = self.create_run(provider)?;
        self.set_current_run(&run.run_id)?;
        Ok(run)
    }
}
