//! Turn entries and the pending-action mailbox.
//!
//! A turn has at most one state entry and one reply entry. The mailbox is not
//! a table of its own: the pending action for a run is the undelivered reply
//! with the highest turn.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{db_err, remove_range, run_bounds, split_turn_key, turn_key, Store, TURNS};
use crate::error::{CoreError, Result};
use crate::state::HandResult;

// ---------------------------------------------------------------------------
// EntryKind / TurnEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// The state document the game sent.
    State,
    /// The agent's decision for that state.
    Reply,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::State => "state",
            EntryKind::Reply => "reply",
        }
    }

    fn code(self) -> u8 {
        match self {
            EntryKind::State => 0,
            EntryKind::Reply => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEntry {
    pub run_id: String,
    pub turn: u64,
    pub kind: EntryKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ante: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_result: Option<HandResult>,
    /// Only meaningful for replies.
    #[serde(default)]
    pub delivered: bool,
}

impl TurnEntry {
    fn key(&self) -> Result<Vec<u8>> {
        turn_key(&self.run_id, self.turn, self.kind.code())
    }
}

fn decode(bytes: &[u8]) -> Result<TurnEntry> {
    serde_json::from_slice(bytes).map_err(db_err)
}

// ---------------------------------------------------------------------------
// Store: turns
// ---------------------------------------------------------------------------

impl Store {
    /// One past the largest turn stored for `run_id`, or 0 for an empty run.
    pub fn next_turn(&self, run_id: &str) -> Result<u64> {
        let (lo, hi) = run_bounds(run_id, 0)?;
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TURNS).map_err(db_err)?;
        let last = table
            .range(lo.as_slice()..=hi.as_slice())
            .map_err(db_err)?
            .next_back();
        match last {
            Some(entry) => {
                let (k, _) = entry.map_err(db_err)?;
                let (turn, _) = split_turn_key(k.value())
                    .ok_or_else(|| CoreError::Store("corrupt turn key".into()))?;
                Ok(turn + 1)
            }
            None => Ok(0),
        }
    }

    fn insert_entry(&self, entry: &TurnEntry) -> Result<()> {
        let key = entry.key()?;
        let value = serde_json::to_vec(entry)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(TURNS).map_err(db_err)?;
            let exists = table.get(key.as_slice()).map_err(db_err)?.is_some();
            if exists {
                return Err(CoreError::DuplicateEntry {
                    run_id: entry.run_id.clone(),
                    turn: entry.turn,
                    kind: entry.kind.as_str().to_string(),
                });
            }
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// Record the state the game sent for `turn`. A second write for the
    /// same turn is rejected.
    pub fn save_state(
        &self,
        run_id: &str,
        turn: u64,
        payload: Value,
        phase: &str,
        ante: Option<i64>,
    ) -> Result<TurnEntry> {
        let entry = TurnEntry {
            run_id: run_id.to_string(),
            turn,
            kind: EntryKind::State,
            payload,
            timestamp: Utc::now(),
            phase: Some(phase.to_string()),
            ante,
            hand_result: None,
            delivered: false,
        };
        self.insert_entry(&entry)?;
        Ok(entry)
    }

    /// Record the agent's reply for `turn`, undelivered.
    pub fn save_reply(&self, run_id: &str, turn: u64, payload: Value) -> Result<TurnEntry> {
        let entry = TurnEntry {
            run_id: run_id.to_string(),
            turn,
            kind: EntryKind::Reply,
            payload,
            timestamp: Utc::now(),
            phase: None,
            ante: None,
            hand_result: None,
            delivered: false,
        };
        self.insert_entry(&entry)?;
        Ok(entry)
    }

    pub fn entry(&self, run_id: &str, turn: u64, kind: EntryKind) -> Result<Option<TurnEntry>> {
        let key = turn_key(run_id, turn, kind.code())?;
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TURNS).map_err(db_err)?;
        let value = table.get(key.as_slice()).map_err(db_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    pub fn turn_state(&self, run_id: &str, turn: u64) -> Result<Option<TurnEntry>> {
        self.entry(run_id, turn, EntryKind::State)
    }

    /// Attach the outcome of the hand played on `turn` to that turn's state.
    pub fn attach_hand_result(&self, run_id: &str, turn: u64, result: HandResult) -> Result<()> {
        let key = turn_key(run_id, turn, EntryKind::State.code())?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(TURNS).map_err(db_err)?;
            let current = table
                .get(key.as_slice())
                .map_err(db_err)?
                .map(|v| decode(v.value()))
                .transpose()?;
            let mut entry = current.ok_or_else(|| CoreError::MissingPreviousTurn {
                run_id: run_id.to_string(),
                turn,
            })?;
            entry.hand_result = Some(result);
            let value = serde_json::to_vec(&entry)?;
            table
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mailbox
    // -----------------------------------------------------------------------

    /// The undelivered reply with the highest turn, without marking it.
    pub fn pending_action(&self, run_id: &str) -> Result<Option<TurnEntry>> {
        let (lo, hi) = run_bounds(run_id, 0)?;
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TURNS).map_err(db_err)?;
        for item in table
            .range(lo.as_slice()..=hi.as_slice())
            .map_err(db_err)?
            .rev()
        {
            let (_, v) = item.map_err(db_err)?;
            let entry = decode(v.value())?;
            if entry.kind == EntryKind::Reply && !entry.delivered {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Mark the reply for `turn` delivered. Returns false when there is no
    /// reply for that turn.
    pub fn mark_delivered(&self, run_id: &str, turn: u64) -> Result<bool> {
        let key = turn_key(run_id, turn, EntryKind::Reply.code())?;
        let wt = self.db.begin_write().map_err(db_err)?;
        let found = {
            let mut table = wt.open_table(TURNS).map_err(db_err)?;
            let current = table
                .get(key.as_slice())
                .map_err(db_err)?
                .map(|v| decode(v.value()))
                .transpose()?;
            match current {
                Some(mut entry) => {
                    entry.delivered = true;
                    let value = serde_json::to_vec(&entry)?;
                    table
                        .insert(key.as_slice(), value.as_slice())
                        .map_err(db_err)?;
                    true
                }
                None => false,
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(found)
    }

    /// Find the pending action and mark it delivered in one write
    /// transaction, so two pollers can never both receive it.
    ///
    /// Older undelivered replies are superseded: they are marked delivered
    /// in the same transaction and never handed out.
    pub fn take_pending(&self, run_id: &str) -> Result<Option<TurnEntry>> {
        let (lo, hi) = run_bounds(run_id, 0)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        let taken = {
            let mut table = wt.open_table(TURNS).map_err(db_err)?;
            let mut undelivered = Vec::new();
            for item in table
                .range(lo.as_slice()..=hi.as_slice())
                .map_err(db_err)?
                .rev()
            {
                let (_, v) = item.map_err(db_err)?;
                let entry = decode(v.value())?;
                if entry.kind == EntryKind::Reply && !entry.delivered {
                    undelivered.push(entry);
                }
            }
            let mut iter = undelivered.into_iter();
            let latest = iter.next();
            let skipped: Vec<TurnEntry> = iter.collect();
            if let Some(entry) = &latest {
                if !skipped.is_empty() {
                    let turns: Vec<u64> = skipped.iter().map(|e| e.turn).collect();
                    warn!(
                        run_id,
                        turn = entry.turn,
                        skipped = ?turns,
                        "older undelivered replies superseded by the latest one"
                    );
                }
            }
            for mut entry in latest.iter().cloned().chain(skipped) {
                entry.delivered = true;
                let value = serde_json::to_vec(&entry)?;
                table
                    .insert(entry.key()?.as_slice(), value.as_slice())
                    .map_err(db_err)?;
            }
            latest.map(|mut e| {
                e.delivered = true;
                e
            })
        };
        wt.commit().map_err(db_err)?;
        Ok(taken)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    fn scan_run(&self, run_id: &str, from_turn: u64) -> Result<Vec<TurnEntry>> {
        let (lo, hi) = run_bounds(run_id, from_turn)?;
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TURNS).map_err(db_err)?;
        let mut result = Vec::new();
        for item in table.range(lo.as_slice()..=hi.as_slice()).map_err(db_err)? {
            let (_, v) = item.map_err(db_err)?;
            result.push(decode(v.value())?);
        }
        Ok(result)
    }

    /// Every entry of a run, ordered by turn and then kind (state first).
    pub fn run_history(&self, run_id: &str) -> Result<Vec<TurnEntry>> {
        self.scan_run(run_id, 0)
    }

    /// Entries belonging to the last `k` turns of a run, oldest first.
    pub fn recent_turns(&self, run_id: &str, k: usize) -> Result<Vec<TurnEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let all = self.scan_run(run_id, 0)?;
        let mut turns: Vec<u64> = all.iter().map(|e| e.turn).collect();
        turns.dedup();
        let keep_from = turns
            .len()
            .checked_sub(k)
            .map(|i| turns[i])
            .unwrap_or(0);
        Ok(all.into_iter().filter(|e| e.turn >= keep_from).collect())
    }

    /// Entries across all runs, newest first, capped at `limit`.
    pub fn combined_history(&self, limit: usize) -> Result<Vec<TurnEntry>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TURNS).map_err(db_err)?;
        let mut result = Vec::new();
        for item in table.iter().map_err(db_err)? {
            let (_, v) = item.map_err(db_err)?;
            result.push(decode(v.value())?);
        }
        result.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.turn.cmp(&a.turn))
                .then_with(|| b.kind.code().cmp(&a.kind.code()))
        });
        result.truncate(limit);
        Ok(result)
    }

    /// Remove every entry of a run with turn >= `from_turn`. Returns the
    /// number of entries removed.
    pub fn delete_turns_from(&self, run_id: &str, from_turn: u64) -> Result<usize> {
        let (lo, hi) = run_bounds(run_id, from_turn)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = wt.open_table(TURNS).map_err(db_err)?;
            remove_range(&mut table, &lo, &hi)?
        };
        wt.commit().map_err(db_err)?;
        Ok(removed)
    }
}
