//! Durable state for runs, turns, notes and blobs, backed by redb.
//!
//! # Table design
//!
//! Every table maps byte keys to byte values. Composite keys are built so
//! that byte order equals the order we want to scan in:
//!
//! ```text
//! turns : [ run_len: u8 | run_id | turn: u64 BE | kind: u8 ]  -> JSON TurnEntry
//! blobs : [ run_len: u8 | run_id | turn: u64 BE | kind: u8 ]  -> raw bytes
//! notes : [ kind: u8 | name_len: u16 BE | name | version: u32 BE ] -> JSON NoteRecord
//! runs  : run_id                                               -> JSON RunRecord
//! meta  : static string keys (the current-run pointer)
//! ```
//!
//! With the run id length-prefixed, one run's entries form a contiguous
//! range, ordered by turn and then entry kind. The largest turn for a run is
//! the last key of that range.

mod blobs;
mod notes;
mod runs;
mod turns;

pub use blobs::{BlobInfo, BlobKind};
pub use notes::NoteRecord;
pub use runs::{Outcome, RunRecord};
pub use turns::{EntryKind, TurnEntry};

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const TURNS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("turns");
const RUNS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("runs");
const NOTES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("notes");
const BLOBS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blobs");
const META: TableDefinition<&[u8], &[u8]> = TableDefinition::new("meta");

const CURRENT_RUN_KEY: &[u8] = b"current_run";

pub(crate) fn db_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

/// `[run_len | run_id]`, the common prefix of a run's turn and blob keys.
/// Ids must fit the one-byte length.
fn run_prefix(run_id: &str) -> Result<Vec<u8>> {
    let bytes = run_id.as_bytes();
    let len = u8::try_from(bytes.len()).map_err(|_| CoreError::InvalidRunId(run_id.to_string()))?;
    let mut key = Vec::with_capacity(bytes.len() + 10);
    key.push(len);
    key.extend_from_slice(bytes);
    Ok(key)
}

fn turn_key(run_id: &str, turn: u64, kind: u8) -> Result<Vec<u8>> {
    let mut key = run_prefix(run_id)?;
    key.extend_from_slice(&turn.to_be_bytes());
    key.push(kind);
    Ok(key)
}

/// Inclusive bounds covering every key of a run starting at `from_turn`.
fn run_bounds(run_id: &str, from_turn: u64) -> Result<(Vec<u8>, Vec<u8>)> {
    let lower = turn_key(run_id, from_turn, 0)?;
    let mut upper = run_prefix(run_id)?;
    upper.extend_from_slice(&[0xff; 9]);
    Ok((lower, upper))
}

/// Remove every key in `lo..=hi`, returning how many were removed.
fn remove_range(
    table: &mut redb::Table<'_, &'static [u8], &'static [u8]>,
    lo: &[u8],
    hi: &[u8],
) -> Result<usize> {
    let keys: Vec<Vec<u8>> = table
        .range(lo..=hi)
        .map_err(db_err)?
        .map(|item| item.map(|(k, _)| k.value().to_vec()).map_err(db_err))
        .collect::<Result<_>>()?;
    for key in &keys {
        table.remove(key.as_slice()).map_err(db_err)?;
    }
    Ok(keys.len())
}

/// Decode `(turn, kind)` from the tail of a turn or blob key.
fn split_turn_key(key: &[u8]) -> Option<(u64, u8)> {
    if key.len() < 9 {
        return None;
    }
    let tail = &key[key.len() - 9..];
    let turn = u64::from_be_bytes(tail[..8].try_into().ok()?);
    Some((turn, tail[8]))
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the database. Cheap to clone; clones share the same file.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open or create the database at `path`, creating all tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        for table in [TURNS, RUNS, NOTES, BLOBS, META] {
            wt.open_table(table).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Store;
    use tempfile::TempDir;

    pub fn open_tmp() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        (dir, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_keys_sort_by_turn_then_kind() {
        let a = turn_key("run1", 2, 1).unwrap();
        let b = turn_key("run1", 10, 0).unwrap();
        let c = turn_key("run1", 10, 1).unwrap();
        assert!(a < b && b < c);
        assert_eq!(split_turn_key(&c), Some((10, 1)));
    }

    #[test]
    fn run_ranges_do_not_overlap() {
        // "ab" is a prefix of "abc" but the length byte keeps them apart.
        let (lo, hi) = run_bounds("ab", 0).unwrap();
        let other = turn_key("abc", 0, 0).unwrap();
        assert!(!(lo.as_slice() <= other.as_slice() && other.as_slice() <= hi.as_slice()));
    }

    #[test]
    fn overlong_run_id_is_rejected() {
        let long = "r".repeat(256);
        assert!(matches!(run_prefix(&long), Err(CoreError::InvalidRunId(_))));
        assert!(run_prefix(&"r".repeat(255)).is_ok());

        let (_dir, store) = testutil::open_tmp();
        let err = store
            .save_state(&long, 0, serde_json::json!({}), "SHOP", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRunId(_)));
        assert!(store.take_pending(&format!("{long}x")).is_err());
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ante.redb");
        Store::open(&path).unwrap();
        assert!(path.exists());
    }
}
