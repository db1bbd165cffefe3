use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::{db_err, remove_range, run_bounds, split_turn_key, turn_key, Store, BLOBS};
use crate::error::Result;

/// Binary captures taken alongside a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
    /// The game's save file, used to resume a run from this turn.
    Save,
    Screenshot,
}

impl BlobKind {
    fn code(self) -> u8 {
        match self {
            BlobKind::Save => 0,
            BlobKind::Screenshot => 1,
        }
    }

    fn from_code(code: u8) -> Option<BlobKind> {
        match code {
            0 => Some(BlobKind::Save),
            1 => Some(BlobKind::Screenshot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub turn: u64,
    pub kind: BlobKind,
    pub size: usize,
}

impl Store {
    /// Store a blob for (run, turn, kind), replacing any previous one.
    pub fn save_blob(&self, run_id: &str, turn: u64, kind: BlobKind, data: &[u8]) -> Result<()> {
        let key = turn_key(run_id, turn, kind.code())?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(BLOBS).map_err(db_err)?;
            table.insert(key.as_slice(), data).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    pub fn blob(&self, run_id: &str, turn: u64, kind: BlobKind) -> Result<Option<Vec<u8>>> {
        let key = turn_key(run_id, turn, kind.code())?;
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(BLOBS).map_err(db_err)?;
        let value = table.get(key.as_slice()).map_err(db_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    /// Metadata for every blob of a run, ordered by turn.
    pub fn list_blobs(&self, run_id: &str) -> Result<Vec<BlobInfo>> {
        let (lo, hi) = run_bounds(run_id, 0)?;
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(BLOBS).map_err(db_err)?;
        let mut result = Vec::new();
        for item in table.range(lo.as_slice()..=hi.as_slice()).map_err(db_err)? {
            let (k, v) = item.map_err(db_err)?;
            let Some((turn, code)) = split_turn_key(k.value()) else {
                continue;
            };
            let Some(kind) = BlobKind::from_code(code) else {
                continue;
            };
            result.push(BlobInfo {
                turn,
                kind,
                size: v.value().len(),
            });
        }
        Ok(result)
    }

    /// Remove every blob of a run with turn >= `from_turn`.
    pub fn delete_blobs_from(&self, run_id: &str, from_turn: u64) -> Result<usize> {
        let (lo, hi) = run_bounds(run_id, from_turn)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = wt.open_table(BLOBS).map_err(db_err)?;
            remove_range(&mut table, &lo, &hi)?
        };
        wt.commit().map_err(db_err)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::open_tmp;

    #[test]
    fn save_get_list_delete() {
        let (_dir, store) = open_tmp();
        store.save_blob("r1", 0, BlobKind::Save, b"s0").unwrap();
        store.save_blob("r1", 0, BlobKind::Screenshot, b"png0").unwrap();
        store.save_blob("r1", 3, BlobKind::Save, b"s3").unwrap();
        store.save_blob("r2", 3, BlobKind::Save, b"other").unwrap();

        assert_eq!(
            store.blob("r1", 3, BlobKind::Save).unwrap().as_deref(),
            Some(&b"s3"[..])
        );
        assert!(store.blob("r1", 3, BlobKind::Screenshot).unwrap().is_none());

        let listed = store.list_blobs("r1").unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[1], BlobInfo { turn: 0, kind: BlobKind::Screenshot, size: 4 });

        assert_eq!(store.delete_blobs_from("r1", 1).unwrap(), 1);
        assert_eq!(store.list_blobs("r1").unwrap().len(), 2);
        assert_eq!(store.list_blobs("r2").unwrap().len(), 1);
    }

    #[test]
    fn save_replaces_existing_blob() {
        let (_dir, store) = open_tmp();
        store.save_blob("r1", 0, BlobKind::Save, b"old").unwrap();
        store.save_blob("r1", 0, BlobKind::Save, b"new").unwrap();
        assert_eq!(
            store.blob("r1", 0, BlobKind::Save).unwrap().as_deref(),
            Some(&b"new"[..])
        );
    }
}
