//! Versioned object notes. Writes append a new version; reads return the
//! highest version.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::{db_err, Store, NOTES};
use crate::error::Result;
use crate::objects::ObjectKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub name: String,
    pub kind: ObjectKind,
    pub text: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

fn note_prefix(name: &str, kind: ObjectKind) -> Vec<u8> {
    let bytes = name.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    let mut key = Vec::with_capacity(len + 7);
    key.push(kind.code());
    key.extend_from_slice(&(len as u16).to_be_bytes());
    key.extend_from_slice(&bytes[..len]);
    key
}

fn note_key(name: &str, kind: ObjectKind, version: u32) -> Vec<u8> {
    let mut key = note_prefix(name, kind);
    key.extend_from_slice(&version.to_be_bytes());
    key
}

fn note_bounds(name: &str, kind: ObjectKind) -> (Vec<u8>, Vec<u8>) {
    (note_key(name, kind, 0), note_key(name, kind, u32::MAX))
}

fn decode(bytes: &[u8]) -> Result<NoteRecord> {
    serde_json::from_slice(bytes).map_err(db_err)
}

impl Store {
    /// The latest version of a note, if one was ever written.
    pub fn read_note(&self, name: &str, kind: ObjectKind) -> Result<Option<NoteRecord>> {
        let (lo, hi) = note_bounds(name, kind);
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(NOTES).map_err(db_err)?;
        let last = table
            .range(lo.as_slice()..=hi.as_slice())
            .map_err(db_err)?
            .next_back();
        match last {
            Some(item) => {
                let (_, v) = item.map_err(db_err)?;
                Ok(Some(decode(v.value())?))
            }
            None => Ok(None),
        }
    }

    /// Append a new version and return its number (1 for the first write).
    pub fn write_note(&self, name: &str, kind: ObjectKind, text: &str) -> Result<u32> {
        let (lo, hi) = note_bounds(name, kind);
        let wt = self.db.begin_write().map_err(db_err)?;
        let version = {
            let mut table = wt.open_table(NOTES).map_err(db_err)?;
            let latest = table
                .range(lo.as_slice()..=hi.as_slice())
                .map_err(db_err)?
                .next_back()
                .map(|item| item.map_err(db_err).and_then(|(_, v)| decode(v.value())))
                .transpose()?;
            let version = latest.map(|n| n.version + 1).unwrap_or(1);
            let record = NoteRecord {
                name: name.to_string(),
                kind,
                text: text.to_string(),
                version,
                created_at: Utc::now(),
            };
            let value = serde_json::to_vec(&record)?;
            table
                .insert(note_key(name, kind, version).as_slice(), value.as_slice())
                .map_err(db_err)?;
            version
        };
        wt.commit().map_err(db_err)?;
        Ok(version)
    }

    /// Every version of a note, newest first.
    pub fn note_history(&self, name: &str, kind: ObjectKind) -> Result<Vec<NoteRecord>> {
        let (lo, hi) = note_bounds(name, kind);
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(NOTES).map_err(db_err)?;
        let mut result = Vec::new();
        for item in table
            .range(lo.as_slice()..=hi.as_slice())
            .map_err(db_err)?
            .rev()
        {
            let (_, v) = item.map_err(db_err)?;
            result.push(decode(v.value())?);
        }
        Ok(result)
    }

    pub fn note_version(
        &self,
        name: &str,
        kind: ObjectKind,
        version: u32,
    ) -> Result<Option<NoteRecord>> {
        let key = note_key(name, kind, version);
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(NOTES).map_err(db_err)?;
        let value = table.get(key.as_slice()).map_err(db_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    /// The latest version of every note, ordered by kind and then name.
    pub fn latest_notes(&self) -> Result<Vec<NoteRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(NOTES).map_err(db_err)?;
        let mut result: Vec<NoteRecord> = Vec::new();
        // Versions of one note are adjacent and ascending, so the last one seen wins.
        for item in table.iter().map_err(db_err)? {
            let (_, v) = item.map_err(db_err)?;
            let note = decode(v.value())?;
            match result.last_mut() {
                Some(prev) if prev.kind == note.kind && prev.name == note.name => *prev = note,
                _ => result.push(note),
            }
        }
        result.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        Ok(result)
    }
}
