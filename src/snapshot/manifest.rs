use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dataset::{Snapshot, Table};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotManifest {
    pub schema_version: u32,
    pub snapshot_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    /// Keyed by dataset slug.
    pub tables: BTreeMap<String, TableEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableEntry {
    pub rows: usize,
    pub digest: String,
}

#[derive(Debug, Clone)]
pub struct EncodedTable {
    pub body: String,
    pub entry: TableEntry,
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn encode_table(table: &Table) -> Result<EncodedTable> {
    let body = serde_json::to_string_pretty(table).context("failed encoding table")?;
    let entry = TableEntry {
        rows: table.len(),
        digest: sha256_hex(&body),
    };
    Ok(EncodedTable { body, entry })
}

/// Decodes a stored table, rejecting it when `expected_digest` does not match.
pub fn decode_table(body: &str, expected_digest: Option<&str>) -> Result<Table> {
    if let Some(expected) = expected_digest {
        let actual = sha256_hex(body);
        if actual != expected {
            anyhow::bail!("digest mismatch: expected {expected}, found {actual}");
        }
    }
    serde_json::from_str(body).context("failed decoding table")
}

pub fn encode_snapshot(snapshot: &Snapshot) -> Result<(SnapshotManifest, Vec<(String, EncodedTable)>)> {
    let mut tables = BTreeMap::new();
    let mut encoded = Vec::new();
    for (dataset, table) in snapshot.tables() {
        let enc = encode_table(table)
            .with_context(|| format!("failed encoding {} table", dataset.as_slug()))?;
        tables.insert(dataset.as_slug().to_string(), enc.entry.clone());
        encoded.push((dataset.as_slug().to_string(), enc));
    }
    let manifest = SnapshotManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        snapshot_date: snapshot.date,
        created_at: Utc::now(),
        tables,
    };
    Ok((manifest, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, Record};

    #[test]
    fn empty_table_encodes_to_empty_array() {
        let enc = encode_table(&Table::default()).expect("encode");
        assert_eq!(enc.body, "[]");
        assert_eq!(enc.entry.rows, 0);
        let back = decode_table(&enc.body, Some(&enc.entry.digest)).expect("decode");
        assert!(back.is_empty());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let ccn = "012345".parse().expect("valid ccn");
        let table = Table::new(vec![Record::new(ccn).with_number("overall_rating", 4.0)]);
        let enc = encode_table(&table).expect("encode");
        let tampered = enc.body.replace("4.0", "5.0");
        assert!(decode_table(&tampered, Some(&enc.entry.digest)).is_err());
        assert!(decode_table(&tampered, None).is_ok());
    }

    #[test]
    fn manifest_lists_every_dataset() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
        let (manifest, encoded) = encode_snapshot(&Snapshot::new(date)).expect("encode");
        assert_eq!(manifest.tables.len(), Dataset::ALL.len());
        assert_eq!(encoded[0].0, "penalties");
    }
}
