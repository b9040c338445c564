use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::dataset::{Dataset, Snapshot};
use crate::snapshot::manifest::{decode_table, encode_snapshot};
use crate::snapshot::migrations::BASE_MIGRATION;
use crate::snapshot::SnapshotStore;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteSnapshotStore {
    conn: Connection,
}

impl SqliteSnapshotStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed opening snapshot db: {}", path.display()))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(BASE_MIGRATION)?;
        Ok(())
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl SnapshotStore for SqliteSnapshotStore {
    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let (manifest, encoded) = encode_snapshot(snapshot)?;
        let key = date_key(snapshot.date);
        let written_at = manifest.created_at.to_rfc3339();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM snapshot_tables WHERE snapshot_date = ?1",
            params![key],
        )?;
        for (slug, table) in &encoded {
            tx.execute(
                r#"
INSERT OR REPLACE INTO snapshot_tables(
    snapshot_date, dataset, row_count, digest, table_json, written_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
                params![
                    key,
                    slug,
                    table.entry.rows as i64,
                    table.entry.digest,
                    table.body,
                    written_at
                ],
            )?;
        }
        tx.commit()?;
        info!(
            "wrote snapshot {} ({} rows) to sqlite",
            snapshot.date,
            snapshot.row_count()
        );
        Ok(())
    }

    fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT snapshot_date FROM snapshot_tables ORDER BY snapshot_date ASC",
        )?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut dates = Vec::with_capacity(raw.len());
        for value in raw {
            match NaiveDate::parse_from_str(&value, DATE_FORMAT) {
                Ok(date) => dates.push(date),
                Err(err) => warn!("skipping malformed snapshot date {value:?}: {err}"),
            }
        }
        Ok(dates)
    }

    fn latest_before(&self, date: NaiveDate) -> Result<Option<NaiveDate>> {
        let latest: Option<String> = self.conn.query_row(
            "SELECT MAX(snapshot_date) FROM snapshot_tables WHERE snapshot_date < ?1",
            params![date_key(date)],
            |row| row.get(0),
        )?;
        latest
            .map(|value| {
                NaiveDate::parse_from_str(&value, DATE_FORMAT)
                    .with_context(|| format!("malformed snapshot date in db: {value}"))
            })
            .transpose()
    }

    fn load(&self, date: NaiveDate) -> Result<Snapshot> {
        let mut stmt = self.conn.prepare(
            "SELECT dataset, digest, table_json FROM snapshot_tables WHERE snapshot_date = ?1",
        )?;
        let rows = stmt
            .query_map(params![date_key(date)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            anyhow::bail!("no snapshot stored for {date}");
        }

        let mut snapshot = Snapshot::new(date);
        for (slug, digest, body) in rows {
            let Ok(dataset) = slug.parse::<Dataset>() else {
                warn!("skipping unknown dataset {slug:?} in snapshot {date}");
                continue;
            };
            match decode_table(&body, Some(&digest)) {
                Ok(table) => snapshot.insert(dataset, table),
                Err(err) => {
                    warn!("treating {slug} table of {date} as empty: {err:#}");
                }
            }
        }
        Ok(snapshot)
    }
}
