//! Date-keyed snapshot persistence.

pub mod fs;
pub mod manifest;
pub mod memory;
pub mod migrations;
pub mod store;

use anyhow::Result;
use chrono::NaiveDate;

use crate::config::{Config, StorageBackend};
use crate::dataset::Snapshot;

pub use fs::FsSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use store::SqliteSnapshotStore;

/// Writing the same date twice replaces the earlier snapshot. Unreadable
/// tables load as empty.
pub trait SnapshotStore {
    fn write(&self, snapshot: &Snapshot) -> Result<()>;

    fn list_dates(&self) -> Result<Vec<NaiveDate>>;

    fn load(&self, date: NaiveDate) -> Result<Snapshot>;

    /// Most recent stored date strictly before `date`.
    fn latest_before(&self, date: NaiveDate) -> Result<Option<NaiveDate>> {
        Ok(self
            .list_dates()?
            .into_iter()
            .filter(|stored| *stored < date)
            .max())
    }

    fn load_latest_before(&self, date: NaiveDate) -> Result<Option<Snapshot>> {
        match self.latest_before(date)? {
            Some(previous) => Ok(Some(self.load(previous)?)),
            None => Ok(None),
        }
    }
}

pub fn open_store(config: &Config) -> Result<Box<dyn SnapshotStore>> {
    Ok(match config.storage.backend {
        StorageBackend::Fs => Box::new(FsSnapshotStore::open(&config.resolved_snapshot_dir())?),
        StorageBackend::Sqlite => Box::new(SqliteSnapshotStore::open(&config.resolved_db_path())?),
    })
}
