use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use crate::dataset::Snapshot;
use crate::snapshot::SnapshotStore;

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<BTreeMap<NaiveDate, Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<NaiveDate, Snapshot>>> {
        self.snapshots
            .lock()
            .map_err(|_| anyhow!("snapshot store lock poisoned"))
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        self.lock()?.insert(snapshot.date, snapshot.clone());
        Ok(())
    }

    fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        Ok(self.lock()?.keys().copied().collect())
    }

    fn load(&self, date: NaiveDate) -> Result<Snapshot> {
        self.lock()?
            .get(&date)
            .cloned()
            .ok_or_else(|| anyhow!("no snapshot stored for {date}"))
    }

    fn latest_before(&self, date: NaiveDate) -> Result<Option<NaiveDate>> {
        Ok(self.lock()?.range(..date).next_back().map(|(d, _)| *d))
    }
}
