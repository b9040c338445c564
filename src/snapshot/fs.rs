use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::dataset::{Dataset, Snapshot, Table};
use crate::snapshot::manifest::{decode_table, encode_snapshot, SnapshotManifest, MANIFEST_FILE};
use crate::snapshot::SnapshotStore;

const DATE_DIR_FORMAT: &str = "%Y-%m-%d";
const STAGING_SUFFIX: &str = "partial";
const RETIRED_SUFFIX: &str = "old";

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
    }
}

#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("failed creating snapshot root: {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format(DATE_DIR_FORMAT).to_string())
    }

    fn sibling(&self, date: NaiveDate, suffix: &str) -> PathBuf {
        self.root
            .join(format!(".{}.{suffix}", date.format(DATE_DIR_FORMAT)))
    }

    fn read_manifest(dir: &Path) -> Option<SnapshotManifest> {
        let path = dir.join(MANIFEST_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!("no readable manifest at {}: {err}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                warn!("ignoring corrupt manifest {}: {err}", path.display());
                None
            }
        }
    }

    fn load_table(path: &Path, expected_digest: Option<&str>) -> Table {
        let loaded = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))
            .and_then(|body| decode_table(&body, expected_digest));
        match loaded {
            Ok(table) => table,
            Err(err) => {
                warn!("treating snapshot table {} as empty: {err:#}", path.display());
                Table::default()
            }
        }
    }
}

impl SnapshotStore for FsSnapshotStore {
    // Staged in a hidden sibling and swapped in by rename.
    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = self.dir_for(snapshot.date);
        let staging = self.sibling(snapshot.date, STAGING_SUFFIX);
        remove_dir_if_present(&staging)?;
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed creating staging dir: {}", staging.display()))?;

        let (manifest, encoded) = encode_snapshot(snapshot)?;
        for (slug, table) in &encoded {
            let path = staging.join(format!("{slug}.json"));
            fs::write(&path, &table.body)
                .with_context(|| format!("failed writing {}", path.display()))?;
        }
        let manifest_path = staging.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("failed writing {}", manifest_path.display()))?;

        if dir.exists() {
            let retired = self.sibling(snapshot.date, RETIRED_SUFFIX);
            remove_dir_if_present(&retired)?;
            fs::rename(&dir, &retired)
                .with_context(|| format!("failed retiring {}", dir.display()))?;
            fs::rename(&staging, &dir)
                .with_context(|| format!("failed publishing {}", dir.display()))?;
            if let Err(err) = fs::remove_dir_all(&retired) {
                warn!("failed removing {}: {err}", retired.display());
            }
        } else {
            fs::rename(&staging, &dir)
                .with_context(|| format!("failed publishing {}", dir.display()))?;
        }
        info!(
            "wrote snapshot {} ({} rows) to {}",
            snapshot.date,
            snapshot.row_count(),
            dir.display()
        );
        Ok(())
    }

    fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("failed listing {}", self.root.display()))?;
        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            match NaiveDate::parse_from_str(&name, DATE_DIR_FORMAT) {
                Ok(date) => dates.push(date),
                Err(_) => debug!("skipping non-snapshot directory {name}"),
            }
        }
        dates.sort();
        Ok(dates)
    }

    fn load(&self, date: NaiveDate) -> Result<Snapshot> {
        let dir = self.dir_for(date);
        let entries = fs::read_dir(&dir)
            .with_context(|| format!("failed reading snapshot dir: {}", dir.display()))?;
        let manifest = Self::read_manifest(&dir);

        let mut snapshot = Snapshot::new(date);
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE) {
                continue;
            }
            let dataset = match stem.parse::<Dataset>() {
                Ok(dataset) if dataset.as_slug() == stem => dataset,
                _ => {
                    debug!("skipping unknown snapshot table {}", path.display());
                    continue;
                }
            };
            let expected = manifest
                .as_ref()
                .and_then(|m| m.tables.get(stem))
                .map(|entry| entry.digest.as_str());
            snapshot.insert(dataset, Self::load_table(&path, expected));
        }
        Ok(snapshot)
    }
}
