use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use tracing::{info, warn};

use crate::dataset::{Ccn, Dataset, Snapshot};
use crate::detect::{detect_changes, DiffContext};
use crate::report::{write_report, FacilityHeader, FacilityReport};
use crate::snapshot::SnapshotStore;
use crate::source::DatasetSource;

#[derive(Debug, Clone)]
pub struct WatchRequest {
    pub ccns: Vec<Ccn>,
    pub days: u32,
    pub today: NaiveDate,
    pub out_dir: PathBuf,
    /// When false the pull is diffed but not stored.
    pub persist: bool,
}

#[derive(Debug, Clone)]
pub struct WatchOutcome {
    pub snapshot_date: NaiveDate,
    pub previous_date: Option<NaiveDate>,
    pub reports: Vec<FacilityReport>,
    pub report_paths: Vec<PathBuf>,
}

impl WatchOutcome {
    pub fn is_first_run(&self) -> bool {
        self.previous_date.is_none()
    }

    pub fn event_count(&self) -> usize {
        self.reports.iter().map(|r| r.events.len()).sum()
    }
}

pub fn dedup_ccns(ccns: &[Ccn]) -> Vec<Ccn> {
    let mut seen = BTreeSet::new();
    ccns.iter()
        .filter(|ccn| seen.insert((*ccn).clone()))
        .cloned()
        .collect()
}

pub fn lookback_start(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
}

pub async fn pull_snapshot(
    source: &dyn DatasetSource,
    ccns: &[Ccn],
    since: NaiveDate,
    date: NaiveDate,
) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new(date);
    for dataset in Dataset::ALL {
        let bound = dataset.uses_lookback().then_some(since);
        let table = source
            .fetch(dataset, ccns, bound)
            .await
            .with_context(|| format!("failed pulling {dataset}"))?;
        snapshot.insert(dataset, table);
    }
    Ok(snapshot)
}

pub async fn run_watch(
    source: &dyn DatasetSource,
    store: &dyn SnapshotStore,
    request: &WatchRequest,
) -> Result<WatchOutcome> {
    let ccns = dedup_ccns(&request.ccns);
    if ccns.is_empty() {
        anyhow::bail!("no facilities to watch");
    }
    let since = lookback_start(request.today, request.days);
    info!(
        "pulling {} datasets for {} facilities since {since}",
        Dataset::ALL.len(),
        ccns.len()
    );

    let current = pull_snapshot(source, &ccns, since, request.today).await?;
    if request.persist {
        store
            .write(&current)
            .with_context(|| format!("failed persisting snapshot {}", request.today))?;
    } else {
        info!("not persisting snapshot {}", request.today);
    }

    let previous_date = store.latest_before(request.today)?;
    let previous = match previous_date {
        Some(date) => Some(
            store
                .load(date)
                .with_context(|| format!("failed loading snapshot {date}"))?,
        ),
        None => {
            warn!("no earlier snapshot; this run only establishes a baseline");
            None
        }
    };

    let ctx = DiffContext::new(request.today);
    let mut reports = Vec::with_capacity(ccns.len());
    let mut report_paths = Vec::with_capacity(ccns.len());
    for ccn in &ccns {
        let events = detect_changes(previous.as_ref(), &current, ccn, &ctx);
        let header = FacilityHeader::from_provider_info(ccn, current.table(Dataset::ProviderInfo));
        let report = FacilityReport { header, events };
        report_paths.push(write_report(&request.out_dir, &report)?);
        reports.push(report);
    }
    info!(
        "compared against {}: {} events across {} facilities",
        previous_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "nothing".to_string()),
        reports.iter().map(|r| r.events.len()).sum::<usize>(),
        reports.len()
    );

    Ok(WatchOutcome {
        snapshot_date: request.today,
        previous_date,
        reports,
        report_paths,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::dataset::{Record, Table};
    use crate::detect::{EventKind, Severity};
    use crate::snapshot::MemorySnapshotStore;

    /// Serves fixed tables and records the look-back bound of every call.
    #[derive(Default)]
    struct FakeSource {
        tables: BTreeMap<Dataset, Table>,
        calls: Mutex<Vec<(Dataset, Option<NaiveDate>)>>,
    }

    impl FakeSource {
        fn with(mut self, dataset: Dataset, table: Table) -> Self {
            self.tables.insert(dataset, table);
            self
        }
    }

    #[async_trait]
    impl DatasetSource for FakeSource {
        async fn fetch(
            &self,
            dataset: Dataset,
            ccns: &[Ccn],
            since: Option<NaiveDate>,
        ) -> Result<Table> {
            self.calls.lock().expect("calls lock").push((dataset, since));
            let rows = self
                .tables
                .get(&dataset)
                .map(|t| t.rows.clone())
                .unwrap_or_default()
                .into_iter()
                .filter(|row| ccns.contains(&row.ccn))
                .collect();
            Ok(Table::new(rows))
        }
    }

    fn ccn() -> Ccn {
        "012345".parse().expect("valid ccn")
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).expect("date")
    }

    fn zero_penalty() -> Table {
        Table::new(vec![Record::new(ccn())
            .with_date("imposed_date", date(5, 2))
            .with_number("civil_money_penalty_amount", 0.0)])
    }

    fn provider(rating: f64) -> Table {
        Table::new(vec![Record::new(ccn())
            .with_text("provider_name", "Maple Grove")
            .with_text("city", "Springfield")
            .with_text("state", "IL")
            .with_number("overall_rating", rating)])
    }

    fn request(today: NaiveDate, out_dir: PathBuf) -> WatchRequest {
        WatchRequest {
            ccns: vec![ccn()],
            days: 60,
            today,
            out_dir,
            persist: true,
        }
    }

    #[test]
    fn first_run_writes_empty_reports() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = MemorySnapshotStore::new();
        let source = FakeSource::default().with(Dataset::Penalties, zero_penalty());

        let outcome = tokio_test::block_on(run_watch(
            &source,
            &store,
            &request(date(6, 1), tmp.path().to_path_buf()),
        ))
        .expect("run");

        assert!(outcome.is_first_run());
        assert_eq!(outcome.reports.len(), 1);
        assert!(outcome.reports[0].events.is_empty());
        assert!(tmp.path().join("012345.json").exists());
        assert_eq!(store.list_dates().expect("dates"), vec![date(6, 1)]);
    }

    #[test]
    fn overall_star_drop_is_single_warn_event() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = MemorySnapshotStore::new();

        let first = FakeSource::default()
            .with(Dataset::Penalties, zero_penalty())
            .with(Dataset::ProviderInfo, provider(4.0));
        tokio_test::block_on(run_watch(
            &first,
            &store,
            &request(date(5, 1), tmp.path().to_path_buf()),
        ))
        .expect("first run");

        let second = FakeSource::default()
            .with(Dataset::Penalties, zero_penalty())
            .with(Dataset::ProviderInfo, provider(3.0));
        let outcome = tokio_test::block_on(run_watch(
            &second,
            &store,
            &request(date(6, 1), tmp.path().to_path_buf()),
        ))
        .expect("second run");

        assert_eq!(outcome.previous_date, Some(date(5, 1)));
        let report = &outcome.reports[0];
        assert_eq!(report.header.provider_name.as_deref(), Some("Maple Grove"));
        assert_eq!(report.events.len(), 1);
        let event = &report.events[0];
        assert_eq!(event.kind, EventKind::Star);
        assert_eq!(event.severity, Severity::Warn);
        assert!(event.message.contains('4'));
        assert!(event.message.contains('3'));
    }

    #[test]
    fn lookback_bound_applies_to_dated_datasets_only() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = MemorySnapshotStore::new();
        let source = FakeSource::default();
        tokio_test::block_on(run_watch(
            &source,
            &store,
            &request(date(6, 1), tmp.path().to_path_buf()),
        ))
        .expect("run");

        let calls = source.calls.lock().expect("calls lock").clone();
        assert_eq!(calls.len(), Dataset::ALL.len());
        for (dataset, since) in calls {
            if dataset.uses_lookback() {
                assert_eq!(since, Some(date(4, 2)));
            } else {
                assert_eq!(since, None);
            }
        }
    }

    #[test]
    fn same_day_rerun_compares_against_earlier_day() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = MemorySnapshotStore::new();
        let source = FakeSource::default().with(Dataset::ProviderInfo, provider(4.0));
        for _ in 0..2 {
            let outcome = tokio_test::block_on(run_watch(
                &source,
                &store,
                &request(date(6, 1), tmp.path().to_path_buf()),
            ))
            .expect("run");
            assert!(outcome.is_first_run());
        }
    }

    #[test]
    fn unpersisted_run_diffs_without_storing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = MemorySnapshotStore::new();
        let first = FakeSource::default().with(Dataset::ProviderInfo, provider(4.0));
        tokio_test::block_on(run_watch(
            &first,
            &store,
            &request(date(5, 1), tmp.path().to_path_buf()),
        ))
        .expect("baseline");

        let second = FakeSource::default().with(Dataset::ProviderInfo, provider(3.0));
        let mut req = request(date(6, 1), tmp.path().to_path_buf());
        req.persist = false;
        let outcome = tokio_test::block_on(run_watch(&second, &store, &req)).expect("dry run");

        assert_eq!(outcome.previous_date, Some(date(5, 1)));
        assert_eq!(outcome.reports[0].events.len(), 1);
        assert_eq!(store.list_dates().expect("dates"), vec![date(5, 1)]);
    }

    #[test]
    fn duplicate_ccns_are_reported_once() {
        let other: Ccn = "455682".parse().expect("valid ccn");
        let deduped = dedup_ccns(&[ccn(), other.clone(), ccn()]);
        assert_eq!(deduped, vec![ccn(), other]);
    }

    #[test]
    fn empty_watch_list_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut req = request(date(6, 1), tmp.path().to_path_buf());
        req.ccns.clear();
        let result = tokio_test::block_on(run_watch(
            &FakeSource::default(),
            &MemorySnapshotStore::new(),
            &req,
        ));
        assert!(result.is_err());
    }
}
