use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::equation::Evaluator;
use crate::error::{DashboardError, DashboardResult};
use crate::metrics::Aggregates;
use crate::models::{Dataset, DatasetSnapshot};

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(30);

/// Tables whose changes are announced on the change bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Donations,
    Requests,
    Scholarships,
    Events,
    Widgets,
}

impl Table {
    pub fn parse(name: &str) -> Option<Table> {
        match name {
            "widgets" => Some(Table::Widgets),
            other => Dataset::parse(other).map(Table::from),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Table::Donations => "donations",
            Table::Requests => "requests",
            Table::Scholarships => "scholarships",
            Table::Events => "events",
            Table::Widgets => "widgets",
        }
    }
}

impl From<Dataset> for Table {
    fn from(dataset: Dataset) -> Self {
        match dataset {
            Dataset::Donations => Table::Donations,
            Dataset::Requests => Table::Requests,
            Dataset::Scholarships => Table::Scholarships,
            Dataset::Events => Table::Events,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
}

pub fn change_bus(capacity: usize) -> (mpsc::Sender<ChangeEvent>, mpsc::Receiver<ChangeEvent>) {
    mpsc::channel(capacity)
}

/// Somewhere a full copy of the four collections can be fetched from.
pub trait SnapshotSource {
    fn fetch(&self) -> impl Future<Output = DashboardResult<DatasetSnapshot>> + Send;
}

pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSource for FileSnapshotSource {
    async fn fetch(&self) -> DashboardResult<DatasetSnapshot> {
        load_snapshot(&self.path).await
    }
}

pub async fn load_snapshot(path: &Path) -> DashboardResult<DatasetSnapshot> {
    read_json(path).await
}

pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> DashboardResult<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DashboardError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| DashboardError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// A snapshot together with its unfiltered aggregates.
#[derive(Debug, Clone)]
pub struct PreparedSnapshot {
    pub snapshot: DatasetSnapshot,
    pub aggregates: Aggregates,
    pub fetched_at: DateTime<Utc>,
}

impl PreparedSnapshot {
    pub fn new(snapshot: DatasetSnapshot) -> Self {
        let aggregates = Aggregates::compute(&snapshot);
        Self {
            snapshot,
            aggregates,
            fetched_at: Utc::now(),
        }
    }

    pub fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.snapshot, &self.aggregates)
    }
}

pub type SnapshotPublisher = watch::Sender<Option<Arc<PreparedSnapshot>>>;
pub type SnapshotFeed = watch::Receiver<Option<Arc<PreparedSnapshot>>>;

pub fn snapshot_channel() -> (SnapshotPublisher, SnapshotFeed) {
    watch::channel(None)
}

/// Refetches the snapshot every `period` and whenever a change arrives on the
/// bus, publishing each result. Changes queued behind the first are folded
/// into the same refetch. A failed fetch keeps the previous snapshot.
/// Returns once the change bus is closed or nobody is subscribed anymore.
pub async fn run_refresh_loop<S: SnapshotSource>(
    source: S,
    period: Duration,
    mut changes: mpsc::Receiver<ChangeEvent>,
    publisher: SnapshotPublisher,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("periodic snapshot refresh");
            }
            change = changes.recv() => match change {
                Some(event) => {
                    // A burst of changes costs one refetch.
                    let mut coalesced = 0usize;
                    while changes.try_recv().is_ok() {
                        coalesced += 1;
                    }
                    debug!(table = %event.table, coalesced, "change event received");
                    ticker.reset();
                }
                None => break,
            },
        }

        match source.fetch().await {
            Ok(snapshot) => {
                let prepared = PreparedSnapshot::new(snapshot);
                info!(
                    donations = prepared.snapshot.donations.len(),
                    requests = prepared.snapshot.requests.len(),
                    scholarships = prepared.snapshot.scholarships.len(),
                    events = prepared.snapshot.events.len(),
                    "snapshot refreshed"
                );
                if publisher.send(Some(Arc::new(prepared))).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, "snapshot refresh failed; keeping previous snapshot");
            }
        }
    }
}
