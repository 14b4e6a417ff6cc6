// crates/workspace-apps-server/src/stats.rs
// ============================================================================
// Module: App Stats Collector
// Description: Aggregate per-session app usage and report it periodically.
// Purpose: Bound report volume by rolling short sessions into windows.
// Dependencies: tokio, thiserror, tracing, workspace-apps-core
// ============================================================================

//! ## Overview
//! [`StatsCollector::collect`] records session reports without I/O. A worker
//! task flushes on a timer, on [`StatsCollector::flush`], and once more on
//! [`StatsCollector::close`].
//!
//! Reports are grouped by `(session start truncated to the rollup window,
//! user, workspace, agent, access method, slug or port)`. On each flush a
//! group's ended sessions no longer than the window are merged into one
//! aggregate covering the window; open sessions still inside the window
//! wait; anything longer is reported on its own (open sessions with a
//! synthetic end of "now", and kept for the next flush). An aggregate is
//! emitted only when it changed, and a group holding only its aggregate is
//! dropped one window after the aggregate ends.
//!
//! Reports live in a single arena; the session index and the groups hold
//! handles into it. A failed report becomes the backlog, which is retried
//! before anything new and replaced, never appended to.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::AgentId;
use workspace_apps_core::Clock;
use workspace_apps_core::ReportError;
use workspace_apps_core::SessionId;
use workspace_apps_core::StatsReport;
use workspace_apps_core::StatsReporter;
use workspace_apps_core::UserId;
use workspace_apps_core::WorkspaceId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default interval between periodic flushes.
pub const DEFAULT_REPORT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
/// Default rollup window.
pub const DEFAULT_ROLLUP_WINDOW: Duration = Duration::minutes(1);
/// Queued flush commands before callers wait.
const COMMAND_CAPACITY: usize = 8;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Collector configuration.
#[derive(Clone)]
pub struct StatsCollectorOptions {
    /// Destination for aggregated reports.
    pub reporter: Arc<dyn StatsReporter>,
    /// Time source for rollups.
    pub clock: Arc<dyn Clock>,
    /// Interval between periodic flushes.
    pub report_interval: std::time::Duration,
    /// Width of a rollup window.
    pub rollup_window: Duration,
}

// ============================================================================
// SECTION: Arena
// ============================================================================

/// Index of a report in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReportHandle(usize);

/// Arena slot contents.
#[derive(Debug, Clone)]
struct Entry {
    /// Session or aggregate report.
    report: StatsReport,
    /// Whether this entry is a window aggregate.
    rolled_up: bool,
}

/// Slot storage with free-list reuse.
#[derive(Debug, Default)]
struct Arena {
    /// Slots; `None` when free.
    slots: Vec<Option<Entry>>,
    /// Free slot indices.
    free: Vec<usize>,
}

impl Arena {
    /// Stores `entry`, reusing a free slot when possible.
    fn insert(&mut self, entry: Entry) -> ReportHandle {
        if let Some(index) = self.free.pop()
            && let Some(slot) = self.slots.get_mut(index)
        {
            *slot = Some(entry);
            return ReportHandle(index);
        }
        self.slots.push(Some(entry));
        ReportHandle(self.slots.len() - 1)
    }

    /// Returns the entry behind `handle`.
    fn get(&self, handle: ReportHandle) -> Option<&Entry> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    /// Returns the entry behind `handle` mutably.
    fn get_mut(&mut self, handle: ReportHandle) -> Option<&mut Entry> {
        self.slots.get_mut(handle.0).and_then(Option::as_mut)
    }

    /// Frees the slot behind `handle`.
    fn remove(&mut self, handle: ReportHandle) -> Option<Entry> {
        let entry = self.slots.get_mut(handle.0)?.take();
        if entry.is_some() {
            self.free.push(handle.0);
        }
        entry
    }

    /// Number of live entries.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

// ============================================================================
// SECTION: Aggregation State
// ============================================================================

/// Rollup group identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    /// Session start truncated to the rollup window.
    window_start: OffsetDateTime,
    /// Workspace owner.
    user_id: UserId,
    /// Workspace.
    workspace_id: WorkspaceId,
    /// Agent.
    agent_id: AgentId,
    /// Access method.
    access_method: AccessMethod,
    /// App slug or port.
    slug_or_port: String,
}

impl GroupKey {
    /// Group of `report` for a given window width.
    fn for_report(report: &StatsReport, window: Duration) -> Self {
        Self {
            window_start: truncate(report.session_started_at, window),
            user_id: report.user_id,
            workspace_id: report.workspace_id,
            agent_id: report.agent_id,
            access_method: report.access_method,
            slug_or_port: report.slug_or_port.clone(),
        }
    }

    /// Empty aggregate spanning this group's window.
    fn aggregate(&self, window: Duration) -> Entry {
        Entry {
            report: StatsReport {
                user_id: self.user_id,
                workspace_id: self.workspace_id,
                agent_id: self.agent_id,
                access_method: self.access_method,
                slug_or_port: self.slug_or_port.clone(),
                session_id: SessionId::from_uuid(uuid::Uuid::nil()),
                session_started_at: self.window_start,
                session_ended_at: Some(self.window_start + window),
                requests: 0,
            },
            rolled_up: true,
        }
    }
}

/// Mutable collector state.
#[derive(Debug, Default)]
struct CollectorState {
    /// Report storage.
    arena: Arena,
    /// Open sessions by session ID.
    by_session: HashMap<SessionId, ReportHandle>,
    /// Groups in window order; an aggregate, when present, comes first.
    grouped: BTreeMap<GroupKey, Vec<ReportHandle>>,
    /// Reports that failed to deliver.
    backlog: Vec<StatsReport>,
}

impl CollectorState {
    /// Records a session report.
    fn collect(&mut self, report: StatsReport, window: Duration) {
        let session_id = report.session_id;
        let ended = report.session_ended_at.is_some();
        if let Some(handle) = self.by_session.get(&session_id).copied() {
            if let Some(entry) = self.arena.get_mut(handle) {
                entry.report = report;
            }
            if ended {
                self.by_session.remove(&session_id);
            }
            return;
        }
        let key = GroupKey::for_report(&report, window);
        let handle = self.arena.insert(Entry {
            report,
            rolled_up: false,
        });
        self.grouped.entry(key).or_default().push(handle);
        if !ended {
            self.by_session.insert(session_id, handle);
        }
    }

    /// Rolls up every group at `now` and returns the reports to deliver.
    fn rollup(&mut self, now: OffsetDateTime, window: Duration) -> Vec<StatsReport> {
        let mut stats = Vec::new();
        let keys: Vec<GroupKey> = self.grouped.keys().cloned().collect();
        for key in keys {
            let Some(group) = self.grouped.remove(&key) else {
                continue;
            };
            if group.is_empty() {
                continue;
            }
            let mut members = group.into_iter().peekable();
            let existing =
                members.next_if(|handle| self.arena.get(*handle).is_some_and(|entry| entry.rolled_up));
            let aggregate = match existing {
                Some(handle) => handle,
                None => self.arena.insert(key.aggregate(window)),
            };

            let mut changed = false;
            let mut retained = vec![aggregate];
            for handle in members {
                let Some(entry) = self.arena.get(handle) else {
                    continue;
                };
                let report = &entry.report;
                match report.session_ended_at {
                    Some(ended_at) if ended_at - report.session_started_at <= window => {
                        let session_id = report.session_id;
                        let requests = report.requests;
                        self.arena.remove(handle);
                        if let Some(rolled) = self.arena.get_mut(aggregate) {
                            if rolled.report.session_id.as_uuid().is_nil() {
                                rolled.report.session_id = session_id;
                            }
                            rolled.report.requests = rolled.report.requests.saturating_add(requests);
                        }
                        changed = true;
                    }
                    None if now - report.session_started_at <= window => retained.push(handle),
                    Some(_) => {
                        stats.push(report.clone());
                        self.arena.remove(handle);
                    }
                    None => {
                        let mut copy = report.clone();
                        copy.session_ended_at = Some(now);
                        stats.push(copy);
                        retained.push(handle);
                    }
                }
            }

            if changed && let Some(rolled) = self.arena.get(aggregate) {
                stats.push(rolled.report.clone());
            }
            let expired = self
                .arena
                .get(aggregate)
                .and_then(|rolled| rolled.report.session_ended_at)
                .is_some_and(|ended_at| ended_at + window < now);
            if retained.len() == 1 && expired {
                self.arena.remove(aggregate);
            } else {
                self.grouped.insert(key, retained);
            }
        }
        stats
    }
}

/// Truncates `at` down to a multiple of `window` since the Unix epoch.
fn truncate(at: OffsetDateTime, window: Duration) -> OffsetDateTime {
    let window_nanos = window.whole_nanoseconds();
    if window_nanos <= 0 {
        return at;
    }
    let nanos = at.unix_timestamp_nanos();
    OffsetDateTime::from_unix_timestamp_nanos(nanos - nanos.rem_euclid(window_nanos)).unwrap_or(at)
}

// ============================================================================
// SECTION: Shared Flush Logic
// ============================================================================

/// State shared between the collector handle and its worker.
struct Shared {
    /// Aggregation state.
    state: Mutex<CollectorState>,
    /// Report destination.
    reporter: Arc<dyn StatsReporter>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Rollup window.
    rollup_window: Duration,
}

impl Shared {
    /// Locks the aggregation state.
    fn state(&self) -> Result<MutexGuard<'_, CollectorState>, StatsError> {
        self.state.lock().map_err(|_| StatsError::State("stats state mutex poisoned".to_string()))
    }

    /// Delivers the backlog, then the current rollup.
    async fn flush(&self) -> Result<(), StatsError> {
        let backlog = self.state()?.backlog.clone();
        if !backlog.is_empty() {
            self.reporter.report(&backlog).await?;
            self.state()?.backlog.clear();
        }

        let now = self.clock.now();
        let stats = self.state()?.rollup(now, self.rollup_window);
        if stats.is_empty() {
            return Ok(());
        }
        let delivered = self.reporter.report(&stats).await;
        if let Err(err) = delivered {
            self.state()?.backlog = stats;
            return Err(err.into());
        }
        tracing::debug!(count = stats.len(), "reported app stats");
        Ok(())
    }
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Worker commands.
enum Command {
    /// Flush now and reply with the outcome.
    Flush(oneshot::Sender<Result<(), StatsError>>),
}

/// Aggregating app stats collector.
pub struct StatsCollector {
    /// State shared with the worker.
    shared: Arc<Shared>,
    /// Command channel to the worker.
    commands: mpsc::Sender<Command>,
    /// Shutdown signal.
    shutdown: watch::Sender<bool>,
    /// Worker task, taken on close.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StatsCollector {
    /// Starts a collector and its worker. Must be called within a Tokio runtime.
    #[must_use]
    pub fn start(options: StatsCollectorOptions) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(CollectorState::default()),
            reporter: options.reporter,
            clock: options.clock,
            rollup_window: options.rollup_window,
        });
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let interval = options.report_interval.max(std::time::Duration::from_millis(1));
        let worker = tokio::spawn(run_worker(Arc::clone(&shared), interval, receiver, shutdown_rx));
        Self {
            shared,
            commands,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Records a session report. Never blocks on I/O.
    pub fn collect(&self, report: StatsReport) {
        match self.shared.state() {
            Ok(mut state) => state.collect(report, self.shared.rollup_window),
            Err(err) => tracing::error!(error = %err, "dropping app stats report"),
        }
    }

    /// Flushes immediately and waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError`] when reporting fails or the collector is closed.
    pub async fn flush(&self) -> Result<(), StatsError> {
        let (reply, outcome) = oneshot::channel();
        self.commands.send(Command::Flush(reply)).await.map_err(|_| StatsError::Closed)?;
        outcome.await.map_err(|_| StatsError::Closed)?
    }

    /// Stops the worker after a final flush.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError`] when the worker task failed.
    pub async fn close(&self) -> Result<(), StatsError> {
        self.shutdown.send_replace(true);
        let worker = self
            .worker
            .lock()
            .map_err(|_| StatsError::State("stats worker mutex poisoned".to_string()))?
            .take();
        if let Some(worker) = worker {
            worker.await.map_err(|err| StatsError::Worker(err.to_string()))?;
        }
        Ok(())
    }
}

/// Worker loop: periodic flushes, flush commands, and a final flush.
async fn run_worker(
    shared: Arc<Shared>,
    interval: std::time::Duration,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = shared.flush().await {
                    tracing::error!(error = %err, "app stats flush failed");
                }
            }
            command = commands.recv() => match command {
                Some(Command::Flush(reply)) => {
                    let outcome = shared.flush().await;
                    if let Err(err) = &outcome {
                        tracing::error!(error = %err, "app stats flush failed");
                    }
                    let _ = reply.send(outcome);
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    if let Err(err) = shared.flush().await {
        tracing::error!(error = %err, "final app stats flush failed");
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stats collector failures.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Reporter rejected a batch.
    #[error("stats report failed: {0}")]
    Report(#[from] ReportError),
    /// Collector already closed.
    #[error("stats collector closed")]
    Closed,
    /// Aggregation state unavailable.
    #[error("stats state error: {0}")]
    State(String),
    /// Worker task failed.
    #[error("stats worker failed: {0}")]
    Worker(String),
}
