//! Scan scheduler - drives periodic status fetches.
//!
//! ```text
//!   interval tick ──► cycle ─┬─► platform task (bilibili): t1 ─jitter─► t2 ─jitter─► t3
//!   (immediate, then         ├─► platform task (douyu):    t4
//!    every scan interval)    └─► platform task (weibo):    t5 ─jitter─► t6
//! ```
//!
//! Platforms run in parallel; targets on one platform are fetched strictly in
//! order with a random pause between them. Cycles never wait for each other:
//! a target queried less than one scan interval ago is skipped, so an
//! overlapping cycle does no redundant work.
//!
//! Every loop, cycle, platform task and fetch observes one
//! `CancellationToken`. All spawned work lives on a `TaskTracker`, so
//! [`Scheduler::shutdown`] can wait for it to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use livewatch_core::{Platform, Target};
use livewatch_platforms::{Adapter, FetchError, StatusSource};

use crate::config::Settings;
use crate::tracker::{ApplyOutcome, LivenessTracker};

/// Adapter lookup used by the scheduler.
pub type SourceMap = HashMap<Platform, Arc<dyn StatusSource>>;

/// Builds the built-in adapter for every platform used by `targets`.
pub fn adapter_sources(targets: &[Target]) -> Result<SourceMap, FetchError> {
    let mut sources: SourceMap = HashMap::new();
    for target in targets {
        if !sources.contains_key(&target.platform) {
            let adapter = Adapter::for_platform(target.platform)?;
            sources.insert(target.platform, Arc::new(adapter));
        }
    }
    Ok(sources)
}

// ============================================================================
// Settings and reports
// ============================================================================

/// Timing knobs for scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Cycle cadence and skip threshold.
    pub interval: Duration,
    pub delay_min: Duration,
    pub delay_max: Duration,
}

impl From<&Settings> for ScanSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            interval: settings.scan_interval(),
            delay_min: settings.delay_min(),
            delay_max: settings.delay_max(),
        }
    }
}

impl ScanSettings {
    /// Uniformly random pause in `[delay_min, delay_max]`.
    fn jitter(&self) -> Duration {
        let min = u64::try_from(self.delay_min.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.delay_max.as_millis()).unwrap_or(u64::MAX).max(min);
        if min == max {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Counts for one platform pass or one full cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Fetches whose result was committed successfully.
    pub fetched: usize,
    /// Targets not fetched because they were queried recently or have no adapter.
    pub skipped: usize,
    pub failed: usize,
    /// Fetches abandoned by shutdown.
    pub cancelled: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.fetched += other.fetched;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
    }

    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Succeeded { .. } => self.fetched += 1,
            ApplyOutcome::Failed { .. } => self.failed += 1,
            ApplyOutcome::Cancelled => self.cancelled += 1,
            ApplyOutcome::UnknownTarget => self.skipped += 1,
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler {
    /// Targets grouped by platform, configured order preserved.
    groups: Vec<(Platform, Arc<[Target]>)>,
    sources: SourceMap,
    tracker: Arc<LivenessTracker>,
    settings: ScanSettings,
    tasks: TaskTracker,
}

impl Scheduler {
    pub fn new(
        targets: &[Target],
        sources: SourceMap,
        tracker: Arc<LivenessTracker>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            groups: group_by_platform(targets),
            sources,
            tracker,
            settings,
            tasks: TaskTracker::new(),
        }
    }

    pub fn settings(&self) -> ScanSettings {
        self.settings
    }

    /// Starts the cycle loop. The first cycle fires immediately.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        self.tasks.spawn(async move {
            let mut tick = interval(scheduler.settings.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                platforms = scheduler.groups.len(),
                interval_secs = scheduler.settings.interval.as_secs(),
                "Scan scheduler started"
            );

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        info!("Scan scheduler shutting down");
                        break;
                    }

                    _ = tick.tick() => {
                        let cycle = Arc::clone(&scheduler);
                        let cancel = cancel.clone();
                        scheduler.tasks.spawn(async move {
                            cycle.run_cycle(&cancel).await;
                        });
                    }
                }
            }
        })
    }

    /// Runs one full cycle: every platform in parallel, awaited together.
    pub async fn run_cycle(self: &Arc<Self>, cancel: &CancellationToken) -> CycleReport {
        let started = std::time::Instant::now();
        let targets: usize = self.groups.iter().map(|(_, t)| t.len()).sum();
        info!(platforms = self.groups.len(), targets, "Scan cycle started");

        let mut handles = Vec::with_capacity(self.groups.len());
        for (platform, targets) in &self.groups {
            let scheduler = Arc::clone(self);
            let platform = *platform;
            let targets = Arc::clone(targets);
            let cancel = cancel.clone();
            let handle = self
                .tasks
                .spawn(async move { scheduler.scan_platform(platform, &targets, &cancel).await });
            handles.push((platform, handle));
        }

        let mut report = CycleReport::default();
        for (platform, handle) in handles {
            match handle.await {
                Ok(platform_report) => report.merge(platform_report),
                Err(e) => warn!(platform = %platform, error = %e, "Platform task failed"),
            }
        }

        info!(
            fetched = report.fetched,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan cycle finished"
        );
        report
    }

    /// Fetches one platform's targets in order.
    pub async fn scan_platform(
        &self,
        platform: Platform,
        targets: &[Target],
        cancel: &CancellationToken,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        let Some(source) = self.sources.get(&platform) else {
            warn!(
                platform = %platform,
                targets = targets.len(),
                "No adapter for platform; skipping"
            );
            report.skipped = targets.len();
            return report;
        };

        for (index, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            if self.queried_recently(target).await {
                debug!(target_id = %target.id, platform = %platform, "Queried recently; skipping");
                report.skipped += 1;
                continue;
            }

            let result = source.fetch(&target.room_id, cancel).await;
            report.record(self.tracker.apply(target, result).await);

            let is_last = index + 1 == targets.len();
            if !is_last {
                let pause = self.settings.jitter();
                debug!(
                    platform = %platform,
                    pause_ms = pause.as_millis() as u64,
                    "Pausing before next target"
                );
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        report
    }

    /// True when the store says this target was queried within one interval.
    ///
    /// A failed lookup is logged and treated as "not recent".
    async fn queried_recently(&self, target: &Target) -> bool {
        let last = match self.tracker.store().last_query_time(&target.id).await {
            Ok(last) => last,
            Err(e) => {
                warn!(
                    target_id = %target.id,
                    error = %e,
                    "Failed to read last query time; fetching anyway"
                );
                return false;
            }
        };

        match last {
            // A timestamp in the future also counts as recent.
            Some(last) => (Utc::now() - last)
                .to_std()
                .map_or(true, |elapsed| elapsed < self.settings.interval),
            None => false,
        }
    }

    /// Stops accepting work and waits for in-flight cycles to finish.
    ///
    /// The caller cancels the token first; this only awaits.
    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        debug!("Scan scheduler drained");
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("platforms", &self.groups.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Groups targets by platform, keeping first-appearance order for both.
pub fn group_by_platform(targets: &[Target]) -> Vec<(Platform, Arc<[Target]>)> {
    let mut groups: Vec<(Platform, Vec<Target>)> = Vec::new();
    for target in targets {
        match groups.iter_mut().find(|(p, _)| *p == target.platform) {
            Some((_, list)) => list.push(target.clone()),
            None => groups.push((target.platform, vec![target.clone()])),
        }
    }
    groups
        .into_iter()
        .map(|(platform, list)| (platform, Arc::from(list)))
        .collect()
}
