//! # Density Classifier
//!
//! Batch job that turns stored grid cells into HOT / WARM / COLD density zones.
//!
//! ## Run lifecycle
//!
//! | Step | Full | Incremental |
//! |------|------|-------------|
//! | Acquire the zone table's run lock | yes | yes |
//! | Delete existing zones | yes | no |
//! | Read cells with `visit_count > 0` | yes | yes |
//! | Classify in memory | yes | yes |
//! | Cancellation checkpoint | yes | yes |
//! | Upsert zones in one transaction | yes | yes |
//!
//! Status moves `Pending -> Running -> Completed` or `Running -> Failed`.
//! Errors never escape [`DensityClassifier::run`]; they end up as
//! [`RunStatus::Failed`] on the returned [`AnalysisRun`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::density::{classify_cells, RunSummary};
use crate::store::{SpatialStore, StoreError};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The backing store failed to read or write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another run holds the lock for this store's zone table.
    #[error("run already in progress for {key}")]
    RunInProgress {
        /// Lock key, see [`SpatialStore::lock_key`].
        key: String,
    },

    /// The run was cancelled before its write phase.
    #[error("cancelled")]
    Cancelled,
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings for a density classification run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Version tag written on every zone.
    pub algo_version: String,
    /// Bucket the zones are written under.
    pub bucket_type: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            algo_version: "v1".to_string(),
            bucket_type: "all".to_string(),
        }
    }
}

// ============================================================================
// Run model
// ============================================================================

/// How a run treats existing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Delete existing output before writing.
    Full,
    /// Upsert over existing output.
    Incremental,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Incremental => "incremental",
        }
    }

    /// Parse `"full"` or `"incremental"` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Some(RunMode::Full),
            "incremental" => Some(RunMode::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed {
        /// JSON summary produced by the analyzer.
        summary: serde_json::Value,
    },
    Failed {
        /// Human-readable cause.
        message: String,
    },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed { .. } | RunStatus::Failed { .. })
    }
}

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// One invocation of an analyzer, with its status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: u64,
    pub skill: String,
    pub mode: RunMode,
    pub status: RunStatus,
    /// Every status the run has held, oldest first.
    pub transitions: Vec<RunStatus>,
}

impl AnalysisRun {
    /// A new pending run with a process-unique id.
    pub fn new(skill: &str, mode: RunMode) -> Self {
        Self {
            id: NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed),
            skill: skill.to_string(),
            mode,
            status: RunStatus::Pending,
            transitions: vec![RunStatus::Pending],
        }
    }

    /// Move to `status`. Terminal runs ignore further transitions.
    pub fn transition(&mut self, status: RunStatus) {
        if self.status.is_terminal() {
            warn!(
                "[AnalysisRun] Run {} ({}) already finished, ignoring transition",
                self.id, self.skill
            );
            return;
        }
        self.transitions.push(status.clone());
        self.status = status;
    }

    /// Record the outcome of the run body.
    pub fn finish(&mut self, outcome: Result<serde_json::Value, ClassifierError>) {
        match outcome {
            Ok(summary) => {
                info!("[AnalysisRun] Run {} ({}) completed: {}", self.id, self.skill, summary);
                self.transition(RunStatus::Completed { summary });
            }
            Err(ClassifierError::Cancelled) => {
                warn!("[AnalysisRun] Run {} ({}) cancelled", self.id, self.skill);
                self.transition(RunStatus::Failed {
                    message: ClassifierError::Cancelled.to_string(),
                });
            }
            Err(e) => {
                error!("[AnalysisRun] Run {} ({}) failed: {}", self.id, self.skill, e);
                self.transition(RunStatus::Failed { message: e.to_string() });
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed { .. })
    }

    pub fn summary(&self) -> Option<&serde_json::Value> {
        match &self.status {
            RunStatus::Completed { summary } => Some(summary),
            _ => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Failed { message } => Some(message),
            _ => None,
        }
    }
}

// ============================================================================
// Cancellation and single-flight locking
// ============================================================================

/// Shared flag checked at run checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn checkpoint(&self) -> Result<(), ClassifierError> {
        if self.is_cancelled() {
            Err(ClassifierError::Cancelled)
        } else {
            Ok(())
        }
    }
}

static GLOBAL_LOCKS: RunLocks = RunLocks::new();

/// Set of lock keys with a run in flight.
#[derive(Debug)]
pub struct RunLocks {
    active: Mutex<BTreeSet<String>>,
}

impl Default for RunLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLocks {
    pub const fn new() -> Self {
        Self { active: Mutex::new(BTreeSet::new()) }
    }

    /// Process-wide lock set used by the built-in analyzers.
    pub fn global() -> &'static RunLocks {
        &GLOBAL_LOCKS
    }

    /// Lock `key`, failing fast if it is already held.
    pub fn try_acquire(&self, key: &str) -> Result<RunGuard<'_>, ClassifierError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.to_string()) {
            warn!("[RunLocks] {} is locked by another run", key);
            return Err(ClassifierError::RunInProgress { key: key.to_string() });
        }
        Ok(RunGuard { locks: self, key: key.to_string() })
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }
}

/// Releases the lock key on drop.
#[derive(Debug)]
pub struct RunGuard<'a> {
    locks: &'a RunLocks,
    key: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.locks.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.key);
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Classifies stored grid cells into density zones.
pub struct DensityClassifier {
    store: Arc<dyn SpatialStore>,
    config: ClassifierConfig,
}

impl DensityClassifier {
    /// Skill name used in the analyzer registry.
    pub const SKILL: &'static str = "density_structure";

    pub fn new(store: Arc<dyn SpatialStore>) -> Self {
        Self::with_config(store, ClassifierConfig::default())
    }

    pub fn with_config(store: Arc<dyn SpatialStore>, config: ClassifierConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Execute one run. Failures are reported on the returned run.
    pub fn run(&self, mode: RunMode, cancel: &CancellationToken) -> AnalysisRun {
        let mut run = AnalysisRun::new(Self::SKILL, mode);
        run.transition(RunStatus::Running);
        info!(
            "[DensityClassifier] Starting {} run {} on {}",
            mode,
            run.id,
            self.store.zone_table()
        );

        let outcome = self.execute(mode, cancel).map(|summary| summary.to_json());
        run.finish(outcome);
        run
    }

    fn execute(&self, mode: RunMode, cancel: &CancellationToken) -> Result<RunSummary, ClassifierError> {
        let _guard = RunLocks::global().try_acquire(&self.store.lock_key())?;
        cancel.checkpoint()?;

        if mode == RunMode::Full {
            let removed = self.store.clear_zones()?;
            info!("[DensityClassifier] Cleared {} existing zones", removed);
        }

        let cells = self.store.eligible_grid_cells()?;
        if cells.is_empty() {
            info!("[DensityClassifier] No grid cells with visits");
            return Ok(RunSummary::empty());
        }
        info!("[DensityClassifier] Processing {} grid cells", cells.len());

        let zones = classify_cells(&cells, &self.config.bucket_type, &self.config.algo_version);

        cancel.checkpoint()?;

        self.store.write_zones(&zones)?;
        info!("[DensityClassifier] Inserted {} density zones", zones.len());

        Ok(RunSummary::from_zones(&zones))
    }
}
