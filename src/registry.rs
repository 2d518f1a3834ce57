//! # Analyzer Registry
//!
//! Maps skill names to analyzer factories. The registry is assembled
//! explicitly by the host, usually via [`default_registry`].
//!
//! | Skill | Analyzer | Reads | Writes |
//! |-------|----------|-------|--------|
//! | `grid_system` | [`GridSystemAnalyzer`] | track points | grid cells |
//! | `density_structure` | [`DensityClassifier`] | grid cells | density zones |

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};
use serde_json::json;
use thiserror::Error;

use crate::classifier::{
    AnalysisRun, CancellationToken, ClassifierError, DensityClassifier, RunLocks, RunMode,
    RunStatus,
};
use crate::grid::{aggregate_points, GridConfig};
use crate::store::{SpatialStore, GRID_CELL_TABLE};

/// Registry lookup errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown skill: {name}")]
    UnknownSkill {
        /// Requested skill name.
        name: String,
    },
}

/// A batch analysis over a [`SpatialStore`].
pub trait Analyzer: Send + Sync {
    /// Skill name this analyzer is registered under.
    fn name(&self) -> &str;

    /// Run once. Failures are reported on the returned run.
    fn analyze(&self, mode: RunMode, cancel: &CancellationToken) -> AnalysisRun;
}

/// Builds an analyzer bound to a store.
pub type AnalyzerFactory = Box<dyn Fn(Arc<dyn SpatialStore>) -> Box<dyn Analyzer> + Send + Sync>;

/// Skill name to factory mapping.
#[derive(Default)]
pub struct AnalyzerRegistry {
    factories: BTreeMap<String, AnalyzerFactory>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `skill`, replacing any previous entry.
    pub fn register<F>(&mut self, skill: &str, factory: F)
    where
        F: Fn(Arc<dyn SpatialStore>) -> Box<dyn Analyzer> + Send + Sync + 'static,
    {
        if self.factories.insert(skill.to_string(), Box::new(factory)).is_some() {
            info!("[AnalyzerRegistry] Replaced analyzer for skill {}", skill);
        } else {
            debug!("[AnalyzerRegistry] Registered skill {}", skill);
        }
    }

    /// Build the analyzer for `skill` over `store`.
    pub fn build(
        &self,
        skill: &str,
        store: Arc<dyn SpatialStore>,
    ) -> Result<Box<dyn Analyzer>, RegistryError> {
        let factory = self
            .factories
            .get(skill)
            .ok_or_else(|| RegistryError::UnknownSkill { name: skill.to_string() })?;
        Ok(factory(store))
    }

    pub fn contains(&self, skill: &str) -> bool {
        self.factories.contains_key(skill)
    }

    /// Registered skill names, sorted.
    pub fn skills(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

/// Registry with the built-in analyzers and default configs.
pub fn default_registry() -> AnalyzerRegistry {
    let mut registry = AnalyzerRegistry::new();
    registry.register(GridSystemAnalyzer::SKILL, |store| {
        Box::new(GridSystemAnalyzer::new(store)) as Box<dyn Analyzer>
    });
    registry.register(DensityClassifier::SKILL, |store| {
        Box::new(DensityClassifier::new(store)) as Box<dyn Analyzer>
    });
    registry
}

impl Analyzer for DensityClassifier {
    fn name(&self) -> &str {
        Self::SKILL
    }

    fn analyze(&self, mode: RunMode, cancel: &CancellationToken) -> AnalysisRun {
        self.run(mode, cancel)
    }
}

// ============================================================================
// Grid system
// ============================================================================

/// Aggregates stored track points into multi-level grid cells.
pub struct GridSystemAnalyzer {
    store: Arc<dyn SpatialStore>,
    config: GridConfig,
}

impl GridSystemAnalyzer {
    pub const SKILL: &'static str = "grid_system";

    pub fn new(store: Arc<dyn SpatialStore>) -> Self {
        Self::with_config(store, GridConfig::default())
    }

    pub fn with_config(store: Arc<dyn SpatialStore>, config: GridConfig) -> Self {
        Self { store, config }
    }

    fn execute(
        &self,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ClassifierError> {
        let lock_key = format!("{}@{}", GRID_CELL_TABLE, self.store.lock_key());
        let _guard = RunLocks::global().try_acquire(&lock_key)?;
        cancel.checkpoint()?;

        let points = self.store.track_points()?;
        info!("[GridSystem] Loaded {} track points", points.len());
        let cells = aggregate_points(&points, &self.config);

        cancel.checkpoint()?;

        if mode == RunMode::Full {
            let removed = self.store.clear_grid_cells()?;
            info!("[GridSystem] Cleared {} existing grid cells", removed);
        }
        self.store.write_grid_cells(&cells)?;
        info!("[GridSystem] Wrote {} grid cells", cells.len());

        Ok(json!({
            "total_points": points.len(),
            "total_cells": cells.len(),
            "levels": self.config.levels,
        }))
    }
}

impl Analyzer for GridSystemAnalyzer {
    fn name(&self) -> &str {
        Self::SKILL
    }

    fn analyze(&self, mode: RunMode, cancel: &CancellationToken) -> AnalysisRun {
        let mut run = AnalysisRun::new(Self::SKILL, mode);
        run.transition(RunStatus::Running);
        info!("[GridSystem] Starting {} run {}", mode, run.id);
        run.finish(self.execute(mode, cancel));
        run
    }
}
