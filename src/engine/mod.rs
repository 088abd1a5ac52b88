//! Progress propagation engine
//!
//! Keeps the Work Entry → Task → Key Result → Objective → KPI chain (and the
//! parallel Task → Project rollup) consistent after a leaf event.
//!
//! Two entry points exist:
//! - `on_work_entry_completed` / `propagate_batch` walk the chain for completed
//!   work entries. Every step is guarded by its foreign key; a missing or
//!   dangling reference skips that step and nothing else.
//! - `recalculate_all_progress` recomputes every objective and KPI from their
//!   key results. It deliberately leaves tasks, work entries and projects alone.
//!
//! Each call loads the collections it needs once into a snapshot, applies
//! all changes in memory and commits only the collections it modified.

mod report;
mod snapshot;

pub use report::{KeyResultChange, MissingReference, PropagationReport, ReferenceKind};

use crate::model::WorkEntry;
use crate::repository::Repositories;
use crate::rollup::{self, TaskCompletion};
use crate::store::{Store, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use snapshot::{Scope, Snapshot};
use std::sync::Arc;

/// How modified collections are written back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Re-read each collection and replace only modified records by id
    #[default]
    Patch,
    /// Overwrite each modified collection wholesale (last write wins)
    Replace,
}

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default)]
    pub write_mode: WriteMode,

    /// Weight of a KPI-linked objective that declares no contribution
    #[serde(default = "default_kpi_contribution")]
    pub default_kpi_contribution: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::Patch,
            default_kpi_contribution: default_kpi_contribution(),
        }
    }
}

fn default_kpi_contribution() -> f64 {
    100.0
}

/// Propagation engine bound to one store
#[derive(Clone)]
pub struct PropagationEngine {
    repos: Repositories,
    options: EngineOptions,
}

impl PropagationEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_options(store, EngineOptions::default())
    }

    pub fn with_options(store: Arc<dyn Store>, options: EngineOptions) -> Self {
        Self {
            repos: Repositories::new(store),
            options,
        }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Propagate one completed work entry down the chain
    pub fn on_work_entry_completed(
        &self,
        entry: &WorkEntry,
    ) -> Result<PropagationReport, StoreError> {
        self.propagate_batch(std::slice::from_ref(entry))
    }

    /// Propagate several completed work entries against a single snapshot
    pub fn propagate_batch(&self, entries: &[WorkEntry]) -> Result<PropagationReport, StoreError> {
        let mut snap = Snapshot::load(&self.repos, Scope::Full)?;
        let mut report = PropagationReport::default();

        for entry in entries {
            self.apply_entry(&mut snap, entry, &mut report);
        }

        if snap.is_dirty() {
            snap.commit(&self.repos, self.options.write_mode)?;
        }
        tracing::info!(
            entries = entries.len(),
            tasks = report.tasks_completed.len(),
            key_results = report.key_results.len(),
            objectives = report.objectives_updated.len(),
            kpis = report.kpis_updated.len(),
            projects = report.projects_updated.len(),
            missing = report.missing.len(),
            "Work entries propagated"
        );
        Ok(report)
    }

    /// Persist `entry`, propagate it, then persist it as completed.
    ///
    /// The entry is stored in progress first, so when propagation fails it
    /// stays open and `complete_work_entry` can retry it by id.
    pub fn record_work_entry(&self, mut entry: WorkEntry) -> Result<PropagationReport, StoreError> {
        if !entry.is_completed() {
            self.repos.work_entries.upsert(&entry)?;
        }
        entry.mark_completed();
        let report = self.on_work_entry_completed(&entry)?;
        self.repos.work_entries.upsert(&entry)?;
        Ok(report)
    }

    /// Mark a stored work entry completed and propagate it.
    ///
    /// Returns `None` when no entry has that id. An entry that is already
    /// completed is reported as replayed and not propagated again.
    pub fn complete_work_entry(
        &self,
        entry_id: &str,
    ) -> Result<Option<PropagationReport>, StoreError> {
        let Some(entry) = self.repos.work_entries.get(entry_id)? else {
            tracing::debug!(entry_id, "Work entry not found");
            return Ok(None);
        };
        if entry.is_completed() {
            tracing::info!(entry_id, "Work entry already completed, not propagating again");
            return Ok(Some(PropagationReport {
                replayed: vec![entry.id],
                ..PropagationReport::default()
            }));
        }
        self.record_work_entry(entry).map(Some)
    }

    /// Propagate, logging a failure instead of returning it.
    ///
    /// For hosts that must keep running when the store rejects a write.
    pub fn complete_logged(&self, entry: &WorkEntry) -> Option<PropagationReport> {
        match self.on_work_entry_completed(entry) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(entry_id = %entry.id, error = %e, "Propagation failed");
                None
            }
        }
    }

    /// Recompute every objective and KPI from their key results.
    ///
    /// Tasks, work entries and projects are not read or written. Running this
    /// twice without intervening changes writes nothing the second time.
    pub fn recalculate_all_progress(&self) -> Result<PropagationReport, StoreError> {
        let mut snap = Snapshot::load(&self.repos, Scope::Okr)?;
        let mut report = PropagationReport::default();

        for idx in 0..snap.objectives.len() {
            self.recompute_objective(&mut snap, idx, &mut report);
        }
        let kpi_ids: Vec<String> = snap.kpis.iter().map(|k| k.id.clone()).collect();
        for kpi_id in &kpi_ids {
            self.recompute_kpi(&mut snap, kpi_id, &mut report);
        }

        if snap.is_dirty() {
            snap.commit(&self.repos, self.options.write_mode)?;
        }
        tracing::info!(
            objectives = report.objectives_updated.len(),
            kpis = report.kpis_updated.len(),
            "Full progress recalculation finished"
        );
        Ok(report)
    }

    fn apply_entry(&self, snap: &mut Snapshot, entry: &WorkEntry, report: &mut PropagationReport) {
        report.work_entries.push(entry.id.clone());

        // 1. task completion
        let mut task_idx = None;
        let mut replay = false;
        if let Some(task_id) = &entry.task_id {
            match snap.task_idx(task_id) {
                Some(idx) => {
                    task_idx = Some(idx);
                    let task = &mut snap.tasks[idx];
                    if task.was_completed_by(&entry.id) {
                        replay = true;
                        report.replayed.push(entry.id.clone());
                        tracing::debug!(entry_id = %entry.id, task_id = %task.id, "Work entry already applied to task");
                    } else {
                        task.complete_with(&entry.id);
                        snap.mark_task(idx);
                        report.task_completed(task_id);
                        tracing::debug!(entry_id = %entry.id, task_id = %task_id, "Task completed");
                    }
                }
                None => report.missing(ReferenceKind::Task, task_id),
            }
        }

        // 2. key result increment; task links win over entry links
        let task = task_idx.map(|idx| &snap.tasks[idx]);
        let kr_id = task
            .and_then(|t| t.key_result_id.clone())
            .or_else(|| entry.key_result_id.clone());
        let objective_id = task
            .and_then(|t| t.objective_id.clone())
            .or_else(|| entry.objective_id.clone());
        let task_project_id = task.and_then(|t| t.project_id.clone());

        let objective_idx = match (&kr_id, &objective_id) {
            (Some(kr_id), hint) => {
                let owner = hint
                    .as_deref()
                    .and_then(|id| snap.objective_idx(id))
                    .filter(|&idx| snap.objectives[idx].key_result(kr_id).is_some())
                    .or_else(|| snap.key_result_owner(kr_id));
                if owner.is_none() {
                    report.missing(ReferenceKind::KeyResult, kr_id);
                }
                if let Some(idx) = owner
                    && !replay
                {
                    self.increment_key_result(snap, idx, kr_id, entry, report);
                }
                owner
            }
            (None, Some(objective_id)) => {
                let idx = snap.objective_idx(objective_id);
                if idx.is_none() {
                    report.missing(ReferenceKind::Objective, objective_id);
                }
                idx
            }
            (None, None) => None,
        };

        // 3-4. objective, then its KPI
        if let Some(idx) = objective_idx {
            self.recompute_objective(snap, idx, report);
            if let Some(kpi_id) = snap.objectives[idx].kpi_id.clone() {
                self.recompute_kpi(snap, &kpi_id, report);
            }
        }

        // 5. projects of the entry and of its task
        let mut project_ids: Vec<String> = entry.project_id.iter().cloned().collect();
        if let Some(pid) = task_project_id
            && !project_ids.contains(&pid)
        {
            project_ids.push(pid);
        }
        for project_id in &project_ids {
            self.recompute_project(snap, project_id, report);
        }
    }

    fn increment_key_result(
        &self,
        snap: &mut Snapshot,
        objective_idx: usize,
        kr_id: &str,
        entry: &WorkEntry,
        report: &mut PropagationReport,
    ) {
        let objective = &mut snap.objectives[objective_idx];
        let objective_id = objective.id.clone();
        let Some(kr) = objective.key_result_mut(kr_id) else {
            return;
        };
        if kr.target <= 0.0 {
            tracing::warn!(key_result_id = %kr_id, target = kr.target, "Key result has no positive target");
        }

        let delta = kr.increment(entry.key_result_increment());
        let current = kr.current;
        if delta == 0.0 {
            tracing::debug!(key_result_id = %kr_id, current, "Key result already at its bound");
            return;
        }

        objective.updated_at = Utc::now();
        snap.mark_objective(objective_idx);
        tracing::info!(
            objective_id = %objective_id,
            key_result_id = %kr_id,
            delta,
            current,
            "Key result incremented"
        );
        report.key_results.push(KeyResultChange {
            objective_id,
            key_result_id: kr_id.to_string(),
            delta,
            current,
        });
    }

    fn recompute_objective(&self, snap: &mut Snapshot, idx: usize, report: &mut PropagationReport) {
        let objective = &mut snap.objectives[idx];
        let Some(progress) = rollup::objective_progress(objective) else {
            tracing::debug!(objective_id = %objective.id, "Objective has no key results, status left as is");
            return;
        };
        let status = rollup::objective_status(progress);
        if objective.progress == progress && objective.status == status {
            return;
        }

        objective.progress = progress;
        objective.status = status;
        objective.updated_at = Utc::now();
        tracing::info!(objective_id = %objective.id, progress, status = ?status, "Objective progress updated");
        report.objective_updated(&objective.id);
        snap.mark_objective(idx);
    }

    fn recompute_kpi(&self, snap: &mut Snapshot, kpi_id: &str, report: &mut PropagationReport) {
        let Some(kpi_idx) = snap.kpi_idx(kpi_id) else {
            report.missing(ReferenceKind::Kpi, kpi_id);
            return;
        };
        let linked = snap.objectives_linked_to(kpi_id);
        if linked.is_empty() {
            tracing::debug!(kpi_id, "KPI has no linked objectives, value left as is");
            return;
        }

        let default_weight = self.options.default_kpi_contribution;
        // an objective without key results has no derived progress and counts as zero
        let contributions: Vec<(f64, f64)> = linked
            .iter()
            .map(|&i| {
                let o = &snap.objectives[i];
                let progress = rollup::objective_progress(o).unwrap_or(0.0);
                (progress, o.kpi_contribution.unwrap_or(default_weight))
            })
            .collect();

        let kpi = &mut snap.kpis[kpi_idx];
        let rollup = rollup::kpi_rollup(kpi.metric.target, contributions);
        let status = rollup::kpi_status(rollup.progress);
        if kpi.metric.current == rollup.current
            && kpi.progress == rollup.progress
            && kpi.status == status
        {
            return;
        }

        kpi.metric.current = rollup.current;
        kpi.progress = rollup.progress;
        kpi.status = status;
        kpi.updated_at = Utc::now();
        tracing::info!(
            kpi_id,
            current = rollup.current,
            progress = rollup.progress,
            total_contribution = rollup.total_contribution,
            status = ?status,
            "KPI value updated"
        );
        report.kpi_updated(kpi_id);
        snap.mark_kpi(kpi_idx);
    }

    fn recompute_project(&self, snap: &mut Snapshot, project_id: &str, report: &mut PropagationReport) {
        let Some(idx) = snap.project_idx(project_id) else {
            report.missing(ReferenceKind::Project, project_id);
            return;
        };
        let completion = TaskCompletion::from_tasks(snap.tasks_in_project(project_id));
        let progress = completion.progress();

        let project = &mut snap.projects[idx];
        let status = rollup::project_status(project.status, progress);
        if project.progress == progress && project.status == status {
            return;
        }

        project.progress = progress;
        project.status = status;
        project.updated_at = Utc::now();
        tracing::info!(
            project_id,
            completed = completion.completed,
            total = completion.total,
            progress,
            "Project progress updated"
        );
        report.project_updated(project_id);
        snap.mark_project(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KeyResult, Kpi, Objective, Project, Task, TaskSource};
    use crate::store::MemoryStore;

    fn engine() -> PropagationEngine {
        PropagationEngine::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_entry_without_links_is_noop() {
        let engine = engine();
        let report = engine
            .on_work_entry_completed(&WorkEntry::new("loose"))
            .unwrap();
        assert!(report.is_noop());
        assert!(report.missing.is_empty());
        assert!(engine.repositories().store().keys().unwrap().is_empty());
    }

    #[test]
    fn test_dangling_task_does_not_stop_project_step() {
        let engine = engine();
        let project = Project::new("P");
        engine.repositories().projects.save_all(&[project.clone()]).unwrap();

        let entry = WorkEntry::new("x")
            .with_task("ghost")
            .with_project(project.id.clone());
        let report = engine.on_work_entry_completed(&entry).unwrap();

        assert_eq!(
            report.missing,
            vec![MissingReference {
                kind: ReferenceKind::Task,
                id: "ghost".to_string()
            }]
        );
        // no tasks reference the project: progress stays 0, record unchanged
        assert!(report.projects_updated.is_empty());
    }

    #[test]
    fn test_task_links_take_precedence() {
        let engine = engine();
        let repos = engine.repositories();

        let mut objective = Objective::new("O");
        let task_kr = KeyResult::new("task kr", 10.0, "x");
        let entry_kr = KeyResult::new("entry kr", 10.0, "x");
        let (task_kr_id, entry_kr_id) = (task_kr.id.clone(), entry_kr.id.clone());
        objective.add_key_result(task_kr);
        objective.add_key_result(entry_kr);
        repos.objectives.save_all(&[objective.clone()]).unwrap();

        let mut task = Task::new("T", TaskSource::Manual);
        task.key_result_id = Some(task_kr_id.clone());
        repos.tasks.save_all(&[task.clone()]).unwrap();

        let entry = WorkEntry::new("w")
            .with_task(task.id.clone())
            .with_key_result(entry_kr_id.clone());
        engine.on_work_entry_completed(&entry).unwrap();

        let stored = repos.objectives.get(&objective.id).unwrap().unwrap();
        assert_eq!(stored.key_result(&task_kr_id).unwrap().current, 1.0);
        assert_eq!(stored.key_result(&entry_kr_id).unwrap().current, 0.0);
    }

    #[test]
    fn test_entry_key_result_used_when_task_has_none() {
        let engine = engine();
        let repos = engine.repositories();

        let mut objective = Objective::new("O");
        let kr = KeyResult::new("kr", 4.0, "x");
        let kr_id = kr.id.clone();
        objective.add_key_result(kr);
        repos.objectives.save_all(&[objective.clone()]).unwrap();
        let task = Task::new("T", TaskSource::Ai);
        repos.tasks.save_all(&[task.clone()]).unwrap();

        let entry = WorkEntry::new("w")
            .with_task(task.id.clone())
            .with_key_result(kr_id.clone())
            .with_minutes(90);
        let report = engine.on_work_entry_completed(&entry).unwrap();

        assert_eq!(report.key_results[0].delta, 2.0);
        let stored = repos.objectives.get(&objective.id).unwrap().unwrap();
        assert_eq!(stored.progress, 50.0);
        assert_eq!(stored.status, crate::model::ObjectiveStatus::AtRisk);
    }

    #[test]
    fn test_kpi_without_linked_objectives_left_alone() {
        let engine = engine();
        let mut kpi = Kpi::new("Revenue", 1000.0, "USD");
        kpi.metric.current = 420.0;
        kpi.progress = 42.0;
        engine.repositories().kpis.save_all(&[kpi.clone()]).unwrap();

        let report = engine.recalculate_all_progress().unwrap();
        assert!(report.is_noop());
        assert_eq!(
            engine.repositories().kpis.get(&kpi.id).unwrap().unwrap(),
            kpi
        );
    }

    #[test]
    fn test_default_contribution_applies() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let engine = PropagationEngine::with_options(
            store,
            EngineOptions {
                default_kpi_contribution: 100.0,
                ..EngineOptions::default()
            },
        );
        let repos = engine.repositories();
        let kpi = Kpi::new("K", 100.0, "pts");

        let mut weighted = Objective::new("weighted");
        let mut kr = KeyResult::new("kr", 10.0, "x");
        kr.current = 10.0;
        weighted.add_key_result(kr);
        weighted.link_kpi(kpi.id.clone(), 100.0);

        let mut unweighted = Objective::new("unweighted");
        unweighted.add_key_result(KeyResult::new("kr", 10.0, "x"));
        unweighted.kpi_id = Some(kpi.id.clone());

        repos.kpis.save_all(&[kpi.clone()]).unwrap();
        repos.objectives.save_all(&[weighted, unweighted]).unwrap();

        engine.recalculate_all_progress().unwrap();
        let stored = repos.kpis.get(&kpi.id).unwrap().unwrap();
        // (100 * 1 + 0 * 1) / 2
        assert_eq!(stored.metric.current, 50.0);
        assert_eq!(stored.status, crate::model::KpiStatus::AtRisk);
    }

    #[test]
    fn test_complete_work_entry_by_id() {
        let engine = engine();
        let repos = engine.repositories();
        let task = Task::new("T", TaskSource::Manual);
        repos.tasks.save_all(&[task.clone()]).unwrap();
        let entry = WorkEntry::new("w").with_task(task.id.clone());
        repos.work_entries.save_all(&[entry.clone()]).unwrap();

        assert!(engine.complete_work_entry("nope").unwrap().is_none());

        let report = engine.complete_work_entry(&entry.id).unwrap().unwrap();
        assert_eq!(report.tasks_completed, vec![task.id.clone()]);
        let stored = repos.work_entries.get(&entry.id).unwrap().unwrap();
        assert!(stored.is_completed());
        assert!(stored.completed_at.is_some());

        let again = engine.complete_work_entry(&entry.id).unwrap().unwrap();
        assert_eq!(again.replayed, vec![entry.id.clone()]);
        assert!(again.is_noop());
    }

    /// Store that rejects writes to one key while `rejected` names it
    struct RejectingStore {
        inner: MemoryStore,
        rejected: parking_lot::Mutex<Option<&'static str>>,
    }

    impl RejectingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStore::new(),
                rejected: parking_lot::Mutex::new(None),
            })
        }

        fn reject(&self, key: Option<&'static str>) {
            *self.rejected.lock() = key;
        }
    }

    impl Store for RejectingStore {
        fn get_raw(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
            self.inner.get_raw(key)
        }

        fn set_raw(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
            if *self.rejected.lock() == Some(key) {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed: 1,
                    available: 0,
                });
            }
            self.inner.set_raw(key, value)
        }

        fn keys(&self) -> Result<Vec<String>, StoreError> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_store_failure_is_returned_or_logged() {
        let store = RejectingStore::new();
        let engine = PropagationEngine::new(store.clone());
        let task = Task::new("T", TaskSource::Manual);
        engine.repositories().tasks.save_all(&[task.clone()]).unwrap();
        store.reject(Some("tasks"));

        let entry = WorkEntry::new("w").with_task(task.id.clone());
        assert!(matches!(
            engine.on_work_entry_completed(&entry),
            Err(StoreError::QuotaExceeded { .. })
        ));
        assert!(engine.complete_logged(&entry).is_none());

        // nothing was persisted
        let stored = engine.repositories().tasks.get(&task.id).unwrap().unwrap();
        assert!(!stored.is_completed());
    }

    #[test]
    fn test_failed_propagation_can_be_retried_by_id() {
        let store = RejectingStore::new();
        let engine = PropagationEngine::new(store.clone());
        let repos = engine.repositories();
        let task = Task::new("T", TaskSource::Manual);
        repos.tasks.save_all(&[task.clone()]).unwrap();

        store.reject(Some("tasks"));
        let entry = WorkEntry::new("w").with_task(task.id.clone());
        assert!(engine.record_work_entry(entry.clone()).is_err());

        // the entry is kept open so it can be completed later
        let stored = repos.work_entries.get(&entry.id).unwrap().unwrap();
        assert!(!stored.is_completed());

        store.reject(None);
        let report = engine.complete_work_entry(&entry.id).unwrap().unwrap();
        assert!(report.replayed.is_empty());
        assert_eq!(report.tasks_completed, vec![task.id.clone()]);
        assert!(repos.tasks.get(&task.id).unwrap().unwrap().is_completed());
        assert!(repos.work_entries.get(&entry.id).unwrap().unwrap().is_completed());
    }

    #[test]
    fn test_key_result_at_target_reports_nothing() {
        let engine = engine();
        let repos = engine.repositories();

        let mut objective = Objective::new("O");
        let mut kr = KeyResult::new("kr", 2.0, "x");
        kr.current = 2.0;
        let kr_id = kr.id.clone();
        objective.add_key_result(kr);
        repos.objectives.save_all(&[objective.clone()]).unwrap();
        engine.recalculate_all_progress().unwrap();

        let entry = WorkEntry::new("w")
            .with_key_result(kr_id)
            .with_objective(objective.id.clone());
        let report = engine.on_work_entry_completed(&entry).unwrap();
        assert!(report.key_results.is_empty());
        assert!(report.is_noop());
    }

    #[test]
    fn test_empty_objective_counts_as_zero_for_kpi() {
        let engine = engine();
        let repos = engine.repositories();
        let kpi = Kpi::new("K", 1000.0, "USD");

        let mut empty = Objective::new("empty");
        empty.progress = 90.0;
        empty.link_kpi(kpi.id.clone(), 50.0);
        let mut real = Objective::new("real");
        real.add_key_result(KeyResult::new("kr", 10.0, "x"));
        real.link_kpi(kpi.id.clone(), 50.0);

        repos.kpis.save_all(&[kpi.clone()]).unwrap();
        repos.objectives.save_all(&[empty.clone(), real]).unwrap();
        engine.recalculate_all_progress().unwrap();

        let stored = repos.kpis.get(&kpi.id).unwrap().unwrap();
        assert_eq!(stored.metric.current, 0.0);
        assert_eq!(stored.status, crate::model::KpiStatus::Behind);
        // the empty objective itself is left as stored
        assert_eq!(repos.objectives.get(&empty.id).unwrap().unwrap().progress, 90.0);
    }
}
