//! Entity repositories over the key-value store
//!
//! Each collection is persisted as one JSON array. Repositories offer two
//! write styles: `save_all` replaces the whole array (last write wins), while
//! `patch` re-reads the array and swaps in only the given records by id.

use crate::model::{
    Entity, Kpi, KpiStatus, Objective, ObjectiveStatus, Project, ProjectStatus, Task, TaskSource,
    TaskStatus, WorkEntry,
};
use crate::store::{Store, StoreError, StoreExt};
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Collection that held machine-suggested tasks before tasks were unified
pub const LEGACY_SUGGESTED_TASKS_KEY: &str = "suggested_tasks";

/// Typed access to one entity collection
pub struct Repository<T: Entity> {
    store: Arc<dyn Store>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Load the whole collection; a missing key is an empty collection
    pub fn load_all(&self) -> Result<Vec<T>, StoreError> {
        self.store.get_or(T::COLLECTION, Vec::new())
    }

    /// Replace the whole collection
    pub fn save_all(&self, records: &[T]) -> Result<(), StoreError> {
        self.store.set(T::COLLECTION, records)?;
        tracing::debug!(
            collection = T::COLLECTION,
            count = records.len(),
            "Collection saved"
        );
        Ok(())
    }

    /// Get a record by id
    pub fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.load_all()?.into_iter().find(|r| r.id() == id))
    }

    /// Re-read the collection and replace the given records by id.
    ///
    /// Records not present in the fresh read are appended. Every other record
    /// is written back exactly as it was read. Returns the number of records
    /// that replaced an existing one.
    pub fn patch(&self, records: &[T]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut current = self.load_all()?;
        let index: HashMap<String, usize> = current
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id().to_string(), i))
            .collect();

        let mut replaced = 0;
        for record in records {
            match index.get(record.id()) {
                Some(&i) => {
                    current[i] = record.clone();
                    replaced += 1;
                }
                None => current.push(record.clone()),
            }
        }

        self.save_all(&current)?;
        Ok(replaced)
    }

    /// Insert or replace a single record
    pub fn upsert(&self, record: &T) -> Result<(), StoreError> {
        self.patch(std::slice::from_ref(record)).map(|_| ())
    }

    /// Delete a record by id
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut current = self.load_all()?;
        let before = current.len();
        current.retain(|r| r.id() != id);
        if current.len() == before {
            return Ok(false);
        }
        self.save_all(&current)?;
        Ok(true)
    }

    /// Records matching a predicate
    pub fn query(&self, predicate: impl Fn(&T) -> bool) -> Result<Vec<T>, StoreError> {
        Ok(self.load_all()?.into_iter().filter(|r| predicate(r)).collect())
    }
}

/// All repositories sharing one store
#[derive(Clone)]
pub struct Repositories {
    pub work_entries: Repository<WorkEntry>,
    pub tasks: Repository<Task>,
    pub objectives: Repository<Objective>,
    pub kpis: Repository<Kpi>,
    pub projects: Repository<Project>,
    store: Arc<dyn Store>,
}

impl Repositories {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            work_entries: Repository::new(store.clone()),
            tasks: Repository::new(store.clone()),
            objectives: Repository::new(store.clone()),
            kpis: Repository::new(store.clone()),
            projects: Repository::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Fold the legacy suggested-task collection into `tasks`, tagged `ai`.
    ///
    /// Tasks whose id already exists in `tasks` are left alone. The legacy
    /// collection is emptied afterwards. Returns the number of tasks moved.
    pub fn migrate_legacy_tasks(&self) -> Result<usize, StoreError> {
        let legacy: Vec<Task> = self.store.get_or(LEGACY_SUGGESTED_TASKS_KEY, Vec::new())?;
        if legacy.is_empty() {
            return Ok(0);
        }

        let mut tasks = self.tasks.load_all()?;
        let mut moved = 0;
        for mut task in legacy {
            if tasks.iter().any(|t| t.id == task.id) {
                tracing::debug!(task_id = %task.id, "Legacy task already present, skipping");
                continue;
            }
            task.source = TaskSource::Ai;
            tasks.push(task);
            moved += 1;
        }

        self.tasks.save_all(&tasks)?;
        self.store
            .set(LEGACY_SUGGESTED_TASKS_KEY, &Vec::<Task>::new())?;
        tracing::info!(moved, "Legacy suggested tasks migrated");
        Ok(moved)
    }

    /// Status breakdown across the dashboard collections
    pub fn stats(&self) -> Result<DashboardStats, StoreError> {
        let objectives = self.objectives.load_all()?;
        let kpis = self.kpis.load_all()?;
        let projects = self.projects.load_all()?;
        let tasks = self.tasks.load_all()?;
        let work_entries = self.work_entries.load_all()?;

        Ok(DashboardStats {
            total_objectives: objectives.len(),
            total_kpis: kpis.len(),
            total_projects: projects.len(),
            total_tasks: tasks.len(),
            total_work_entries: work_entries.len(),
            objective_status_counts: count_by(&objectives, |o| o.status),
            kpi_status_counts: count_by(&kpis, |k| k.status),
            project_status_counts: count_by(&projects, |p| p.status),
            task_status_counts: count_by(&tasks, |t| t.status),
        })
    }
}

/// Status counts across the dashboard
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_objectives: usize,
    pub total_kpis: usize,
    pub total_projects: usize,
    pub total_tasks: usize,
    pub total_work_entries: usize,
    pub objective_status_counts: HashMap<ObjectiveStatus, usize>,
    pub kpi_status_counts: HashMap<KpiStatus, usize>,
    pub project_status_counts: HashMap<ProjectStatus, usize>,
    pub task_status_counts: HashMap<TaskStatus, usize>,
}

fn count_by<T, K: std::hash::Hash + Eq>(records: &[T], key: impl Fn(&T) -> K) -> HashMap<K, usize> {
    records.iter().fold(HashMap::new(), |mut acc, r| {
        *acc.entry(key(r)).or_insert(0) += 1;
        acc
    })
}
