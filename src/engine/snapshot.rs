//! In-memory arena of the collections touched by one propagation batch
//!
//! Collections are read once, indexed by id and by the foreign keys the
//! engine follows, mutated in place, and written back on `commit`. Indexes
//! stay valid for the snapshot's lifetime because the engine never adds,
//! removes or re-links records.

use super::WriteMode;
use crate::model::{Entity, Kpi, Objective, Project, Task};
use crate::repository::{Repositories, Repository};
use crate::store::StoreError;
use std::collections::{BTreeSet, HashMap};

/// Which collections a snapshot loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Tasks, objectives, KPIs and projects
    Full,
    /// Objectives and KPIs only
    Okr,
}

pub(crate) struct Snapshot {
    pub tasks: Vec<Task>,
    pub objectives: Vec<Objective>,
    pub kpis: Vec<Kpi>,
    pub projects: Vec<Project>,

    task_index: HashMap<String, usize>,
    objective_index: HashMap<String, usize>,
    kpi_index: HashMap<String, usize>,
    project_index: HashMap<String, usize>,
    /// key result id -> owning objective
    key_result_owner: HashMap<String, usize>,
    /// KPI id -> linked objectives
    objectives_by_kpi: HashMap<String, Vec<usize>>,
    /// project id -> tasks referencing it
    tasks_by_project: HashMap<String, Vec<usize>>,

    dirty_tasks: BTreeSet<usize>,
    dirty_objectives: BTreeSet<usize>,
    dirty_kpis: BTreeSet<usize>,
    dirty_projects: BTreeSet<usize>,
}

impl Snapshot {
    pub fn load(repos: &Repositories, scope: Scope) -> Result<Self, StoreError> {
        let (tasks, projects) = match scope {
            Scope::Full => (repos.tasks.load_all()?, repos.projects.load_all()?),
            Scope::Okr => (Vec::new(), Vec::new()),
        };
        let objectives = repos.objectives.load_all()?;
        let kpis = repos.kpis.load_all()?;
        Ok(Self::build(tasks, objectives, kpis, projects))
    }

    fn build(
        tasks: Vec<Task>,
        objectives: Vec<Objective>,
        kpis: Vec<Kpi>,
        projects: Vec<Project>,
    ) -> Self {
        let mut key_result_owner = HashMap::new();
        let mut objectives_by_kpi: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, objective) in objectives.iter().enumerate() {
            for kr in &objective.key_results {
                // first owner wins, matching a front-to-back scan
                key_result_owner.entry(kr.id.clone()).or_insert(i);
            }
            if let Some(kpi_id) = &objective.kpi_id {
                objectives_by_kpi.entry(kpi_id.clone()).or_default().push(i);
            }
        }

        let mut tasks_by_project: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            if let Some(project_id) = &task.project_id {
                tasks_by_project.entry(project_id.clone()).or_default().push(i);
            }
        }

        Self {
            task_index: index_by_id(&tasks),
            objective_index: index_by_id(&objectives),
            kpi_index: index_by_id(&kpis),
            project_index: index_by_id(&projects),
            key_result_owner,
            objectives_by_kpi,
            tasks_by_project,
            tasks,
            objectives,
            kpis,
            projects,
            dirty_tasks: BTreeSet::new(),
            dirty_objectives: BTreeSet::new(),
            dirty_kpis: BTreeSet::new(),
            dirty_projects: BTreeSet::new(),
        }
    }

    pub fn task_idx(&self, id: &str) -> Option<usize> {
        self.task_index.get(id).copied()
    }

    pub fn objective_idx(&self, id: &str) -> Option<usize> {
        self.objective_index.get(id).copied()
    }

    pub fn kpi_idx(&self, id: &str) -> Option<usize> {
        self.kpi_index.get(id).copied()
    }

    pub fn project_idx(&self, id: &str) -> Option<usize> {
        self.project_index.get(id).copied()
    }

    pub fn key_result_owner(&self, kr_id: &str) -> Option<usize> {
        self.key_result_owner.get(kr_id).copied()
    }

    pub fn objectives_linked_to(&self, kpi_id: &str) -> &[usize] {
        self.objectives_by_kpi
            .get(kpi_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn tasks_in_project(&self, project_id: &str) -> impl Iterator<Item = &Task> {
        self.tasks_by_project
            .get(project_id)
            .into_iter()
            .flatten()
            .map(|&i| &self.tasks[i])
    }

    pub fn mark_task(&mut self, idx: usize) {
        self.dirty_tasks.insert(idx);
    }

    pub fn mark_objective(&mut self, idx: usize) {
        self.dirty_objectives.insert(idx);
    }

    pub fn mark_kpi(&mut self, idx: usize) {
        self.dirty_kpis.insert(idx);
    }

    pub fn mark_project(&mut self, idx: usize) {
        self.dirty_projects.insert(idx);
    }

    pub fn is_dirty(&self) -> bool {
        !(self.dirty_tasks.is_empty()
            && self.dirty_objectives.is_empty()
            && self.dirty_kpis.is_empty()
            && self.dirty_projects.is_empty())
    }

    /// Persist every collection holding a modified record, leaves first.
    ///
    /// A failure stops the commit; collections written before it stay written.
    pub fn commit(&self, repos: &Repositories, mode: WriteMode) -> Result<(), StoreError> {
        write_collection(&repos.tasks, &self.tasks, &self.dirty_tasks, mode)?;
        write_collection(&repos.objectives, &self.objectives, &self.dirty_objectives, mode)?;
        write_collection(&repos.kpis, &self.kpis, &self.dirty_kpis, mode)?;
        write_collection(&repos.projects, &self.projects, &self.dirty_projects, mode)?;
        Ok(())
    }
}

fn index_by_id<T: Entity>(records: &[T]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        index.entry(record.id().to_string()).or_insert(i);
    }
    index
}

fn write_collection<T: Entity>(
    repo: &Repository<T>,
    records: &[T],
    dirty: &BTreeSet<usize>,
    mode: WriteMode,
) -> Result<(), StoreError> {
    if dirty.is_empty() {
        return Ok(());
    }
    match mode {
        WriteMode::Replace => repo.save_all(records),
        WriteMode::Patch => {
            let changed: Vec<T> = dirty.iter().map(|&i| records[i].clone()).collect();
            repo.patch(&changed).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{KeyResult, TaskSource};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_indexes() {
        let repos = Repositories::new(Arc::new(MemoryStore::new()));

        let mut objective = Objective::new("O");
        let kr = KeyResult::new("KR", 10.0, "x");
        let kr_id = kr.id.clone();
        objective.add_key_result(kr);
        objective.link_kpi("kpi-1", 50.0);
        let mut task = Task::new("T", TaskSource::Manual);
        task.project_id = Some("p-1".to_string());

        repos.objectives.save_all(&[objective.clone()]).unwrap();
        repos.tasks.save_all(&[task.clone()]).unwrap();

        let snap = Snapshot::load(&repos, Scope::Full).unwrap();
        assert_eq!(snap.key_result_owner(&kr_id), Some(0));
        assert_eq!(snap.objectives_linked_to("kpi-1"), &[0]);
        assert!(snap.objectives_linked_to("kpi-2").is_empty());
        assert_eq!(snap.tasks_in_project("p-1").count(), 1);
        assert_eq!(snap.task_idx(&task.id), Some(0));
        assert!(!snap.is_dirty());

        let okr_only = Snapshot::load(&repos, Scope::Okr).unwrap();
        assert!(okr_only.tasks.is_empty());
        assert_eq!(okr_only.objective_idx(&objective.id), Some(0));
    }
}
