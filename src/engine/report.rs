//! What a propagation run changed

use serde::Serialize;

/// Kind of record a dangling reference pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Task,
    KeyResult,
    Objective,
    Kpi,
    Project,
}

/// A foreign key that resolved to nothing; the step it guarded was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingReference {
    pub kind: ReferenceKind,
    pub id: String,
}

/// An applied key result increment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyResultChange {
    pub objective_id: String,
    pub key_result_id: String,
    /// Amount actually added after clamping
    pub delta: f64,
    pub current: f64,
}

/// Summary of one propagation or recalculation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropagationReport {
    /// Work entries applied, in order
    pub work_entries: Vec<String>,
    /// Work entries already recorded on their task and not re-applied
    pub replayed: Vec<String>,
    pub tasks_completed: Vec<String>,
    pub key_results: Vec<KeyResultChange>,
    pub objectives_updated: Vec<String>,
    pub kpis_updated: Vec<String>,
    pub projects_updated: Vec<String>,
    pub missing: Vec<MissingReference>,
}

impl PropagationReport {
    /// True when nothing was written
    pub fn is_noop(&self) -> bool {
        self.tasks_completed.is_empty()
            && self.key_results.is_empty()
            && self.objectives_updated.is_empty()
            && self.kpis_updated.is_empty()
            && self.projects_updated.is_empty()
    }

    pub(crate) fn missing(&mut self, kind: ReferenceKind, id: &str) {
        tracing::debug!(kind = ?kind, id, "Reference not found, step skipped");
        let reference = MissingReference {
            kind,
            id: id.to_string(),
        };
        if !self.missing.contains(&reference) {
            self.missing.push(reference);
        }
    }

    pub(crate) fn objective_updated(&mut self, id: &str) {
        push_unique(&mut self.objectives_updated, id);
    }

    pub(crate) fn kpi_updated(&mut self, id: &str) {
        push_unique(&mut self.kpis_updated, id);
    }

    pub(crate) fn project_updated(&mut self, id: &str) {
        push_unique(&mut self.projects_updated, id);
    }

    pub(crate) fn task_completed(&mut self, id: &str) {
        push_unique(&mut self.tasks_completed, id);
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}
