//! Performance-management domain models
//!
//! Every entity lives in its own store collection and references other
//! entities through plain identifier fields:
//! - `WorkEntry` - a unit of logged effort, the only propagation trigger
//! - `Task` - planned work, machine-suggested or user-created
//! - `Objective` - a goal with embedded `KeyResult`s, optionally feeding a KPI
//! - `Kpi` - a top-level metric fed by weighted Objective contributions
//! - `Project` - rolls up the completion ratio of its Tasks

pub mod duration;

pub use duration::parse_duration_minutes;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record stored as one element of a whole-collection JSON array
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Store key holding the collection
    const COLLECTION: &'static str;

    /// Stable identifier used for cross references
    fn id(&self) -> &str;
}

/// A unit of logged effort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEntry {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_result_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Logged duration in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,

    /// Free-text duration ("2h 30m"), consulted when `duration_minutes` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(default)]
    pub status: WorkEntryStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default = "utc_now")]
    pub created_at: DateTime<Utc>,
}

impl Entity for WorkEntry {
    const COLLECTION: &'static str = "work_entries";

    fn id(&self) -> &str {
        &self.id
    }
}

impl WorkEntry {
    /// Create a new, not yet completed work entry with a generated id
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            task_id: None,
            key_result_id: None,
            objective_id: None,
            project_id: None,
            duration_minutes: None,
            duration: None,
            status: WorkEntryStatus::InProgress,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_key_result(mut self, key_result_id: impl Into<String>) -> Self {
        self.key_result_id = Some(key_result_id.into());
        self
    }

    pub fn with_objective(mut self, objective_id: impl Into<String>) -> Self {
        self.objective_id = Some(objective_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_duration_text(mut self, text: impl Into<String>) -> Self {
        self.duration = Some(text.into());
        self
    }

    /// Duration in minutes, falling back to the free-text field
    pub fn effective_minutes(&self) -> Option<u32> {
        self.duration_minutes
            .or_else(|| self.duration.as_deref().and_then(parse_duration_minutes))
    }

    /// Key result units earned by this entry: one per started hour, at least one
    pub fn key_result_increment(&self) -> f64 {
        match self.effective_minutes() {
            Some(minutes) => f64::from(minutes.div_ceil(60).max(1)),
            None => 1.0,
        }
    }

    /// Mark the entry completed, keeping the first completion timestamp
    pub fn mark_completed(&mut self) {
        self.status = WorkEntryStatus::Completed;
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == WorkEntryStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WorkEntryStatus {
    #[default]
    InProgress,
    Completed,
}

/// A unit of planned work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub status: TaskStatus,

    /// Who created the task
    #[serde(default)]
    pub source: TaskSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_result_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Work entries that completed this task, in arrival order
    #[serde(default)]
    pub work_entry_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default = "utc_now")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for Task {
    const COLLECTION: &'static str = "tasks";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Task {
    pub fn new(title: impl Into<String>, source: TaskSource) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            status: TaskStatus::Pending,
            source,
            key_result_id: None,
            objective_id: None,
            project_id: None,
            work_entry_ids: Vec::new(),
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Whether `entry_id` already completed this task
    pub fn was_completed_by(&self, entry_id: &str) -> bool {
        self.work_entry_ids.iter().any(|id| id == entry_id)
    }

    /// Record a completing work entry. Status only ever moves forward.
    pub fn complete_with(&mut self, entry_id: &str) {
        let now = Utc::now();
        if !self.is_completed() {
            self.status = TaskStatus::Completed;
            self.completed_at = Some(now);
        }
        if !self.was_completed_by(entry_id) {
            self.work_entry_ids.push(entry_id.to_string());
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Accepted,
    Completed,
}

/// Provenance of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Suggested by the recommendation generators
    Ai,
    /// Created by the user
    #[default]
    Manual,
}

/// A measurable sub-target embedded in an objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResult {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub current: f64,

    pub target: f64,

    #[serde(default = "default_unit")]
    pub unit: String,
}

impl KeyResult {
    pub fn new(title: impl Into<String>, target: f64, unit: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            current: 0.0,
            target,
            unit: unit.into(),
        }
    }

    /// Progress as a percentage in `0..=100`; zero when the target is not positive
    pub fn progress_percent(&self) -> f64 {
        if self.target <= 0.0 {
            return 0.0;
        }
        (self.current / self.target * 100.0).clamp(0.0, 100.0)
    }

    /// Add `amount` to `current`, clamped to `0..=target`. Returns the applied delta.
    pub fn increment(&mut self, amount: f64) -> f64 {
        let before = self.current;
        let ceiling = self.target.max(0.0);
        self.current = (self.current + amount).clamp(0.0, ceiling);
        self.current - before
    }

    pub fn is_complete(&self) -> bool {
        self.target > 0.0 && self.current >= self.target
    }
}

/// A goal decomposed into key results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub status: ObjectiveStatus,

    /// Derived progress percentage
    #[serde(default)]
    pub progress: f64,

    #[serde(default)]
    pub key_results: Vec<KeyResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpi_id: Option<String>,

    /// Percentage weight (0-100) this objective carries toward its KPI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpi_contribution: Option<f64>,

    #[serde(default = "utc_now")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for Objective {
    const COLLECTION: &'static str = "objectives";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Objective {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            status: ObjectiveStatus::Behind,
            progress: 0.0,
            key_results: Vec::new(),
            kpi_id: None,
            kpi_contribution: None,
            updated_at: Utc::now(),
        }
    }

    pub fn add_key_result(&mut self, kr: KeyResult) {
        self.key_results.push(kr);
        self.updated_at = Utc::now();
    }

    /// Link this objective to a KPI with the given contribution weight
    pub fn link_kpi(&mut self, kpi_id: impl Into<String>, contribution: f64) {
        self.kpi_id = Some(kpi_id.into());
        self.kpi_contribution = Some(contribution);
        self.updated_at = Utc::now();
    }

    pub fn key_result(&self, kr_id: &str) -> Option<&KeyResult> {
        self.key_results.iter().find(|kr| kr.id == kr_id)
    }

    pub fn key_result_mut(&mut self, kr_id: &str) -> Option<&mut KeyResult> {
        self.key_results.iter_mut().find(|kr| kr.id == kr_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectiveStatus {
    #[default]
    Behind,
    AtRisk,
    OnTrack,
    Completed,
}

/// Numeric side of a KPI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiMetric {
    #[serde(default)]
    pub current: f64,

    pub target: f64,

    #[serde(default)]
    pub unit: String,
}

/// A top-level metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub metric: KpiMetric,

    #[serde(default)]
    pub progress: f64,

    #[serde(default)]
    pub status: KpiStatus,

    #[serde(default = "utc_now")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for Kpi {
    const COLLECTION: &'static str = "kpis";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Kpi {
    pub fn new(name: impl Into<String>, target: f64, unit: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            metric: KpiMetric {
                current: 0.0,
                target,
                unit: unit.into(),
            },
            progress: 0.0,
            status: KpiStatus::Behind,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KpiStatus {
    #[default]
    Behind,
    AtRisk,
    OnTrack,
    Achieved,
}

/// A body of work whose progress is the completion ratio of its tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub progress: f64,

    #[serde(default)]
    pub status: ProjectStatus,

    #[serde(default = "utc_now")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for Project {
    const COLLECTION: &'static str = "projects";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            progress: 0.0,
            status: ProjectStatus::Planning,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    OnHold,
    Completed,
}

fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

fn default_unit() -> String {
    "%".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_rounds_up_started_hours() {
        assert_eq!(WorkEntry::new("a").with_minutes(120).key_result_increment(), 2.0);
        assert_eq!(WorkEntry::new("b").with_minutes(61).key_result_increment(), 2.0);
        assert_eq!(WorkEntry::new("c").with_minutes(15).key_result_increment(), 1.0);
        assert_eq!(WorkEntry::new("d").with_minutes(0).key_result_increment(), 1.0);
        assert_eq!(WorkEntry::new("e").key_result_increment(), 1.0);
    }

    #[test]
    fn test_increment_uses_free_text_duration() {
        let entry = WorkEntry::new("deep work").with_duration_text("2h 30m");
        assert_eq!(entry.effective_minutes(), Some(150));
        assert_eq!(entry.key_result_increment(), 3.0);

        // explicit minutes win over text
        let entry = entry.with_minutes(30);
        assert_eq!(entry.key_result_increment(), 1.0);
    }

    #[test]
    fn test_key_result_clamps_to_target() {
        let mut kr = KeyResult::new("Ship", 10.0, "features");
        kr.current = 9.0;
        let applied = kr.increment(5.0);
        assert_eq!(kr.current, 10.0);
        assert_eq!(applied, 1.0);
        assert!(kr.is_complete());
        assert_eq!(kr.progress_percent(), 100.0);
    }

    #[test]
    fn test_key_result_zero_target() {
        let mut kr = KeyResult::new("Broken", 0.0, "%");
        assert_eq!(kr.progress_percent(), 0.0);
        kr.increment(3.0);
        assert_eq!(kr.current, 0.0);
        assert!(!kr.is_complete());
    }

    #[test]
    fn test_task_completion_is_monotonic_and_deduplicated() {
        let mut task = Task::new("Write docs", TaskSource::Manual);
        task.complete_with("we-1");
        task.complete_with("we-1");
        task.complete_with("we-2");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.work_entry_ids, vec!["we-1", "we-2"]);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let mut objective = Objective::new("Grow");
        objective.link_kpi("kpi-1", 40.0);
        objective.status = ObjectiveStatus::AtRisk;
        let json = serde_json::to_value(&objective).unwrap();
        assert_eq!(json["kpiId"], "kpi-1");
        assert_eq!(json["kpiContribution"], 40.0);
        assert_eq!(json["status"], "at-risk");
        assert!(json.get("keyResults").is_some());
    }

    #[test]
    fn test_missing_optional_fields_deserialize() {
        let task: Task = serde_json::from_str(r#"{"id":"t1","status":"accepted"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Accepted);
        assert_eq!(task.source, TaskSource::Manual);
        assert!(task.work_entry_ids.is_empty());

        let kpi: Kpi =
            serde_json::from_str(r#"{"id":"k1","metric":{"target":1000}}"#).unwrap();
        assert_eq!(kpi.metric.current, 0.0);
        assert_eq!(kpi.status, KpiStatus::Behind);
    }
}
