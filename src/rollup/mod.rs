//! Contribution aggregation
//!
//! Pure functions turning leaf values into derived progress:
//! - objective progress is the unweighted mean of its key results
//! - KPI value is the contribution-weighted average of its linked objectives
//! - project progress is the completion ratio of its tasks

pub mod status;

pub use status::{ProgressBand, derive_band, kpi_status, objective_status};

use crate::model::{Objective, ProjectStatus, Task};

/// Mean key result progress in `0..=100`, or `None` for an objective without key results
pub fn objective_progress(objective: &Objective) -> Option<f64> {
    if objective.key_results.is_empty() {
        return None;
    }
    let total: f64 = objective
        .key_results
        .iter()
        .map(|kr| kr.progress_percent())
        .sum();
    Some(total / objective.key_results.len() as f64)
}

/// Progress percentage of a KPI value against its target, in `0..=100`
pub fn kpi_progress(current: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    (current / target * 100.0).clamp(0.0, 100.0)
}

/// Outcome of aggregating objective contributions into one KPI
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpiRollup {
    /// Σ objective progress × weight / 100
    pub weighted_progress: f64,
    /// Σ weight
    pub total_contribution: f64,
    /// Weighted average progress as a fraction of the target
    pub progress_rate: f64,
    /// New KPI value, rounded to a whole unit
    pub current: f64,
    /// New KPI progress percentage
    pub progress: f64,
}

/// Aggregate `(objective progress %, contribution weight %)` pairs into a KPI value.
///
/// Weights are not required to sum to 100; the result is always normalised
/// by the total declared contribution. Negative weights count as zero.
pub fn kpi_rollup(target: f64, contributions: impl IntoIterator<Item = (f64, f64)>) -> KpiRollup {
    let (weighted_progress, total_contribution) = contributions.into_iter().fold(
        (0.0, 0.0),
        |(weighted, total), (progress, weight)| {
            let weight = weight.max(0.0);
            (weighted + progress * weight / 100.0, total + weight)
        },
    );

    let progress_rate = if total_contribution > 0.0 {
        weighted_progress / total_contribution
    } else {
        0.0
    };
    let current = if target > 0.0 {
        (target * progress_rate).round()
    } else {
        0.0
    };

    KpiRollup {
        weighted_progress,
        total_contribution,
        progress_rate,
        current,
        progress: kpi_progress(current, target),
    }
}

/// Completion counts of a project's tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskCompletion {
    pub completed: usize,
    pub total: usize,
}

impl TaskCompletion {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        tasks.into_iter().fold(Self::default(), |mut acc, task| {
            acc.total += 1;
            if task.is_completed() {
                acc.completed += 1;
            }
            acc
        })
    }

    /// Completion percentage; zero when there are no tasks
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

/// Project status after its progress changed to `progress`
pub fn project_status(current: ProjectStatus, progress: f64) -> ProjectStatus {
    if progress >= status::COMPLETE_THRESHOLD {
        return ProjectStatus::Completed;
    }
    match current {
        ProjectStatus::Completed => ProjectStatus::Active,
        ProjectStatus::Planning if progress > 0.0 => ProjectStatus::Active,
        other => other,
    }
}
