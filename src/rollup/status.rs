//! Categorical status from continuous progress
//!
//! One fixed threshold table serves objectives and KPIs alike.

use crate::model::{KpiStatus, ObjectiveStatus};

/// Progress at or above which an objective is completed / a KPI achieved
pub const COMPLETE_THRESHOLD: f64 = 100.0;

/// Progress at or above which work is on track
pub const ON_TRACK_THRESHOLD: f64 = 70.0;

/// Progress at or above which work is at risk rather than behind
pub const AT_RISK_THRESHOLD: f64 = 40.0;

/// Threshold bucket of a progress percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProgressBand {
    Behind,
    AtRisk,
    OnTrack,
    Complete,
}

/// Bucket a progress percentage. Non-finite input is `Behind`.
pub fn derive_band(progress: f64) -> ProgressBand {
    if progress >= COMPLETE_THRESHOLD {
        ProgressBand::Complete
    } else if progress >= ON_TRACK_THRESHOLD {
        ProgressBand::OnTrack
    } else if progress >= AT_RISK_THRESHOLD {
        ProgressBand::AtRisk
    } else {
        ProgressBand::Behind
    }
}

impl From<ProgressBand> for ObjectiveStatus {
    fn from(band: ProgressBand) -> Self {
        match band {
            ProgressBand::Behind => ObjectiveStatus::Behind,
            ProgressBand::AtRisk => ObjectiveStatus::AtRisk,
            ProgressBand::OnTrack => ObjectiveStatus::OnTrack,
            ProgressBand::Complete => ObjectiveStatus::Completed,
        }
    }
}

impl From<ProgressBand> for KpiStatus {
    fn from(band: ProgressBand) -> Self {
        match band {
            ProgressBand::Behind => KpiStatus::Behind,
            ProgressBand::AtRisk => KpiStatus::AtRisk,
            ProgressBand::OnTrack => KpiStatus::OnTrack,
            ProgressBand::Complete => KpiStatus::Achieved,
        }
    }
}

pub fn objective_status(progress: f64) -> ObjectiveStatus {
    derive_band(progress).into()
}

pub fn kpi_status(progress: f64) -> KpiStatus {
    derive_band(progress).into()
}
