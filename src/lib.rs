//! perfdash - progress propagation for KPI/OKR performance dashboards
//!
//! Keeps derived progress consistent when work is logged: a completed work
//! entry completes its task, advances a key result, and re-derives the owning
//! objective, the KPI it feeds and the project the task belongs to.

pub mod cli;
pub mod config;
pub mod engine;
pub mod model;
pub mod repository;
pub mod rollup;
pub mod store;

pub use engine::{EngineOptions, PropagationEngine, PropagationReport, WriteMode};
pub use repository::{DashboardStats, Repositories, Repository};
pub use store::{FileStore, MemoryStore, Store, StoreError, StoreExt};
