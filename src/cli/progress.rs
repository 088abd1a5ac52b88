//! Propagation and dashboard commands

use super::{CompleteArgs, ImportArgs, LogArgs, StatusArgs};
use crate::engine::{PropagationEngine, PropagationReport};
use crate::model::{Entity, Kpi, Objective, Project, Task, WorkEntry};
use crate::repository::{DashboardStats, LEGACY_SUGGESTED_TASKS_KEY, Repositories, Repository};
use crate::store::StoreExt;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use tokio::fs;

pub fn complete(engine: &PropagationEngine, args: CompleteArgs) -> Result<()> {
    let report = engine
        .complete_work_entry(&args.id)?
        .with_context(|| format!("Work entry not found: {}", args.id))?;
    print_report(&report);
    Ok(())
}

pub fn log(engine: &PropagationEngine, args: LogArgs) -> Result<()> {
    let mut entry = WorkEntry::new(args.title);
    if let Some(minutes) = args.minutes {
        entry = entry.with_minutes(minutes);
    }
    if let Some(text) = args.duration {
        if crate::model::parse_duration_minutes(&text).is_none() {
            tracing::warn!(duration = %text, "Duration not understood, counting as one unit");
        }
        entry = entry.with_duration_text(text);
    }
    if let Some(id) = args.task {
        entry = entry.with_task(id);
    }
    if let Some(id) = args.key_result {
        entry = entry.with_key_result(id);
    }
    if let Some(id) = args.objective {
        entry = entry.with_objective(id);
    }
    if let Some(id) = args.project {
        entry = entry.with_project(id);
    }

    println!("Work entry {}", entry.id);
    let report = engine.record_work_entry(entry)?;
    print_report(&report);
    Ok(())
}

pub fn recalc(engine: &PropagationEngine) -> Result<()> {
    let report = engine.recalculate_all_progress()?;
    print_report(&report);
    Ok(())
}

pub fn status(engine: &PropagationEngine, args: StatusArgs) -> Result<()> {
    let stats = engine.repositories().stats()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

pub async fn import(engine: &PropagationEngine, args: ImportArgs) -> Result<()> {
    let content = fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;

    let imported = import_collections(engine.repositories(), document)?;
    for (collection, count) in &imported {
        println!("Imported {} {}", count, collection);
    }

    if args.recalc {
        recalc(engine)?;
    }
    Ok(())
}

pub fn migrate_tasks(engine: &PropagationEngine) -> Result<()> {
    let moved = engine.repositories().migrate_legacy_tasks()?;
    println!("Migrated {} suggested task(s)", moved);
    Ok(())
}

/// Validate and write every collection in `document`.
///
/// All collections are decoded before anything is written, so a bad file
/// leaves the store untouched.
pub fn import_collections(repos: &Repositories, document: Value) -> Result<Vec<(String, usize)>> {
    let Value::Object(map) = document else {
        anyhow::bail!("Import file must be a JSON object keyed by collection name");
    };

    let mut pending: Vec<Box<dyn FnOnce() -> Result<(String, usize)> + '_>> = Vec::new();
    for (collection, value) in map {
        match collection.as_str() {
            WorkEntry::COLLECTION => pending.push(staged(&repos.work_entries, value)?),
            Task::COLLECTION => pending.push(staged(&repos.tasks, value)?),
            Objective::COLLECTION => pending.push(staged(&repos.objectives, value)?),
            Kpi::COLLECTION => pending.push(staged(&repos.kpis, value)?),
            Project::COLLECTION => pending.push(staged(&repos.projects, value)?),
            LEGACY_SUGGESTED_TASKS_KEY => {
                let tasks: Vec<Task> = decode(LEGACY_SUGGESTED_TASKS_KEY, value)?;
                let store = repos.store().clone();
                pending.push(Box::new(move || {
                    store.set(LEGACY_SUGGESTED_TASKS_KEY, &tasks)?;
                    Ok((LEGACY_SUGGESTED_TASKS_KEY.to_string(), tasks.len()))
                }));
            }
            _ => anyhow::bail!("Unknown collection in import file: {}", collection),
        }
    }

    pending.into_iter().map(|write| write()).collect()
}

fn staged<'a, T: Entity + 'a>(
    repo: &'a Repository<T>,
    value: Value,
) -> Result<Box<dyn FnOnce() -> Result<(String, usize)> + 'a>> {
    let records: Vec<T> = decode(T::COLLECTION, value)?;
    Ok(Box::new(move || {
        repo.save_all(&records)?;
        Ok((T::COLLECTION.to_string(), records.len()))
    }))
}

fn decode<T: serde::de::DeserializeOwned>(collection: &str, value: Value) -> Result<Vec<T>> {
    serde_json::from_value(value).with_context(|| format!("Invalid records in '{}'", collection))
}

fn print_report(report: &PropagationReport) {
    if !report.replayed.is_empty() {
        println!("Already applied: {}", report.replayed.join(", "));
    }
    for task in &report.tasks_completed {
        println!("Task {} completed", task);
    }
    for change in &report.key_results {
        println!(
            "Key result {} +{} -> {}",
            change.key_result_id, change.delta, change.current
        );
    }
    for objective in &report.objectives_updated {
        println!("Objective {} updated", objective);
    }
    for kpi in &report.kpis_updated {
        println!("KPI {} updated", kpi);
    }
    for project in &report.projects_updated {
        println!("Project {} updated", project);
    }
    for missing in &report.missing {
        println!("Skipped: {:?} {} not found", missing.kind, missing.id);
    }
    if report.is_noop() {
        println!("Nothing changed");
    }
}

fn print_stats(stats: &DashboardStats) {
    println!("Objectives:   {}", stats.total_objectives);
    print_counts(&stats.objective_status_counts);
    println!("KPIs:         {}", stats.total_kpis);
    print_counts(&stats.kpi_status_counts);
    println!("Projects:     {}", stats.total_projects);
    print_counts(&stats.project_status_counts);
    println!("Tasks:        {}", stats.total_tasks);
    print_counts(&stats.task_status_counts);
    println!("Work entries: {}", stats.total_work_entries);
}

fn print_counts<K: Debug>(counts: &HashMap<K, usize>) {
    let mut lines: Vec<(String, usize)> = counts
        .iter()
        .map(|(status, count)| (format!("{:?}", status), *count))
        .collect();
    lines.sort();
    for (status, count) in lines {
        println!("  {:<12} {}", status, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use serde_json::json;
    use std::sync::Arc;

    fn repos() -> Repositories {
        Repositories::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_import_writes_known_collections() {
        let repos = repos();
        let document = json!({
            "kpis": [{
                "id": "k1",
                "name": "Revenue",
                "metric": { "current": 0.0, "target": 1000.0, "unit": "USD" }
            }],
            "objectives": [{
                "id": "o1",
                "title": "Grow",
                "keyResults": [{ "id": "kr1", "title": "Deals", "current": 0.0, "target": 5.0, "unit": "deals" }],
                "kpiId": "k1",
                "kpiContribution": 50.0
            }]
        });

        let mut imported = import_collections(&repos, document).unwrap();
        imported.sort();
        assert_eq!(
            imported,
            vec![("kpis".to_string(), 1), ("objectives".to_string(), 1)]
        );
        let objective = repos.objectives.get("o1").unwrap().unwrap();
        assert_eq!(objective.kpi_id.as_deref(), Some("k1"));
        assert_eq!(objective.key_results.len(), 1);
    }

    #[test]
    fn test_import_rejects_bad_file_without_writing() {
        let repos = repos();
        let document = json!({
            "projects": [{ "id": "p1", "name": "Launch" }],
            "tasks": [{ "title": "missing id" }]
        });
        assert!(import_collections(&repos, document).is_err());
        assert!(repos.store().keys().unwrap().is_empty());

        assert!(import_collections(&repos, json!({ "widgets": [] })).is_err());
        assert!(import_collections(&repos, json!([])).is_err());
    }

    #[test]
    fn test_import_legacy_tasks_then_migrate() {
        let repos = repos();
        let document = json!({
            "suggested_tasks": [{ "id": "s1", "title": "Call back" }]
        });
        import_collections(&repos, document).unwrap();
        assert_eq!(repos.migrate_legacy_tasks().unwrap(), 1);
        let task = repos.tasks.get("s1").unwrap().unwrap();
        assert_eq!(task.source, crate::model::TaskSource::Ai);
    }
}
