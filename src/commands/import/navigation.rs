use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::candidates::EntityCandidate;
use super::resolve::{DepartmentIds, FacultyIds};
use crate::model::{NavigationLevelCounts, NavigationOutcome, NavigationReport, NodeOutcome};
use crate::store::{CatalogStore, Record, RecordId, StoredRecord, Table};
use crate::util::slugify;

pub const FACULTY_PATH_PREFIX: &str = "/faculty/";
pub const DEPARTMENT_PATH_PREFIX: &str = "/department/";

pub fn faculty_nav_path(name: &str) -> String {
    format!("{FACULTY_PATH_PREFIX}{}", slugify(name))
}

pub fn department_nav_path(name: &str) -> String {
    format!("{DEPARTMENT_PATH_PREFIX}{}", slugify(name))
}

/// Best-effort projection of the catalog into navigation entries.
///
/// Only candidates present in the resolved id maps get an entry. Faculty
/// entries hang under the anchor (first node whose title contains
/// `anchor_term`), department entries under their faculty's entry. An entry
/// whose parent cannot be found is skipped, never treated as an error.
/// Store failures end the sync and are reported in the outcome only.
pub fn sync_navigation<S: CatalogStore>(
    store: &mut S,
    faculties: &[EntityCandidate],
    faculty_ids: &FacultyIds,
    departments: &[EntityCandidate],
    department_ids: &DepartmentIds,
    anchor_term: &str,
) -> NavigationReport {
    let mut report = NavigationReport::with_outcome(NavigationOutcome::Synced);

    let faculties = faculties
        .iter()
        .filter(|candidate| faculty_ids.get(&candidate.natural_key).is_some())
        .collect::<Vec<_>>();
    let departments = departments
        .iter()
        .filter(|candidate| department_ids.get(&candidate.natural_key).is_some())
        .collect::<Vec<_>>();

    if let Err(err) = sync_into(store, &faculties, &departments, anchor_term, &mut report) {
        warn!(error = %err, "navigation sync failed");
        report.outcome = NavigationOutcome::Failed(format!("{err:#}"));
        return report;
    }

    info!(
        outcome = ?report.outcome,
        faculties_created = report.faculties.created,
        faculties_present = report.faculties.already_present,
        departments_created = report.departments.created,
        departments_present = report.departments.already_present,
        departments_orphaned = report.departments.skipped_missing_parent,
        "navigation sync finished"
    );

    report
}

fn sync_into<S: CatalogStore>(
    store: &mut S,
    faculties: &[&EntityCandidate],
    departments: &[&EntityCandidate],
    anchor_term: &str,
    report: &mut NavigationReport,
) -> Result<()> {
    let Some(anchor) = store
        .find_by_title_like(Table::NavigationNodes, anchor_term)
        .context("anchor lookup failed")?
    else {
        warn!(anchor_term, "no navigation anchor found, skipping navigation sync");
        report.outcome = NavigationOutcome::SkippedMissingAnchor;
        return Ok(());
    };
    report.anchor_id = Some(anchor.id);

    let faculty_paths = faculties
        .iter()
        .map(|candidate| (*candidate, faculty_nav_path(&candidate.display_name)))
        .collect::<Vec<_>>();
    let department_paths = departments
        .iter()
        .map(|candidate| (*candidate, department_nav_path(&candidate.display_name)))
        .collect::<Vec<_>>();

    let lookup = faculty_paths
        .iter()
        .chain(department_paths.iter())
        .map(|(_, path)| Value::from(path.as_str()))
        .collect::<Vec<_>>();
    let mut taken_paths = store
        .find_by_keys(Table::NavigationNodes, "path", &lookup)
        .context("failed to read existing navigation paths")?
        .iter()
        .filter_map(|record| record.text("path").map(ToOwned::to_owned))
        .collect::<HashSet<_>>();

    let anchor_children = store
        .find_by_keys(Table::NavigationNodes, "parent_id", &[Value::from(anchor.id)])
        .context("failed to read navigation entries under the anchor")?;
    let mut position = last_position(&anchor_children);

    let mut records = Vec::new();
    for (candidate, path) in &faculty_paths {
        if !taken_paths.insert(path.clone()) {
            report.faculties.record(NodeOutcome::AlreadyExists);
            continue;
        }
        position += 1;
        records.push(nav_record(&candidate.display_name, path, anchor.id, position));
    }
    insert_nodes(store, &records, &mut report.faculties).context("faculty navigation insert failed")?;

    // Second read: faculty entries created above only get identifiers now.
    let faculty_nodes = store
        .find_by_keys(Table::NavigationNodes, "parent_id", &[Value::from(anchor.id)])
        .context("failed to read navigation entries under the anchor")?
        .into_iter()
        .filter_map(|record| record.text("path").map(|path| (path.to_string(), record.id)))
        .collect::<HashMap<String, RecordId>>();

    let faculty_by_key = faculties
        .iter()
        .map(|candidate| (candidate.natural_key.as_str(), *candidate))
        .collect::<HashMap<_, _>>();

    let parent_ids = faculty_nodes.values().copied().map(Value::from).collect::<Vec<_>>();
    let mut positions: HashMap<RecordId, i64> = HashMap::new();
    for child in store
        .find_by_keys(Table::NavigationNodes, "parent_id", &parent_ids)
        .context("failed to read navigation entries under faculty entries")?
    {
        if let Some(parent_id) = child.integer("parent_id") {
            let last = positions.entry(parent_id).or_insert(0);
            *last = (*last).max(child.integer("position").unwrap_or_default());
        }
    }

    let mut records = Vec::new();
    for (candidate, path) in &department_paths {
        let parent_id = candidate
            .parent_key
            .as_deref()
            .and_then(|key| faculty_by_key.get(key))
            .and_then(|faculty| faculty_nodes.get(&faculty_nav_path(&faculty.display_name)))
            .copied();
        let Some(parent_id) = parent_id else {
            report.departments.record(NodeOutcome::SkippedMissingParent);
            continue;
        };
        if !taken_paths.insert(path.clone()) {
            report.departments.record(NodeOutcome::AlreadyExists);
            continue;
        }

        let position = positions.entry(parent_id).or_insert(0);
        *position += 1;
        records.push(nav_record(&candidate.display_name, path, parent_id, *position));
    }
    insert_nodes(store, &records, &mut report.departments)
        .context("department navigation insert failed")?;

    Ok(())
}

fn insert_nodes<S: CatalogStore>(
    store: &mut S,
    records: &[Record],
    counts: &mut NavigationLevelCounts,
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let inserted = store.insert_many(Table::NavigationNodes, records)?;
    for _ in 0..inserted.len() {
        counts.record(NodeOutcome::Created);
    }
    for _ in inserted.len()..records.len() {
        counts.record(NodeOutcome::AlreadyExists);
    }

    Ok(())
}

fn last_position(children: &[StoredRecord]) -> i64 {
    children
        .iter()
        .filter_map(|child| child.integer("position"))
        .max()
        .unwrap_or(0)
}

fn nav_record(title: &str, path: &str, parent_id: RecordId, position: i64) -> Record {
    let mut record = Record::new();
    record.insert("title".to_string(), json!(title));
    record.insert("path".to_string(), json!(path));
    record.insert("parent_id".to_string(), json!(parent_id));
    record.insert("position".to_string(), json!(position));
    record
}
