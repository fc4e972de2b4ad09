use std::collections::HashMap;

use serde_json::{Value, json};
use tracing::{info, warn};

use super::candidates::EntityCandidate;
use crate::model::EntityTally;
use crate::store::{CatalogStore, Record, RecordId, StoredRecord, Table};

/// Faculty natural key to store identifier.
#[derive(Debug, Clone, Default)]
pub struct FacultyIds(HashMap<String, RecordId>);

/// Department natural key to store identifier. Only obtainable from
/// `resolve_departments`, which in turn needs a resolved `FacultyIds`.
#[derive(Debug, Clone, Default)]
pub struct DepartmentIds(HashMap<String, RecordId>);

impl FacultyIds {
    pub fn get(&self, key: &str) -> Option<RecordId> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl DepartmentIds {
    pub fn get(&self, key: &str) -> Option<RecordId> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

pub fn resolve_faculties<S: CatalogStore>(
    store: &mut S,
    candidates: &[EntityCandidate],
) -> (FacultyIds, EntityTally) {
    let (ids, tally) = resolve_level(store, Table::Faculties, candidates, |candidate| {
        let mut record = Record::new();
        record.insert("code".to_string(), json!(candidate.natural_key));
        record.insert("name".to_string(), json!(candidate.display_name));
        Ok(record)
    });

    (FacultyIds(ids), tally)
}

pub fn resolve_departments<S: CatalogStore>(
    store: &mut S,
    candidates: &[EntityCandidate],
    faculties: &FacultyIds,
) -> (DepartmentIds, EntityTally) {
    let (ids, tally) = resolve_level(store, Table::Departments, candidates, |candidate| {
        let parent_key = candidate.parent_key.as_deref().unwrap_or_default();
        let Some(faculty_id) = faculties.get(parent_key) else {
            return Err(format!(
                "department {}: faculty {parent_key:?} was not resolved",
                candidate.natural_key
            ));
        };

        let mut record = Record::new();
        record.insert("code".to_string(), json!(candidate.natural_key));
        record.insert("name".to_string(), json!(candidate.display_name));
        record.insert("faculty_id".to_string(), json!(faculty_id));
        Ok(record)
    });

    (DepartmentIds(ids), tally)
}

/// Batched existence check followed by one bulk insert of whatever is new.
/// A failed insert leaves the map holding only the pre-existing records.
fn resolve_level<S, F>(
    store: &mut S,
    table: Table,
    candidates: &[EntityCandidate],
    build_record: F,
) -> (HashMap<String, RecordId>, EntityTally)
where
    S: CatalogStore,
    F: Fn(&EntityCandidate) -> Result<Record, String>,
{
    let label = table.as_str();
    let mut ids = HashMap::with_capacity(candidates.len());
    let mut tally = EntityTally::default();

    if candidates.is_empty() {
        return (ids, tally);
    }

    let keys = candidates
        .iter()
        .map(|candidate| Value::from(candidate.natural_key.as_str()))
        .collect::<Vec<_>>();
    let existing = match store.find_by_keys(table, "code", &keys) {
        Ok(records) => records,
        Err(err) => {
            warn!(table = label, error = %err, "existence check failed");
            tally.record_failure(
                candidates.len(),
                format!("failed to look up existing {label}: {err:#}"),
            );
            return (ids, tally);
        }
    };
    merge_ids(&mut ids, &existing);

    let mut pending = Vec::new();
    let mut records = Vec::new();
    for candidate in candidates
        .iter()
        .filter(|candidate| !ids.contains_key(&candidate.natural_key))
    {
        match build_record(candidate) {
            Ok(record) => {
                pending.push(candidate.natural_key.as_str());
                records.push(record);
            }
            Err(message) => tally.record_failure(1, message),
        }
    }

    info!(
        table = label,
        candidates = candidates.len(),
        existing = ids.len(),
        to_create = records.len(),
        "resolving level"
    );

    if records.is_empty() {
        return (ids, tally);
    }

    match store.insert_many(table, &records) {
        Ok(inserted) => {
            tally.success += inserted.len();
            merge_ids(&mut ids, &inserted);
        }
        Err(err) => {
            warn!(table = label, count = records.len(), error = %err, "bulk insert failed");
            tally.record_failure(
                records.len(),
                format!("failed to create {} {label}: {err:#}", records.len()),
            );
            return (ids, tally);
        }
    }

    // Rows skipped by the conflict clause were written by someone else
    // between our lookup and our insert; pick up their identifiers.
    let raced = pending
        .iter()
        .filter(|key| !ids.contains_key(**key))
        .map(|key| Value::from(*key))
        .collect::<Vec<_>>();
    if !raced.is_empty() {
        warn!(table = label, count = raced.len(), "natural keys created concurrently");
        match store.find_by_keys(table, "code", &raced) {
            Ok(records) => merge_ids(&mut ids, &records),
            Err(err) => warn!(table = label, error = %err, "follow-up lookup failed"),
        }

        let unresolved = pending
            .iter()
            .filter(|key| !ids.contains_key(**key))
            .copied()
            .collect::<Vec<_>>();
        if !unresolved.is_empty() {
            tally.record_failure(
                unresolved.len(),
                format!("{label} not created and not found: {}", unresolved.join(", ")),
            );
        }
    }

    (ids, tally)
}

fn merge_ids(ids: &mut HashMap<String, RecordId>, records: &[StoredRecord]) {
    for record in records {
        if let Some(code) = record.text("code") {
            ids.insert(code.to_string(), record.id);
        }
    }
}
