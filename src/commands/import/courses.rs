use std::collections::HashSet;

use serde_json::{Value, json};
use tracing::{info, warn};

use super::candidates::CourseCandidate;
use super::resolve::DepartmentIds;
use crate::model::EntityTally;
use crate::store::{CatalogStore, Record, Table};
use crate::util::slugify;

pub const DEFAULT_CHUNK_SIZE: usize = 50;

pub fn course_slug(name: &str, code: &str) -> String {
    slugify(&format!("{name} {code}"))
}

/// Writes new courses in bounded chunks. One chunk failing never stops the
/// next one. `on_chunk` receives (processed, total) after every chunk,
/// where total counts only courses not already in the store.
///
/// Courses another writer inserted between the existence check and the
/// insert are already present: they count in neither `success` nor
/// `failed` and are reported through `warnings` instead.
pub fn write_courses<S: CatalogStore>(
    store: &mut S,
    candidates: &[CourseCandidate],
    departments: &DepartmentIds,
    chunk_size: usize,
    warnings: &mut Vec<String>,
    on_chunk: &mut dyn FnMut(usize, usize),
) -> EntityTally {
    let mut tally = EntityTally::default();
    if candidates.is_empty() {
        return tally;
    }

    let codes = candidates
        .iter()
        .map(|candidate| Value::from(candidate.code.as_str()))
        .collect::<Vec<_>>();
    let existing = match store.find_by_keys(Table::Courses, "code", &codes) {
        Ok(records) => records
            .iter()
            .filter_map(|record| record.text("code").map(ToOwned::to_owned))
            .collect::<HashSet<_>>(),
        Err(err) => {
            warn!(error = %err, "course existence check failed");
            tally.record_failure(
                candidates.len(),
                format!("failed to look up existing courses: {err:#}"),
            );
            return tally;
        }
    };

    let remaining = candidates
        .iter()
        .filter(|candidate| !existing.contains(&candidate.code))
        .collect::<Vec<_>>();
    let total = remaining.len();
    let chunk_size = chunk_size.max(1);

    info!(
        candidates = candidates.len(),
        existing = existing.len(),
        to_create = total,
        chunk_size,
        "writing courses"
    );

    let mut processed = 0;
    for (chunk_index, chunk) in remaining.chunks(chunk_size).enumerate() {
        let first = chunk_index * chunk_size + 1;
        let last = first + chunk.len() - 1;

        let mut orphans = Vec::new();
        let mut records = Vec::with_capacity(chunk.len());
        for candidate in chunk {
            match departments.get(&candidate.department_key) {
                Some(department_id) => records.push(course_record(candidate, department_id)),
                None => orphans.push(candidate.department_key.as_str()),
            }
        }

        if !orphans.is_empty() {
            let mut unresolved = orphans.clone();
            unresolved.sort_unstable();
            unresolved.dedup();
            tally.record_failure(
                orphans.len(),
                format!(
                    "courses {first}-{last}: {} course(s) reference unresolved departments: {}",
                    orphans.len(),
                    unresolved.join(", ")
                ),
            );
        }

        if !records.is_empty() {
            match store.insert_many(Table::Courses, &records) {
                Ok(inserted) => {
                    tally.success += inserted.len();
                    let skipped = records.len() - inserted.len();
                    if skipped > 0 {
                        warn!(first, last, skipped, "courses created concurrently, left as-is");
                        warnings.push(format!(
                            "courses {first}-{last}: {skipped} course(s) already present, \
                             written by another run"
                        ));
                    }
                }
                Err(err) => {
                    warn!(first, last, error = %err, "course chunk failed");
                    tally.record_failure(records.len(), format!("courses {first}-{last}: {err:#}"));
                }
            }
        }

        processed += chunk.len();
        on_chunk(processed, total);
    }

    tally
}

fn course_record(candidate: &CourseCandidate, department_id: i64) -> Record {
    let mut record = Record::new();
    record.insert("code".to_string(), json!(candidate.code));
    record.insert("name".to_string(), json!(candidate.name));
    record.insert(
        "slug".to_string(),
        json!(course_slug(&candidate.name, &candidate.code)),
    );
    record.insert("department_id".to_string(), json!(department_id));
    record.insert(
        "duration_months".to_string(),
        json!(candidate.duration_months),
    );
    record.insert("total_credits".to_string(), json!(candidate.total_credits));
    record.insert(
        "degree_level".to_string(),
        json!(candidate.degree_level.as_str()),
    );
    record
}
