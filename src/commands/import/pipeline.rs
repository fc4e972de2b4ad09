use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use super::candidates::{
    DegreeLevelClassifier, build_course_candidates, dedup_departments, dedup_faculties,
};
use super::courses::{DEFAULT_CHUNK_SIZE, write_courses};
use super::navigation::sync_navigation;
use super::resolve::{resolve_departments, resolve_faculties};
use super::rows::parse_source;
use super::schema::validate_headers;
use crate::cli::InputFormat;
use crate::model::{ImportResult, NavigationReport};
use crate::store::CatalogStore;

pub const DEFAULT_ANCHOR_TERM: &str = "academic";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Parsing,
    Validating,
    ResolvingFaculties,
    ResolvingDepartments,
    WritingCourses,
    SyncingNavigation,
    Done,
}

impl ImportPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parsing => "parsing",
            Self::Validating => "validating",
            Self::ResolvingFaculties => "resolving_faculties",
            Self::ResolvingDepartments => "resolving_departments",
            Self::WritingCourses => "writing_courses",
            Self::SyncingNavigation => "syncing_navigation",
            Self::Done => "done",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Parsing => Some(Self::Validating),
            Self::Validating => Some(Self::ResolvingFaculties),
            Self::ResolvingFaculties => Some(Self::ResolvingDepartments),
            Self::ResolvingDepartments => Some(Self::WritingCourses),
            Self::WritingCourses => Some(Self::SyncingNavigation),
            Self::SyncingNavigation => Some(Self::Done),
            Self::Done => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub format: InputFormat,
    pub chunk_size: usize,
    pub anchor_term: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            format: InputFormat::Csv,
            chunk_size: DEFAULT_CHUNK_SIZE,
            anchor_term: DEFAULT_ANCHOR_TERM.to_string(),
        }
    }
}

/// Coarse progress snapshot. `processed`/`total` count courses and only
/// move during `WritingCourses`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportProgress {
    pub phase: ImportPhase,
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub result: ImportResult,
    pub navigation: NavigationReport,
    pub phases: Vec<ImportPhase>,
}

struct PhaseTracker<'a> {
    phase: ImportPhase,
    visited: Vec<ImportPhase>,
    started: Instant,
    progress: &'a mut dyn FnMut(&ImportProgress),
}

impl<'a> PhaseTracker<'a> {
    fn start(progress: &'a mut dyn FnMut(&ImportProgress)) -> Self {
        let mut tracker = Self {
            phase: ImportPhase::Parsing,
            visited: vec![ImportPhase::Parsing],
            started: Instant::now(),
            progress,
        };
        tracker.report(0, 0, None);
        tracker
    }

    fn advance(&mut self) {
        if let Some(next) = self.phase.next() {
            info!(from = self.phase.as_str(), to = next.as_str(), "import phase");
            self.phase = next;
            self.visited.push(next);
            self.report(0, 0, None);
        }
    }

    fn report(&mut self, processed: usize, total: usize, eta: Option<Duration>) {
        let snapshot = ImportProgress {
            phase: self.phase,
            processed,
            total,
            elapsed: self.started.elapsed(),
            eta,
        };
        (self.progress)(&snapshot);
    }
}

fn estimate_remaining(elapsed: Duration, processed: usize, total: usize) -> Option<Duration> {
    if processed == 0 || processed > total {
        return None;
    }
    Some(elapsed.mul_f64((total - processed) as f64 / processed as f64))
}

/// Runs one import end to end against `store`.
///
/// Only parse and header validation can fail the call; everything after
/// that is captured in the returned result, and navigation problems are
/// confined to `ImportOutcome::navigation`.
pub fn run_import<S: CatalogStore>(
    store: &mut S,
    data: &[u8],
    options: &ImportOptions,
    progress: &mut dyn FnMut(&ImportProgress),
) -> Result<ImportOutcome> {
    let mut tracker = PhaseTracker::start(progress);
    let mut result = ImportResult::default();

    let table = parse_source(data, options.format)?;
    info!(format = options.format.as_str(), rows = table.len(), "parsed import file");

    tracker.advance();
    let columns = validate_headers(table.headers())?;
    let rows = columns.rows(&table).collect::<Vec<_>>();
    let classifier = DegreeLevelClassifier::new()?;

    let faculty_candidates = dedup_faculties(&rows);
    let department_candidates = dedup_departments(&rows);
    let courses = build_course_candidates(&rows, &classifier);
    result.warnings.extend(courses.warnings);
    if !courses.rejected.is_empty() {
        result.courses.failed += courses.rejected.len();
        result.courses.errors.extend(courses.rejected);
    }

    tracker.advance();
    let (faculty_ids, faculty_tally) = resolve_faculties(store, &faculty_candidates);
    result.faculties = faculty_tally;
    info!(
        resolved = faculty_ids.len(),
        created = result.faculties.success,
        failed = result.faculties.failed,
        "faculties resolved"
    );

    tracker.advance();
    let (department_ids, department_tally) =
        resolve_departments(store, &department_candidates, &faculty_ids);
    result.departments = department_tally;
    info!(
        resolved = department_ids.len(),
        created = result.departments.success,
        failed = result.departments.failed,
        "departments resolved"
    );

    tracker.advance();
    let write_started = Instant::now();
    let course_tally = write_courses(
        store,
        &courses.candidates,
        &department_ids,
        options.chunk_size,
        &mut result.warnings,
        &mut |processed, total| {
            let eta = estimate_remaining(write_started.elapsed(), processed, total);
            tracker.report(processed, total, eta);
        },
    );
    result.courses.success += course_tally.success;
    result.courses.failed += course_tally.failed;
    result.courses.errors.extend(course_tally.errors);
    info!(
        created = result.courses.success,
        failed = result.courses.failed,
        "courses written"
    );

    tracker.advance();
    let navigation = sync_navigation(
        store,
        &faculty_candidates,
        &faculty_ids,
        &department_candidates,
        &department_ids,
        &options.anchor_term,
    );

    tracker.advance();
    result.elapsed_ms = u64::try_from(tracker.started.elapsed().as_millis()).unwrap_or(u64::MAX);
    if result.faculties.failed + result.departments.failed + result.courses.failed > 0 {
        warn!(
            faculties_failed = result.faculties.failed,
            departments_failed = result.departments.failed,
            courses_failed = result.courses.failed,
            "import finished with failures"
        );
    }

    Ok(ImportOutcome {
        result,
        navigation,
        phases: tracker.visited,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_linearly_to_done() {
        let mut phase = ImportPhase::Parsing;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(next);
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(seen.last(), Some(&ImportPhase::Done));
    }

    #[test]
    fn eta_scales_with_remaining_work() {
        let eta = estimate_remaining(Duration::from_secs(10), 50, 150);
        assert_eq!(eta, Some(Duration::from_secs(20)));
        assert_eq!(estimate_remaining(Duration::from_secs(1), 0, 10), None);
        assert_eq!(
            estimate_remaining(Duration::from_secs(3), 10, 10),
            Some(Duration::ZERO)
        );
    }
}
