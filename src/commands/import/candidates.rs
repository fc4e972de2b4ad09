use anyhow::{Context, Result};
use indexmap::IndexMap;
use indexmap::map::Entry;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::schema::CatalogRow;

pub const DEFAULT_DURATION_MONTHS: i64 = 48;
pub const DEFAULT_TOTAL_CREDITS: i64 = 120;

/// A faculty or department identified by its natural key. First occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCandidate {
    pub natural_key: String,
    pub display_name: String,
    pub parent_key: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegreeLevel {
    Certificate,
    Undergraduate,
    Postgraduate,
    Doctoral,
}

impl DegreeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::Undergraduate => "undergraduate",
            Self::Postgraduate => "postgraduate",
            Self::Doctoral => "doctoral",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "certificate" | "diploma" => Some(Self::Certificate),
            "undergraduate" | "bachelor" | "bachelors" => Some(Self::Undergraduate),
            "postgraduate" | "post_graduate" | "master" | "masters" => Some(Self::Postgraduate),
            "doctoral" | "doctorate" | "phd" => Some(Self::Doctoral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCandidate {
    pub line: usize,
    pub code: String,
    pub name: String,
    pub department_key: String,
    pub duration_months: i64,
    pub total_credits: i64,
    pub degree_level: DegreeLevel,
}

/// Infers a degree level from a course name. Rules are tried in order
/// doctoral, postgraduate, certificate; anything else is undergraduate.
pub struct DegreeLevelClassifier {
    rules: Vec<(DegreeLevel, Regex)>,
}

impl DegreeLevelClassifier {
    pub fn new() -> Result<Self> {
        let doctoral = Regex::new(r"(?i)\b(?:doctorate|doctoral|doctor|ph\.?\s?d|d\.?phil)\b")
            .context("failed to compile doctoral keyword regex")?;
        let postgraduate = Regex::new(
            r"(?i)\b(?:masters?|post\s?-?graduate|postgrad|m\.?\s?sc|m\.a|m\.?\s?phil|m\.?\s?tech|m\.?\s?eng|mba|m\.ed|llm)\b",
        )
        .context("failed to compile postgraduate keyword regex")?;
        let certificate = Regex::new(r"(?i)\b(?:certificate|certification|diploma)\b")
            .context("failed to compile certificate keyword regex")?;

        Ok(Self {
            rules: vec![
                (DegreeLevel::Doctoral, doctoral),
                (DegreeLevel::Postgraduate, postgraduate),
                (DegreeLevel::Certificate, certificate),
            ],
        })
    }

    pub fn infer(&self, course_name: &str) -> DegreeLevel {
        self.rules
            .iter()
            .find(|(_, pattern)| pattern.is_match(course_name))
            .map(|(level, _)| *level)
            .unwrap_or(DegreeLevel::Undergraduate)
    }
}

pub fn dedup_faculties(rows: &[CatalogRow]) -> Vec<EntityCandidate> {
    let mut seen: IndexMap<&str, EntityCandidate> = IndexMap::new();
    for row in rows.iter().filter(|row| !row.faculty_code.is_empty()) {
        seen.entry(row.faculty_code.as_str()).or_insert_with(|| EntityCandidate {
            natural_key: row.faculty_code.clone(),
            display_name: row.faculty_name.clone(),
            parent_key: None,
        });
    }
    seen.into_values().collect()
}

pub fn dedup_departments(rows: &[CatalogRow]) -> Vec<EntityCandidate> {
    let mut seen: IndexMap<&str, EntityCandidate> = IndexMap::new();
    for row in rows.iter().filter(|row| !row.department_code.is_empty()) {
        seen.entry(row.department_code.as_str())
            .or_insert_with(|| EntityCandidate {
                natural_key: row.department_code.clone(),
                display_name: row.department_name.clone(),
                parent_key: Some(row.faculty_code.clone()).filter(|code| !code.is_empty()),
            });
    }
    seen.into_values().collect()
}

#[derive(Debug, Default)]
pub struct CourseCandidates {
    pub candidates: Vec<CourseCandidate>,
    /// Rows that cannot become a course at all (blank code or name).
    pub rejected: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn build_course_candidates(
    rows: &[CatalogRow],
    classifier: &DegreeLevelClassifier,
) -> CourseCandidates {
    let mut built = CourseCandidates::default();
    let mut seen: IndexMap<&str, CourseCandidate> = IndexMap::new();

    for row in rows {
        if row.course_code.is_empty() || row.course_name.is_empty() {
            built.rejected.push(format!(
                "line {}: course row needs both course_code and course_name",
                row.line
            ));
            continue;
        }

        let Entry::Vacant(slot) = seen.entry(row.course_code.as_str()) else {
            continue;
        };

        let duration_months = parse_count(
            row.duration_months.as_deref(),
            DEFAULT_DURATION_MONTHS,
            "duration_months",
            row.line,
            &mut built.warnings,
        );
        let total_credits = parse_count(
            row.total_credits.as_deref(),
            DEFAULT_TOTAL_CREDITS,
            "total_credits",
            row.line,
            &mut built.warnings,
        );

        let degree_level = match row.degree_level.as_deref() {
            None => classifier.infer(&row.course_name),
            Some(label) => DegreeLevel::from_label(label).unwrap_or_else(|| {
                built.warnings.push(format!(
                    "line {}: unknown degree_level {label:?}, inferred from course name",
                    row.line
                ));
                classifier.infer(&row.course_name)
            }),
        };

        slot.insert(CourseCandidate {
            line: row.line,
            code: row.course_code.clone(),
            name: row.course_name.clone(),
            department_key: row.department_code.clone(),
            duration_months,
            total_credits,
            degree_level,
        });
    }

    built.candidates = seen.into_values().collect();
    built
}

fn parse_count(
    raw: Option<&str>,
    default: i64,
    column: &str,
    line: usize,
    warnings: &mut Vec<String>,
) -> i64 {
    let Some(raw) = raw else {
        return default;
    };

    // Spreadsheet exports often render integers as "48.0".
    let parsed = raw
        .parse::<i64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|value| value.fract() == 0.0)
                .map(|value| value as i64)
        })
        .filter(|value| *value > 0);

    parsed.unwrap_or_else(|| {
        warnings.push(format!(
            "line {line}: invalid {column} {raw:?}, using default {default}"
        ));
        default
    })
}
