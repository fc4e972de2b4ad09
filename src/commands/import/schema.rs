use anyhow::Result;

use super::error::PreconditionError;
use super::rows::{ParsedTable, SourceRecord};

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "faculty_name",
    "faculty_code",
    "department_name",
    "department_code",
    "course_name",
    "course_code",
];

pub const OPTIONAL_COLUMNS: [&str; 3] = ["duration_months", "total_credits", "degree_level"];

/// One source line with the declared columns pulled out. Optional fields
/// are `None` when the column is absent or the cell is blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub line: usize,
    pub faculty_name: String,
    pub faculty_code: String,
    pub department_name: String,
    pub department_code: String,
    pub course_name: String,
    pub course_code: String,
    pub duration_months: Option<String>,
    pub total_credits: Option<String>,
    pub degree_level: Option<String>,
}

/// Header position of every declared column, built once per import.
#[derive(Debug, Clone, Copy)]
pub struct ColumnIndex {
    faculty_name: usize,
    faculty_code: usize,
    department_name: usize,
    department_code: usize,
    course_name: usize,
    course_code: usize,
    duration_months: Option<usize>,
    total_credits: Option<usize>,
    degree_level: Option<usize>,
}

/// Checks every required column at once so the error names all of them.
pub fn validate_headers(headers: &[String]) -> Result<ColumnIndex> {
    let position = |name: &str| headers.iter().position(|header| header == name);

    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|column| position(**column).is_none())
        .map(|column| (*column).to_string())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(PreconditionError::MissingColumns { columns: missing }.into());
    }

    let required = |name: &str| position(name).unwrap_or_default();

    Ok(ColumnIndex {
        faculty_name: required("faculty_name"),
        faculty_code: required("faculty_code"),
        department_name: required("department_name"),
        department_code: required("department_code"),
        course_name: required("course_name"),
        course_code: required("course_code"),
        duration_months: position("duration_months"),
        total_credits: position("total_credits"),
        degree_level: position("degree_level"),
    })
}

impl ColumnIndex {
    pub fn read(&self, record: &SourceRecord) -> CatalogRow {
        let cell = |index: usize| {
            record
                .cells
                .get(index)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let optional = |index: Option<usize>| index.map(&cell).filter(|value| !value.is_empty());

        CatalogRow {
            line: record.line,
            faculty_name: cell(self.faculty_name),
            faculty_code: cell(self.faculty_code),
            department_name: cell(self.department_name),
            department_code: cell(self.department_code),
            course_name: cell(self.course_name),
            course_code: cell(self.course_code),
            duration_months: optional(self.duration_months),
            total_credits: optional(self.total_credits),
            degree_level: optional(self.degree_level),
        }
    }

    pub fn rows<'a>(&'a self, table: &'a ParsedTable) -> impl Iterator<Item = CatalogRow> + 'a {
        table.rows().map(|record| self.read(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::InputFormat;
    use crate::commands::import::rows::parse_source;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn missing_columns_are_reported_together() {
        let err = validate_headers(&headers(&[
            "faculty_name",
            "faculty_code",
            "department_name",
            "course_name",
        ]))
        .expect_err("two required columns are missing");

        let precondition = err
            .downcast_ref::<PreconditionError>()
            .expect("error should be a precondition error");
        assert_eq!(
            precondition,
            &PreconditionError::MissingColumns {
                columns: vec!["department_code".to_string(), "course_code".to_string()],
            }
        );
        assert_eq!(
            err.to_string(),
            "missing required columns: department_code, course_code"
        );
    }

    #[test]
    fn rows_map_by_header_name_and_trim_cells() {
        let data = b"Course Code,Faculty Name,Faculty Code,Department Name,Department Code,Course Name,Degree Level\n PHY101 ,Science,SCI,Physics,PHY,Classical Mechanics,\n";
        let table = parse_source(data, InputFormat::Csv).expect("csv should parse");
        let columns = validate_headers(table.headers()).expect("headers are complete");

        let rows = columns.rows(&table).collect::<Vec<_>>();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].course_code, "PHY101");
        assert_eq!(rows[0].faculty_code, "SCI");
        assert_eq!(rows[0].course_name, "Classical Mechanics");
        assert_eq!(rows[0].degree_level, None);
        assert_eq!(rows[0].duration_months, None);
    }
}
