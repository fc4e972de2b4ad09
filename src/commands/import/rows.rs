use anyhow::Result;
use csv::ReaderBuilder;
use serde_json::Value;

use super::error::PreconditionError;
use crate::cli::InputFormat;
use crate::util::normalize_header;

/// One data line of the source file, already padded/truncated to the header width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub line: usize,
    pub cells: Vec<String>,
}

/// Header plus data rows of an import file. `rows()` can be called any
/// number of times; every call starts from the first data row.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    headers: Vec<String>,
    records: Vec<SourceRecord>,
}

impl ParsedTable {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> impl Iterator<Item = &SourceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

pub fn parse_source(data: &[u8], format: InputFormat) -> Result<ParsedTable> {
    let raw_rows = match format {
        InputFormat::Csv => read_delimited(data)?,
        InputFormat::Grid => read_grid(data)?,
    };

    build_table(raw_rows)
}

fn read_delimited(data: &[u8]) -> Result<Vec<(usize, Vec<String>)>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| PreconditionError::Parse(err.to_string()))?;
        let line = record
            .position()
            .map(|position| position.line() as usize)
            .unwrap_or(index + 1);
        rows.push((line, record.iter().map(ToOwned::to_owned).collect()));
    }

    Ok(rows)
}

fn read_grid(data: &[u8]) -> Result<Vec<(usize, Vec<String>)>> {
    let grid: Vec<Vec<Value>> = serde_json::from_slice(data).map_err(|err| {
        PreconditionError::Parse(format!("grid must be an array of row arrays: {err}"))
    })?;

    Ok(grid
        .into_iter()
        .enumerate()
        .map(|(index, cells)| (index + 1, cells.iter().map(cell_to_string).collect()))
        .collect())
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => nested.to_string(),
    }
}

fn build_table(raw_rows: Vec<(usize, Vec<String>)>) -> Result<ParsedTable> {
    let mut rows = raw_rows
        .into_iter()
        .filter(|(_, cells)| cells.iter().any(|cell| !cell.trim().is_empty()));

    let Some((_, header_cells)) = rows.next() else {
        return Err(PreconditionError::Parse("file contains no header row".to_string()).into());
    };
    let headers = header_cells
        .iter()
        .map(|cell| normalize_header(cell))
        .collect::<Vec<_>>();
    let width = headers.len();

    let records = rows
        .map(|(line, mut cells)| {
            cells.resize(width, String::new());
            SourceRecord { line, cells }
        })
        .collect::<Vec<_>>();

    if records.is_empty() {
        return Err(PreconditionError::Parse(
            "file needs a header row and at least one data row".to_string(),
        )
        .into());
    }

    Ok(ParsedTable { headers, records })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precondition(err: &anyhow::Error) -> &PreconditionError {
        err.downcast_ref::<PreconditionError>()
            .expect("error should be a precondition error")
    }

    #[test]
    fn delimited_text_honors_quotes_and_escaped_quotes() {
        let data = b"Faculty Name,Course Name\n\"Science, Engineering\",\"The \"\"Big\"\" Course\"\n";
        let table = parse_source(data, InputFormat::Csv).expect("csv should parse");

        assert_eq!(table.headers(), ["faculty_name", "course_name"]);
        let row = table.rows().next().expect("one data row");
        assert_eq!(row.cells, ["Science, Engineering", "The \"Big\" Course"]);
        assert_eq!(row.line, 2);
    }

    #[test]
    fn rows_are_padded_truncated_and_reiterable() {
        let data = b"a,b,c\n1\n1,2,3,4\n";
        let table = parse_source(data, InputFormat::Csv).expect("csv should parse");

        let first_pass = table.rows().map(|row| row.cells.clone()).collect::<Vec<_>>();
        assert_eq!(first_pass[0], ["1", "", ""]);
        assert_eq!(first_pass[1], ["1", "2", "3"]);

        let second_pass = table.rows().map(|row| row.cells.clone()).collect::<Vec<_>>();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn grid_cells_are_coerced_to_strings() {
        let data = br#"[["Course Code", "Total Credits", "Active", "Notes"], ["PHY101", 120, true, null], [null, "", null]]"#;
        let table = parse_source(data, InputFormat::Grid).expect("grid should parse");

        assert_eq!(table.len(), 1);
        let row = table.rows().next().expect("one data row");
        assert_eq!(row.cells, ["PHY101", "120", "true", ""]);
    }

    #[test]
    fn header_only_file_is_a_parse_error() {
        let err = parse_source(b"faculty_name,faculty_code\n\n,\n", InputFormat::Csv)
            .expect_err("header-only file should fail");
        assert!(matches!(precondition(&err), PreconditionError::Parse(_)));

        let err = parse_source(b"", InputFormat::Csv).expect_err("empty file should fail");
        assert!(matches!(precondition(&err), PreconditionError::Parse(_)));
    }

    #[test]
    fn malformed_grid_is_a_parse_error() {
        let err = parse_source(br#"{"rows": []}"#, InputFormat::Grid)
            .expect_err("object should not parse as grid");
        assert!(matches!(precondition(&err), PreconditionError::Parse(_)));
    }
}
