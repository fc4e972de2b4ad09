use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{InputFormat, TemplateArgs};
use crate::commands::import::{OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
use crate::util::{ensure_directory, write_json_pretty};

const EXAMPLE_ROW: [&str; 9] = [
    "Faculty of Science",
    "SCI",
    "Physics",
    "PHY",
    "BSc Physics",
    "PHY101",
    "48",
    "120",
    "undergraduate",
];

/// Header row (required columns, then optional ones) plus one filled-in example.
pub fn template_rows() -> Vec<Vec<String>> {
    let header = REQUIRED_COLUMNS
        .iter()
        .chain(OPTIONAL_COLUMNS.iter())
        .map(|column| (*column).to_string())
        .collect();
    let example = EXAMPLE_ROW.iter().map(|cell| (*cell).to_string()).collect();
    vec![header, example]
}

pub fn run(args: TemplateArgs) -> Result<()> {
    if let Some(parent) = args.out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }

    let rows = template_rows();
    match args.format {
        InputFormat::Csv => {
            let mut writer = csv::Writer::from_path(&args.out)
                .with_context(|| format!("failed to create {}", args.out.display()))?;
            for row in &rows {
                writer
                    .write_record(row)
                    .with_context(|| format!("failed to write {}", args.out.display()))?;
            }
            writer
                .flush()
                .with_context(|| format!("failed to flush {}", args.out.display()))?;
        }
        InputFormat::Grid => write_json_pretty(&args.out, &rows)?,
    }

    info!(
        path = %args.out.display(),
        format = args.format.as_str(),
        columns = rows.first().map_or(0, Vec::len),
        "wrote import template"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_template_lists_every_column_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("nested").join("template.csv");

        run(TemplateArgs {
            out: out.clone(),
            format: InputFormat::Csv,
        })
        .expect("template should be written");

        let written = std::fs::read_to_string(&out).expect("template readable");
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some(
                "faculty_name,faculty_code,department_name,department_code,course_name,\
                 course_code,duration_months,total_credits,degree_level"
            )
        );
        assert_eq!(
            lines.next(),
            Some("Faculty of Science,SCI,Physics,PHY,BSc Physics,PHY101,48,120,undergraduate")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn example_row_matches_header_width() {
        let rows = template_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), rows[1].len());
    }
}
