use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use super::pipeline::{ImportOptions, ImportProgress, run_import};
use crate::cli::{ImportArgs, InputFormat, resolve_db_path};
use crate::model::{ImportPaths, ImportRunManifest};
use crate::store::{DB_SCHEMA_VERSION, SqliteStore};
use crate::util::{
    ensure_directory, now_utc_string, read_source_file, sha256_bytes, utc_compact_string,
    write_json_pretty,
};

pub fn run(args: ImportArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("import-{}", utc_compact_string(started_ts));

    let data_root = args.data_root.clone();
    ensure_directory(&data_root)?;
    let db_path = resolve_db_path(&data_root, args.db_path.as_ref());
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        data_root.join("manifests").join(format!(
            "import_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });

    let format = resolve_format(&args.file, args.format)?;
    info!(
        file = %args.file.display(),
        format = format.as_str(),
        run_id = %run_id,
        "starting import"
    );

    let data = read_source_file(&args.file)?;
    let source_sha256 = sha256_bytes(&data);

    let mut store = SqliteStore::open(&db_path)?;
    let options = ImportOptions {
        format,
        chunk_size: args.chunk_size,
        anchor_term: args.anchor_term.clone(),
    };

    let outcome = run_import(&mut store, &data, &options, &mut log_progress)?;

    let manifest = ImportRunManifest {
        manifest_version: 1,
        run_id,
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_import_command(&args),
        source_format: format.as_str().to_string(),
        source_sha256,
        paths: ImportPaths {
            data_root: data_root.display().to_string(),
            source_path: args.file.display().to_string(),
            db_path: db_path.display().to_string(),
        },
        result: outcome.result.clone(),
        navigation: outcome.navigation.clone(),
    };
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote import run manifest");

    let result = &outcome.result;
    info!(
        faculties_created = result.faculties.success,
        faculties_failed = result.faculties.failed,
        departments_created = result.departments.success,
        departments_failed = result.departments.failed,
        courses_created = result.courses.success,
        courses_failed = result.courses.failed,
        warnings = result.warnings.len(),
        elapsed_ms = result.elapsed_ms,
        "import completed"
    );

    if args.json {
        let rendered =
            serde_json::to_string_pretty(result).context("failed to serialize import result")?;
        println!("{rendered}");
    }

    Ok(())
}

fn resolve_format(file: &Path, declared: Option<InputFormat>) -> Result<InputFormat> {
    declared
        .or_else(|| InputFormat::from_path(file))
        .with_context(|| {
            format!(
                "cannot infer format of {}; pass --format csv or --format grid",
                file.display()
            )
        })
}

fn log_progress(progress: &ImportProgress) {
    if progress.total == 0 {
        info!(phase = progress.phase.as_str(), "import progress");
        return;
    }

    let percent = progress.processed * 100 / progress.total;
    info!(
        phase = progress.phase.as_str(),
        processed = progress.processed,
        total = progress.total,
        percent,
        eta_secs = progress.eta.map(|eta| eta.as_secs()).unwrap_or_default(),
        "import progress"
    );
}

fn render_import_command(args: &ImportArgs) -> String {
    let mut command = format!(
        "catalog-import import --data-root {} --file {} --chunk-size {} --anchor-term {:?}",
        args.data_root.display(),
        args.file.display(),
        args.chunk_size,
        args.anchor_term
    );
    if let Some(format) = args.format {
        command.push_str(&format!(" --format {}", format.as_str()));
    }
    if let Some(db_path) = &args.db_path {
        command.push_str(&format!(" --db-path {}", db_path.display()));
    }
    if let Some(manifest_path) = &args.manifest_path {
        command.push_str(&format!(" --manifest-path {}", manifest_path.display()));
    }
    if args.json {
        command.push_str(" --json");
    }
    command
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn format_is_inferred_from_extension_unless_declared() {
        let csv = PathBuf::from("catalog.CSV");
        let grid = PathBuf::from("sheet.json");
        let unknown = PathBuf::from("catalog.xlsx");

        assert_eq!(resolve_format(&csv, None).unwrap(), InputFormat::Csv);
        assert_eq!(resolve_format(&grid, None).unwrap(), InputFormat::Grid);
        assert_eq!(
            resolve_format(&unknown, Some(InputFormat::Grid)).unwrap(),
            InputFormat::Grid
        );
        assert!(resolve_format(&unknown, None).is_err());
    }

    #[test]
    fn full_import_writes_manifest_and_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("catalog.csv");
        std::fs::write(
            &file,
            "faculty_name,faculty_code,department_name,department_code,course_name,course_code\n\
             Science,SCI,Physics,PHY,BSc Physics,PHY100\n",
        )
        .expect("write source file");
        let manifest_path = dir.path().join("run.json");

        run(ImportArgs {
            data_root: dir.path().join("data"),
            db_path: None,
            file,
            format: None,
            chunk_size: 50,
            anchor_term: "academic".to_string(),
            manifest_path: Some(manifest_path.clone()),
            json: false,
        })
        .expect("import should succeed");

        let raw = std::fs::read(&manifest_path).expect("manifest written");
        let manifest: serde_json::Value = serde_json::from_slice(&raw).expect("manifest is json");
        assert_eq!(manifest["result"]["courses"]["success"], 1);
        assert_eq!(manifest["navigation"]["outcome"]["status"], "skipped_missing_anchor");
        assert!(dir.path().join("data").join("catalog.sqlite").exists());
    }
}
