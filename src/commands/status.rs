use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{StatusArgs, resolve_db_path};
use crate::store::{SqliteStore, Table};

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.data_root, args.db_path.as_ref());
    let manifest_dir = args.data_root.join("manifests");

    info!(data_root = %args.data_root.display(), "status requested");

    if db_path.exists() {
        let store = SqliteStore::open(&db_path)?;
        for table in Table::ALL {
            info!(table = table.as_str(), rows = store.count_rows(table)?, "table status");
        }
        info!(
            path = %db_path.display(),
            db_schema_version = %store.metadata_value("db_schema_version")?.unwrap_or_default(),
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    match latest_manifest(&manifest_dir)? {
        Some(name) => info!(manifest = %name, "latest import run manifest"),
        None => warn!(path = %manifest_dir.display(), "no import run manifests found"),
    }

    Ok(())
}

// Manifest names embed a compact UTC timestamp, so lexical order is chronological.
fn latest_manifest(dir: &std::path::Path) -> Result<Option<String>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<String> = None;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with("import_run_")
            && name.ends_with(".json")
            && latest.as_ref().is_none_or(|current| name > *current)
        {
            latest = Some(name);
        }
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_manifest_picks_newest_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "import_run_20250101T000000Z.json",
            "import_run_20250301T120000Z.json",
            "notes.json",
        ] {
            fs::write(dir.path().join(name), "{}").expect("write manifest");
        }

        assert_eq!(
            latest_manifest(dir.path()).unwrap().as_deref(),
            Some("import_run_20250301T120000Z.json")
        );
        assert_eq!(latest_manifest(&dir.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn status_runs_against_a_missing_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        run(StatusArgs {
            data_root: dir.path().to_path_buf(),
            db_path: None,
        })
        .expect("status should not fail");
    }
}
