use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::info;

use crate::cli::{AnchorArgs, resolve_db_path};
use crate::store::{CatalogStore, Record, SqliteStore, StoredRecord, Table};
use crate::util::{ensure_directory, slugify};

pub fn run(args: AnchorArgs) -> Result<()> {
    ensure_directory(&args.data_root)?;
    let db_path = resolve_db_path(&args.data_root, args.db_path.as_ref());
    let mut store = SqliteStore::open(&db_path)?;

    let anchor = ensure_anchor(&mut store, &args.title, args.path.as_deref())?;
    info!(
        id = anchor.id,
        title = anchor.text("title").unwrap_or_default(),
        path = anchor.text("path").unwrap_or_default(),
        parent_id = ?anchor.integer("parent_id"),
        db = %db_path.display(),
        "navigation anchor ready"
    );
    Ok(())
}

/// Returns the first node whose title contains `title`, creating a
/// top-level node when none does. Fails when the path is held by a node
/// with another title, since the import would never find it.
pub fn ensure_anchor<S: CatalogStore>(
    store: &mut S,
    title: &str,
    path: Option<&str>,
) -> Result<StoredRecord> {
    let title = title.trim();
    if title.is_empty() {
        bail!("anchor title must not be empty");
    }

    if let Some(existing) = store.find_by_title_like(Table::NavigationNodes, title)? {
        info!(id = existing.id, "anchor already present");
        return Ok(existing);
    }

    let path = match path {
        Some(path) => path.to_string(),
        None => format!("/{}", slugify(title)),
    };

    let mut record = Record::new();
    record.insert("title".to_string(), json!(title));
    record.insert("path".to_string(), json!(path));
    record.insert("parent_id".to_string(), Value::Null);
    record.insert("position".to_string(), json!(0));

    if let Some(created) = store.insert_many(Table::NavigationNodes, &[record])?.pop() {
        return Ok(created);
    }

    // Title search found nothing, so whatever holds the path has another title.
    let holder = store
        .find_by_keys(Table::NavigationNodes, "path", &[json!(path)])?
        .pop();
    match holder {
        Some(existing) => bail!(
            "anchor path {path} is already used by node {} titled {:?}; pass a different --path",
            existing.id,
            existing.text("title").unwrap_or_default()
        ),
        None => bail!("anchor {path} was neither created nor found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_is_created_once() {
        let mut store = SqliteStore::open_in_memory().expect("store");

        let created = ensure_anchor(&mut store, "Academic Programs", None).expect("create");
        assert_eq!(created.text("path"), Some("/academic-programs"));
        assert_eq!(created.integer("parent_id"), None);

        let again = ensure_anchor(&mut store, "academic programs", Some("/other"))
            .expect("lookup");
        assert_eq!(again.id, created.id);
        assert_eq!(store.count_rows(Table::NavigationNodes).unwrap(), 1);
    }

    #[test]
    fn taken_path_with_other_title_is_rejected() {
        let mut store = SqliteStore::open_in_memory().expect("store");
        ensure_anchor(&mut store, "Home", Some("/academics")).expect("create home");

        let err = ensure_anchor(&mut store, "Academic Programs", Some("/academics"))
            .expect_err("path is held by a node the import would not find");
        assert!(format!("{err:#}").contains("already used by node"));
        assert!(
            store
                .find_by_title_like(Table::NavigationNodes, "academic")
                .unwrap()
                .is_none()
        );
        assert!(ensure_anchor(&mut store, "   ", None).is_err());
    }
}
