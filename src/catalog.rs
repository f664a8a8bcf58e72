//! Catalog - registry of the tables a database knows about.
//!
//! Maps table ids to their heap file, name and primary key, and loads table
//! definitions from a plain-text schema file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{Error, Result, TableId};
use crate::storage::HeapFile;
use crate::tuple::{TupleDesc, Type};

struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
    primary_key: String,
}

#[derive(Default)]
struct Tables {
    by_id: HashMap<TableId, TableEntry>,
    by_name: HashMap<String, TableId>,
}

/// Thread-safe table registry.
///
/// Lookups take a read lock and clone out what they need, so no catalog
/// lock is ever held across page I/O.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `file` under `name`.
    ///
    /// A table already registered with the same name or the same id is
    /// replaced. An empty `primary_key` means none.
    pub fn add_table(
        &self,
        file: HeapFile,
        name: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> TableId {
        let id = file.id();
        let name = name.into();
        let entry = TableEntry {
            file: Arc::new(file),
            name: name.clone(),
            primary_key: primary_key.into(),
        };

        let mut tables = self.tables.write();
        if let Some(prev) = tables.by_id.remove(&id) {
            tables.by_name.remove(&prev.name);
        }
        if let Some(prev_id) = tables.by_name.remove(&name) {
            tables.by_id.remove(&prev_id);
        }
        tables.by_id.insert(id, entry);
        tables.by_name.insert(name, id);

        id
    }

    /// Id of the table called `name`.
    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.tables
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn tuple_desc(&self, id: TableId) -> Result<Arc<TupleDesc>> {
        self.with_entry(id, |entry| Arc::clone(entry.file.tuple_desc()))
    }

    /// The heap file backing table `id`.
    pub fn file(&self, id: TableId) -> Result<Arc<HeapFile>> {
        self.with_entry(id, |entry| Arc::clone(&entry.file))
    }

    pub fn table_name(&self, id: TableId) -> Result<String> {
        self.with_entry(id, |entry| entry.name.clone())
    }

    pub fn primary_key(&self, id: TableId) -> Result<String> {
        self.with_entry(id, |entry| entry.primary_key.clone())
    }

    /// Ids of all registered tables, in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.read().by_id.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Forget every table. Files on disk are left alone.
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.by_id.clear();
        tables.by_name.clear();
    }

    /// Register every table described in the schema file at `path`.
    ///
    /// Each non-empty line has the form
    /// ```text
    /// name (field type [pk], field type, ...)
    /// ```
    /// where `type` is `int` or `string` (any case). The table's data lives
    /// in `<name>.dat` next to the schema file and is created if missing.
    ///
    /// # Errors
    /// - `Error::InvalidSchema` for a malformed line; tables on earlier
    ///   lines stay registered
    /// - `Error::Io` if the schema or a table file cannot be opened
    pub fn load_schema<P: AsRef<Path>>(&self, path: P) -> Result<Vec<TableId>> {
        let path = fs::canonicalize(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let text = fs::read_to_string(&path)?;

        let mut ids = Vec::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (name, desc, primary_key) = parse_schema_line(line)?;
            let file = HeapFile::open(base.join(format!("{name}.dat")), desc)?;
            debug!(table = %name, schema = %file.tuple_desc(), "added table");
            ids.push(self.add_table(file, name, primary_key));
        }
        Ok(ids)
    }

    fn with_entry<T>(&self, id: TableId, f: impl FnOnce(&TableEntry) -> T) -> Result<T> {
        self.tables
            .read()
            .by_id
            .get(&id)
            .map(f)
            .ok_or_else(|| Error::table_not_found(id))
    }
}

/// Parse `name (field type [pk], ...)` into name, schema and primary key.
fn parse_schema_line(line: &str) -> Result<(String, TupleDesc, String)> {
    let invalid = || Error::InvalidSchema(line.to_string());

    let open = line.find('(').ok_or_else(invalid)?;
    let close = line.rfind(')').filter(|&c| c > open).ok_or_else(invalid)?;
    let name = line[..open].trim();
    if name.is_empty() {
        return Err(invalid());
    }

    let mut types = Vec::new();
    let mut names = Vec::new();
    let mut primary_key = String::new();

    for column in line[open + 1..close].split(',') {
        let parts: Vec<&str> = column.split_whitespace().collect();
        let (field, type_name, annotation) = match parts.as_slice() {
            [field, ty] => (*field, *ty, None),
            [field, ty, annotation] => (*field, *ty, Some(*annotation)),
            _ => return Err(invalid()),
        };

        let ty = if type_name.eq_ignore_ascii_case("int") {
            Type::Int
        } else if type_name.eq_ignore_ascii_case("string") {
            Type::String
        } else {
            return Err(invalid());
        };

        match annotation {
            None => {}
            Some("pk") => primary_key = field.to_string(),
            Some(_) => return Err(invalid()),
        }

        types.push(ty);
        names.push(field);
    }

    Ok((
        name.to_string(),
        TupleDesc::with_names(types, names),
        primary_key,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &Path, file: &str) -> HeapFile {
        HeapFile::open(dir.join(file), TupleDesc::new(vec![Type::Int])).unwrap()
    }

    #[test]
    fn test_add_and_lookup() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();

        let id = catalog.add_table(open(dir.path(), "a.dat"), "a", "x");

        assert_eq!(catalog.table_id("a").unwrap(), id);
        assert_eq!(catalog.table_name(id).unwrap(), "a");
        assert_eq!(catalog.primary_key(id).unwrap(), "x");
        assert_eq!(catalog.file(id).unwrap().id(), id);
        assert_eq!(*catalog.tuple_desc(id).unwrap(), TupleDesc::new(vec![Type::Int]));
        assert_eq!(catalog.table_ids(), vec![id]);
    }

    #[test]
    fn test_unknown_table() {
        let catalog = Catalog::new();
        assert!(matches!(catalog.table_id("nope"), Err(Error::TableNotFound(n)) if n == "nope"));
        assert!(matches!(catalog.file(TableId(3)), Err(Error::TableNotFound(_))));
    }

    #[test]
    fn test_same_name_replaces() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();

        let old = catalog.add_table(open(dir.path(), "a.dat"), "t", "");
        let new = catalog.add_table(open(dir.path(), "b.dat"), "t", "");

        assert_ne!(old, new);
        assert_eq!(catalog.table_id("t").unwrap(), new);
        assert!(catalog.file(old).is_err());
        assert_eq!(catalog.table_ids().len(), 1);
    }

    #[test]
    fn test_same_file_replaces_name() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();

        let a = catalog.add_table(open(dir.path(), "a.dat"), "first", "");
        let b = catalog.add_table(open(dir.path(), "a.dat"), "second", "");

        assert_eq!(a, b);
        assert!(catalog.table_id("first").is_err());
        assert_eq!(catalog.table_name(a).unwrap(), "second");
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        catalog.add_table(open(dir.path(), "a.dat"), "a", "");

        catalog.clear();
        assert!(catalog.table_ids().is_empty());
        assert!(catalog.table_id("a").is_err());
    }

    #[test]
    fn test_load_schema() {
        let dir = tempdir().unwrap();
        let schema = dir.path().join("catalog.txt");
        fs::write(
            &schema,
            "users (id int pk, name STRING)\n\norders (id int, user_id Int)\n",
        )
        .unwrap();

        let catalog = Catalog::new();
        let ids = catalog.load_schema(&schema).unwrap();
        assert_eq!(ids.len(), 2);

        let users = catalog.table_id("users").unwrap();
        assert_eq!(catalog.primary_key(users).unwrap(), "id");
        let desc = catalog.tuple_desc(users).unwrap();
        assert_eq!(desc.to_string(), "int(id), string(name)");
        assert!(dir.path().join("users.dat").exists());

        let orders = catalog.table_id("orders").unwrap();
        assert_eq!(catalog.primary_key(orders).unwrap(), "");
        assert_eq!(catalog.tuple_desc(orders).unwrap().field_index("user_id"), Some(1));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        for line in [
            "no_parens",
            "(a int)",
            "t (a)",
            "t (a float)",
            "t (a int key)",
            "t (a int pk extra)",
            "t )a int(",
        ] {
            assert!(
                matches!(parse_schema_line(line), Err(Error::InvalidSchema(_))),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn test_load_schema_missing_file() {
        let dir = tempdir().unwrap();
        let result = Catalog::new().load_schema(dir.path().join("missing.txt"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
