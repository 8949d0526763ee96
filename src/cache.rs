use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use rusqlite::types::Value;
use rusqlite::{Connection, MAIN_DB, OptionalExtension, params, params_from_iter};
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::ics::{self, DateValue};
use crate::models::{Status, Todo, TodoList};

/// Bumped whenever the projection schema changes; a mismatched snapshot is
/// dropped and rebuilt from the task files.
const SCHEMA_VERSION: i64 = 1;

/// Fields accepted in an explicit sort specification.
const SORT_FIELDS: &[&str] = &[
    "completed_at",
    "created_at",
    "dtstamp",
    "due",
    "last_modified",
    "location",
    "percent_complete",
    "priority",
    "sequence",
    "start",
    "status",
    "summary",
    "uid",
];

/// Default composite order. The bool marks the descending directions for
/// the natural (non-reversed) output, which puts unset priorities first and
/// due-carrying todos before due-less ones.
const DEFAULT_ORDER: &[(&str, bool)] = &[
    ("completed_at", true),
    ("priority", false),
    ("due IS NOT NULL", true),
    ("due", true),
    ("created_at", false),
];

/// Query filters. The default value filters nothing except completed todos.
#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    pub include_completed: bool,
    pub lists: Vec<String>,
    /// Matches only the single worst priority value, 9.
    pub urgent: bool,
    pub location: Option<String>,
    pub category: Option<String>,
    pub grep: Option<String>,
    pub startable: bool,
}

/// SQLite projection of all on-disk todos.
///
/// The store runs in memory and is hydrated from / flushed to a snapshot
/// file, which is purely a derived index: losing it only costs a rescan.
#[derive(Debug)]
pub struct Cache {
    conn: Connection,
    path: PathBuf,
}

impl Cache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = hydrate(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;

        let cache = Cache {
            conn,
            path: path.to_path_buf(),
        };
        cache.create_tables()?;
        Ok(cache)
    }

    /// Persist the in-memory store to the snapshot file.
    pub fn flush(&self) -> Result<()> {
        self.conn.backup(MAIN_DB, &self.path, None)?;
        Ok(())
    }

    /// Drop the snapshot and start over with an empty store.
    pub fn clear(&mut self) -> Result<()> {
        let _ = fs::remove_file(&self.path);
        self.conn = Connection::open_in_memory()?;
        self.conn.pragma_update(None, "foreign_keys", true)?;
        self.create_tables()
    }

    fn is_latest_version(&self) -> bool {
        self.conn
            .query_row(
                "SELECT version FROM meta WHERE version = ?1",
                params![SCHEMA_VERSION],
                |row| row.get::<_, i64>(0),
            )
            .is_ok()
    }

    fn create_tables(&self) -> Result<()> {
        if self.is_latest_version() {
            return Ok(());
        }

        self.conn.execute_batch(
            "DROP TABLE IF EXISTS todos;
             DROP TABLE IF EXISTS files;
             DROP TABLE IF EXISTS lists;
             DROP TABLE IF EXISTS meta;",
        )?;

        self.conn
            .execute("CREATE TABLE meta (version INTEGER)", [])?;
        self.conn.execute(
            "INSERT INTO meta (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        self.conn.execute(
            "CREATE TABLE lists (
                name            TEXT PRIMARY KEY,
                path            TEXT,
                colour          TEXT,
                mtime           INTEGER,

                CONSTRAINT path_unique UNIQUE (path)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE files (
                path            TEXT PRIMARY KEY,
                list_name       TEXT,
                mtime           INTEGER,

                FOREIGN KEY(list_name) REFERENCES lists(name) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE todos (
                id              INTEGER PRIMARY KEY,
                file_path       TEXT,
                uid             TEXT,
                summary         TEXT,
                due             INTEGER,
                due_dt          INTEGER,
                start           INTEGER,
                start_dt        INTEGER,
                priority        INTEGER,
                created_at      INTEGER,
                completed_at    INTEGER,
                percent_complete INTEGER,
                dtstamp         INTEGER,
                status          TEXT,
                description     TEXT,
                location        TEXT,
                categories      TEXT,
                sequence        INTEGER,
                last_modified   INTEGER,
                rrule           TEXT,

                FOREIGN KEY(file_path) REFERENCES files(path) ON DELETE CASCADE
            )",
            [],
        )?;

        Ok(())
    }

    /// Insert a list, keyed by path. Re-adding the same path returns the
    /// stored name; a name collision with a different path is a conflict.
    pub fn add_list(
        &self,
        name: &str,
        path: &Path,
        colour: Option<&str>,
        mtime: i64,
    ) -> Result<String> {
        let path_text = path.to_string_lossy();
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM lists WHERE path = ?1",
                params![path_text],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = existing {
            return Ok(existing);
        }

        match self.conn.execute(
            "INSERT INTO lists (name, path, colour, mtime) VALUES (?1, ?2, ?3, ?4)",
            params![name, path_text, colour, mtime],
        ) {
            Ok(_) => Ok(name.to_string()),
            Err(err) if is_constraint_violation(&err) => Err(Error::AlreadyExists {
                kind: "list",
                name: name.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Insert a file row. An existing row for the path means the cached
    /// projection is still fresh; the scanner treats that conflict as a hit.
    pub fn add_file(&self, list_name: &str, path: &Path, mtime: i64) -> Result<()> {
        match self.conn.execute(
            "INSERT INTO files (list_name, path, mtime) VALUES (?1, ?2, ?3)",
            params![list_name, path.to_string_lossy(), mtime],
        ) {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => Err(Error::AlreadyExists {
                kind: "file",
                name: path.to_string_lossy().into_owned(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Insert the flattened projection of one todo.
    pub fn add_todo(&self, todo: &Todo, file_path: &Path, id: Option<i64>) -> Result<i64> {
        let due = todo.due.map(|d| d.timestamp());
        let due_dt = todo.due.map(|d| d.date_only);
        // A start at or past the due date never gates listing; drop it from
        // the projection, as the source does.
        let (start, start_dt) = match (todo.start, due) {
            (Some(start), Some(due)) if start.timestamp() >= due => (None, None),
            (start, _) => (start.map(|s| s.timestamp()), start.map(|s| s.date_only)),
        };

        let path_text = file_path.to_string_lossy();
        let priority = (todo.priority > 0).then_some(todo.priority);
        let categories =
            (!todo.categories.is_empty()).then(|| ics::join_text_list(&todo.categories));
        let created_at = todo.created_at.map(|dt| dt.timestamp());
        let completed_at = todo.completed_at.map(|dt| dt.timestamp());
        let last_modified = todo.last_modified.map(|dt| dt.timestamp());

        const COLUMNS: &str = "file_path, uid, summary, due, due_dt, start, start_dt,
             priority, created_at, completed_at, percent_complete, dtstamp, status,
             description, location, categories, sequence, last_modified, rrule";

        let result = match id {
            Some(id) => {
                let sql = format!(
                    "INSERT INTO todos (id, {COLUMNS})
                     VALUES (?20, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                             ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
                );
                self.conn
                    .execute(
                        &sql,
                        params![
                            path_text,
                            todo.uid,
                            non_empty(&todo.summary),
                            due,
                            due_dt,
                            start,
                            start_dt,
                            priority,
                            created_at,
                            completed_at,
                            todo.percent_complete,
                            todo.dtstamp.timestamp(),
                            todo.status.as_str(),
                            non_empty(&todo.description),
                            non_empty(&todo.location),
                            categories,
                            todo.sequence,
                            last_modified,
                            non_empty(&todo.rrule),
                            id,
                        ],
                    )
                    .map(|_| id)
            }
            None => {
                let sql = format!(
                    "INSERT INTO todos ({COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                             ?14, ?15, ?16, ?17, ?18, ?19)"
                );
                self.conn
                    .execute(
                        &sql,
                        params![
                            path_text,
                            todo.uid,
                            non_empty(&todo.summary),
                            due,
                            due_dt,
                            start,
                            start_dt,
                            priority,
                            created_at,
                            completed_at,
                            todo.percent_complete,
                            todo.dtstamp.timestamp(),
                            todo.status.as_str(),
                            non_empty(&todo.description),
                            non_empty(&todo.location),
                            categories,
                            todo.sequence,
                            last_modified,
                            non_empty(&todo.rrule),
                        ],
                    )
                    .map(|_| self.conn.last_insert_rowid())
            }
        };

        result.map_err(|err| {
            if is_constraint_violation(&err) {
                Error::AlreadyExists {
                    kind: "todo",
                    name: file_path.to_string_lossy().into_owned(),
                }
            } else {
                err.into()
            }
        })
    }

    /// Check a file row against a fresh mtime. A match is a cache hit; a
    /// mismatch expires the row (cascading its projection) so the caller
    /// must reparse and re-add.
    pub fn revalidate(&self, path: &Path, mtime: i64) -> Result<bool> {
        let stored: Option<i64> = self
            .conn
            .query_row(
                "SELECT mtime FROM files WHERE path = ?1",
                params![path.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            Some(stored) if stored == mtime => Ok(true),
            Some(_) => {
                debug!(path = %path.display(), "file mtime changed, expiring projection");
                self.expire_file(path)?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Remove stale file rows based on the given fresh path → mtime data.
    pub fn expire_files(&self, fresh: &HashMap<PathBuf, i64>) -> Result<()> {
        let mut stmt = self.conn.prepare("SELECT path, mtime FROM files")?;
        let rows: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        for (path, mtime) in rows {
            if fresh.get(Path::new(&path)).copied() != Some(mtime) {
                self.expire_file(Path::new(&path))?;
            }
        }
        Ok(())
    }

    pub fn expire_file(&self, path: &Path) -> Result<()> {
        self.conn.execute(
            "DELETE FROM files WHERE path = ?1",
            params![path.to_string_lossy()],
        )?;
        Ok(())
    }

    /// Drop lists (cascading their files and projections) whose directory
    /// left the configuration or whose metadata files changed. This only
    /// evicts cache rows; the task files themselves are never touched.
    pub fn expire_lists(&self, fresh: &HashMap<PathBuf, i64>) -> Result<()> {
        let mut stmt = self.conn.prepare("SELECT path, name, mtime FROM lists")?;
        let rows: Vec<(String, String, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;
        for (path, name, mtime) in rows {
            match fresh.get(Path::new(&path)) {
                None => self.delete_list(&name)?,
                Some(fresh_mtime) if *fresh_mtime > mtime => self.delete_list(&name)?,
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn delete_list(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM lists WHERE name = ?1", params![name])?;
        Ok(())
    }

    pub fn lists(&self) -> Result<Vec<TodoList>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, path, colour FROM lists ORDER BY name ASC")?;
        let lists = stmt
            .query_map([], |row| {
                Ok(TodoList::with_colour(
                    row.get(0)?,
                    PathBuf::from(row.get::<_, String>(1)?),
                    row.get(2)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(lists)
    }

    fn lists_map(&self) -> Result<HashMap<String, TodoList>> {
        Ok(self
            .lists()?
            .into_iter()
            .map(|list| (list.name.clone(), list))
            .collect())
    }

    /// Count of cached todos per list, for the lists overview.
    pub fn counts_by_list(&self) -> Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT files.list_name, COUNT(todos.id)
             FROM todos JOIN files ON todos.file_path = files.path
             GROUP BY files.list_name",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(counts)
    }

    /// Filtered, ordered todos straight from the projection.
    pub fn todos(&self, filter: &TodoFilter, sort: &[String], reverse: bool) -> Result<Vec<Todo>> {
        let mut clauses = String::new();
        let mut values: Vec<Value> = Vec::new();

        if !filter.include_completed {
            clauses.push_str(" AND (status IN ('NEEDS-ACTION', 'IN-PROCESS') OR status IS NULL)");
        }
        if !filter.lists.is_empty() {
            let slots = vec!["?"; filter.lists.len()].join(", ");
            clauses.push_str(&format!(" AND files.list_name IN ({slots})"));
            values.extend(filter.lists.iter().map(|l| Value::from(l.clone())));
        }
        if filter.urgent {
            clauses.push_str(" AND priority = 9");
        }
        if let Some(location) = &filter.location {
            clauses.push_str(" AND location LIKE ?");
            values.push(Value::from(format!("%{location}%")));
        }
        if let Some(category) = &filter.category {
            clauses.push_str(" AND categories LIKE ?");
            values.push(Value::from(format!("%{category}%")));
        }
        if let Some(grep) = &filter.grep {
            clauses.push_str(" AND summary LIKE ?");
            values.push(Value::from(format!("%{grep}%")));
        }
        if filter.startable {
            clauses.push_str(" AND (start IS NULL OR start <= ?)");
            values.push(Value::from(Local::now().timestamp()));
        }

        let order = build_order(sort, reverse)?;
        let sql = format!(
            "SELECT todos.id, todos.uid, todos.summary, todos.due, todos.due_dt,
                    todos.start, todos.start_dt, todos.priority, todos.created_at,
                    todos.completed_at, todos.percent_complete, todos.dtstamp,
                    todos.status, todos.description, todos.location, todos.categories,
                    todos.sequence, todos.last_modified, todos.rrule,
                    files.list_name, files.path
             FROM todos JOIN files ON todos.file_path = files.path
             WHERE 1 = 1{clauses}
             ORDER BY {order}"
        );
        debug!(%sql, "todo query");

        let lists = self.lists_map()?;
        let mut stmt = self.conn.prepare(&sql)?;
        let rows: Vec<(Todo, String)> = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((todo_from_row(row, &lists)?, row.get::<_, String>(20)?))
            })?
            .collect::<std::result::Result<_, _>>()?;

        // Multiple projections sharing a file mean the file holds several
        // todos; those records must not be written back.
        let mut per_path: HashMap<String, usize> = HashMap::new();
        for (_, path) in &rows {
            *per_path.entry(path.clone()).or_default() += 1;
        }
        let mut warned: HashSet<String> = HashSet::new();
        let mut todos = Vec::with_capacity(rows.len());
        for (mut todo, path) in rows {
            if per_path[path.as_str()] > 1 {
                todo.read_only = true;
                if warned.insert(path.clone()) {
                    warn!(path = %path, "todos are read-only: file contains multiple entries");
                }
            }
            todos.push(todo);
        }
        Ok(todos)
    }

    /// Resolve a cache row id back to a full record, reloading the source
    /// file from disk so unmanaged properties are available for a
    /// subsequent save.
    pub fn todo(&self, id: i64) -> Result<Todo> {
        let row: Option<(String, Option<String>, String)> = self
            .conn
            .query_row(
                "SELECT files.path, todos.uid, files.list_name
                 FROM todos JOIN files ON todos.file_path = files.path
                 WHERE todos.id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (path, uid, list_name) = row.ok_or(Error::NoSuchTodo(id))?;

        let text = fs::read_to_string(&path)?;
        let cal = ics::parse(&text)?;
        let vtodos: Vec<_> = cal.subcomponents("VTODO").collect();
        let component = match &uid {
            Some(uid) => vtodos
                .iter()
                .find(|c| c.prop_value("UID").map(str::trim) == Some(uid.trim()))
                .copied(),
            None => vtodos.first().copied(),
        }
        .ok_or(Error::NoSuchTodo(id))?;

        let mut todo = Todo::from_vtodo(component)?;
        todo.id = Some(id);
        todo.read_only = vtodos.len() > 1;
        todo.filename = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        todo.list = self.lists_map()?.get(&list_name).cloned();
        Ok(todo)
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        // Last-chance persistence; scans and saves flush explicitly.
        if let Err(err) = self.flush() {
            debug!("could not persist cache snapshot on drop: {err}");
        }
    }
}

/// Open an in-memory store, seeded from the snapshot file when one exists.
/// An unreadable snapshot is discarded and rebuilt by the next scan.
fn hydrate(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    if path.exists() {
        if let Err(err) = conn.restore(
            MAIN_DB,
            path,
            None::<fn(rusqlite::backup::Progress)>,
        ) {
            warn!(path = %path.display(), "unreadable cache snapshot, rebuilding: {err}");
            conn = Connection::open_in_memory()?;
        }
    }
    Ok(conn)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn non_empty(text: &str) -> Option<&str> {
    (!text.is_empty()).then_some(text)
}

fn direction(descending: bool) -> &'static str {
    if descending { "DESC" } else { "ASC" }
}

fn build_order(sort: &[String], reverse: bool) -> Result<String> {
    if sort.is_empty() {
        return Ok(DEFAULT_ORDER
            .iter()
            .map(|(expr, descending)| format!("{} {}", expr, direction(descending ^ reverse)))
            .collect::<Vec<_>>()
            .join(", "));
    }

    let mut items = Vec::with_capacity(sort.len());
    for field in sort {
        let (name, descending) = match field.strip_prefix('-') {
            Some(name) => (name, false),
            None => (field.as_str(), true),
        };
        if !SORT_FIELDS.contains(&name) {
            return Err(Error::Validation(format!("unknown sort field: {name}")));
        }
        items.push(format!("{} {}", name, direction(descending ^ reverse)));
    }
    Ok(items.join(", "))
}

fn datetime_from_ts(ts: Option<i64>) -> Option<DateTime<Local>> {
    ts.and_then(|ts| Local.timestamp_opt(ts, 0).single())
}

fn todo_from_row(
    row: &rusqlite::Row,
    lists: &HashMap<String, TodoList>,
) -> std::result::Result<Todo, rusqlite::Error> {
    let mut todo = Todo::new(None);
    todo.id = Some(row.get(0)?);
    todo.uid = row.get::<_, Option<String>>(1)?.unwrap_or_default();
    todo.summary = row.get::<_, Option<String>>(2)?.unwrap_or_default();
    let due_dt: Option<bool> = row.get(4)?;
    todo.due = row
        .get::<_, Option<i64>>(3)?
        .and_then(|ts| DateValue::from_timestamp(ts, due_dt.unwrap_or(false)));
    let start_dt: Option<bool> = row.get(6)?;
    todo.start = row
        .get::<_, Option<i64>>(5)?
        .and_then(|ts| DateValue::from_timestamp(ts, start_dt.unwrap_or(false)));
    todo.priority = row
        .get::<_, Option<i64>>(7)?
        .and_then(|p| u8::try_from(p).ok())
        .unwrap_or(0);
    todo.created_at = datetime_from_ts(row.get(8)?);
    todo.completed_at = datetime_from_ts(row.get(9)?);
    todo.percent_complete = row
        .get::<_, Option<i64>>(10)?
        .and_then(|p| u8::try_from(p).ok())
        .unwrap_or(0);
    if let Some(dtstamp) = datetime_from_ts(row.get(11)?) {
        todo.dtstamp = dtstamp;
    }
    todo.status = row
        .get::<_, Option<String>>(12)?
        .as_deref()
        .and_then(Status::parse)
        .unwrap_or_default();
    todo.description = row.get::<_, Option<String>>(13)?.unwrap_or_default();
    todo.location = row.get::<_, Option<String>>(14)?.unwrap_or_default();
    todo.categories = row
        .get::<_, Option<String>>(15)?
        .map(|cats| ics::split_text_list(&cats))
        .unwrap_or_default();
    todo.sequence = row.get::<_, Option<i64>>(16)?.unwrap_or(0);
    todo.last_modified = datetime_from_ts(row.get(17)?);
    todo.rrule = row.get::<_, Option<String>>(18)?.unwrap_or_default();

    let list_name: String = row.get(19)?;
    let file_path: String = row.get(20)?;
    todo.filename = Path::new(&file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    todo.list = lists.get(&list_name).cloned();
    Ok(todo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_cache(dir: &tempfile::TempDir) -> Cache {
        Cache::open(&dir.path().join("cache.sqlite3")).unwrap()
    }

    #[test]
    fn add_list_is_idempotent_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        let name = cache
            .add_list("home", Path::new("/tmp/lists/home"), None, 0)
            .unwrap();
        assert_eq!(name, "home");
        // Same path again: no insert, returns the stored name.
        let name = cache
            .add_list("renamed", Path::new("/tmp/lists/home"), None, 0)
            .unwrap();
        assert_eq!(name, "home");
    }

    #[test]
    fn same_name_for_a_different_path_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        cache
            .add_list("home", Path::new("/tmp/lists/a"), None, 0)
            .unwrap();
        let err = cache
            .add_list("home", Path::new("/tmp/lists/b"), None, 0)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: "list", .. }));
    }

    #[test]
    fn revalidate_hits_and_expires() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        cache
            .add_list("home", Path::new("/tmp/lists/home"), None, 0)
            .unwrap();
        let file = Path::new("/tmp/lists/home/a.ics");
        cache.add_file("home", file, 100).unwrap();

        assert!(cache.revalidate(file, 100).unwrap());
        // Changed mtime expires the row; the next check misses entirely.
        assert!(!cache.revalidate(file, 200).unwrap());
        assert!(!cache.revalidate(file, 200).unwrap());
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let err = build_order(&["priority".to_string(), "shoe_size".to_string()], false)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let order = build_order(&["-priority".to_string()], false).unwrap();
        assert_eq!(order, "priority ASC");
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        {
            let cache = Cache::open(&path).unwrap();
            cache
                .add_list("home", Path::new("/tmp/lists/home"), None, 0)
                .unwrap();
            cache.flush().unwrap();
        }
        let cache = Cache::open(&path).unwrap();
        let lists = cache.lists().unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].name, "home");
    }

    #[test]
    fn corrupt_snapshot_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite3");
        fs::write(&path, "not a database").unwrap();
        let cache = Cache::open(&path).unwrap();
        assert!(cache.lists().unwrap().is_empty());
    }
}
