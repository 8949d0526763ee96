use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::cache::{Cache, TodoFilter};
use crate::errors::{Error, Result};
use crate::ics::{self, Component};
use crate::models::{self, Todo, TodoList};
use crate::utils;

/// Coordinates the configured list directories and the cache: scans for
/// stale files, reparses what changed, and routes queries to the store.
#[derive(Debug)]
pub struct Database {
    cache: Cache,
    paths: Vec<PathBuf>,
}

impl Database {
    /// Open the cache and bring it in sync with the list directories.
    pub fn new(paths: Vec<PathBuf>, cache_path: &Path) -> Result<Self> {
        let db = Database {
            cache: Cache::open(cache_path)?,
            paths,
        };
        db.scan()?;
        Ok(db)
    }

    /// One synchronization pass: expire lists that left the configuration,
    /// upsert the rest, revalidate every task file by mtime and reparse the
    /// misses. Corrupt files are skipped, never fatal.
    pub fn scan(&self) -> Result<()> {
        let list_mtimes: HashMap<PathBuf, i64> = self
            .paths
            .iter()
            .map(|path| (path.clone(), TodoList::mtime_for_path(path)))
            .collect();
        self.cache.expire_lists(&list_mtimes)?;

        let mut entries: Vec<(PathBuf, String, i64)> = Vec::new();
        let mut fresh: HashMap<PathBuf, i64> = HashMap::new();

        for path in &self.paths {
            let list = TodoList::from_path(path);
            let list_name =
                self.cache
                    .add_list(&list.name, path, list.colour(), list_mtimes[path])?;

            for entry in fs::read_dir(path)? {
                let entry_path = entry?.path();
                let is_task_file = entry_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with(".ics"))
                    .unwrap_or(false);
                if !is_task_file {
                    continue;
                }
                let Some(mtime) = utils::mtime_ns(&entry_path) else {
                    continue;
                };
                fresh.insert(entry_path.clone(), mtime);
                entries.push((entry_path, list_name.clone(), mtime));
            }
        }

        self.cache.expire_files(&fresh)?;

        for (entry_path, list_name, mtime) in entries {
            if self.cache.revalidate(&entry_path, mtime)? {
                continue;
            }
            if let Err(err) = self.add_entry(&list_name, &entry_path, mtime) {
                warn!(path = %entry_path.display(), "skipping unreadable todo file: {err}");
            }
        }

        self.cache.flush()
    }

    fn add_entry(&self, list_name: &str, path: &Path, mtime: i64) -> Result<()> {
        // Parse before touching the cache so a corrupt file leaves no row
        // behind and gets another chance on the next scan.
        let cal = ics::parse(&fs::read_to_string(path)?)?;
        match self.cache.add_file(list_name, path, mtime) {
            Err(Error::AlreadyExists { .. }) => {
                debug!(path = %path.display(), "file already in cache");
                return Ok(());
            }
            result => result?,
        }
        for component in cal.subcomponents("VTODO") {
            let todo = Todo::from_vtodo(component)?;
            self.cache.add_todo(&todo, path, None)?;
        }
        Ok(())
    }

    pub fn todos(&self, filter: &TodoFilter, sort: &[String], reverse: bool) -> Result<Vec<Todo>> {
        let mut filter = filter.clone();
        // Requested list names must exist; match them case-insensitively
        // and query with the canonical name.
        for name in &mut filter.lists {
            *name = self.list_by_name(name)?.name;
        }
        self.cache.todos(&filter, sort, reverse)
    }

    /// Resolve a cache row id, reloading the record from its source file.
    pub fn todo(&self, id: i64) -> Result<Todo> {
        self.cache.todo(id)
    }

    /// Load one todo by list and filename, straight from disk.
    pub fn todo_at(&self, list_name: &str, filename: &str) -> Result<Todo> {
        let list = self.list_by_name(list_name)?;
        models::validate_filename(filename)?;
        let path = list.path.join(filename);

        let cal = ics::parse(&fs::read_to_string(&path)?)?;
        let vtodos: Vec<&Component> = cal.subcomponents("VTODO").collect();
        let component = vtodos.first().copied().ok_or_else(|| {
            Error::Validation(format!("no todo component in {}", path.display()))
        })?;

        let mut todo = Todo::from_vtodo(component)?;
        todo.read_only = vtodos.len() > 1;
        todo.filename = filename.to_string();
        todo.list = Some(list);
        Ok(todo)
    }

    pub fn lists(&self) -> Result<Vec<TodoList>> {
        self.cache.lists()
    }

    pub fn list_by_name(&self, name: &str) -> Result<TodoList> {
        self.lists()?
            .into_iter()
            .find(|list| list.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::NoListsFound(name.to_string()))
    }

    /// Cached todo count per list name.
    pub fn list_counts(&self) -> Result<HashMap<String, i64>> {
        self.cache.counts_by_list()
    }

    /// Write a todo back to its file and refresh its cache rows.
    ///
    /// The matching-uid component is replaced in place, leaving sibling
    /// components and unmanaged properties untouched; without a match a new
    /// calendar wrapper is created. The write is temp-then-rename so readers
    /// never observe a partial file.
    pub fn save(&self, todo: &mut Todo) -> Result<()> {
        let path = todo.path()?;
        if todo.read_only {
            return Err(Error::ReadOnly(path));
        }

        todo.sequence += 1;
        todo.last_modified = Some(Local::now());

        let mut cal = if path.exists() {
            ics::parse(&fs::read_to_string(&path)?)?
        } else {
            ics::new_calendar()
        };
        let position = cal.components.iter().position(|c| {
            c.name.eq_ignore_ascii_case("VTODO")
                && c.prop_value("UID").map(str::trim) == Some(todo.uid.trim())
        });
        match position {
            Some(index) => todo.apply_to(&mut cal.components[index]),
            None => {
                let mut vtodo = Component::new("VTODO");
                todo.apply_to(&mut vtodo);
                cal.components.push(vtodo);
            }
        }
        write_atomic(&path, &cal.to_ics())?;

        let list_name = todo
            .list
            .as_ref()
            .map(|list| list.name.clone())
            .unwrap_or_default();
        self.cache.expire_file(&path)?;
        let mtime = utils::mtime_ns(&path).unwrap_or(0);
        self.cache.add_file(&list_name, &path, mtime)?;
        todo.id = Some(self.cache.add_todo(todo, &path, todo.id)?);
        self.cache.flush()
    }

    /// Move the backing file into another list's directory.
    pub fn move_to(&self, todo: &Todo, new_list: &TodoList) -> Result<()> {
        let orig_path = todo.path()?;
        let dest_path = new_list.path.join(&todo.filename);
        if dest_path.exists() {
            return Err(Error::AlreadyExists {
                kind: "file",
                name: todo.filename.clone(),
            });
        }
        fs::rename(&orig_path, &dest_path)?;
        self.cache.expire_file(&orig_path)?;
        self.cache.flush()
    }

    /// Remove the backing file and its cache rows.
    pub fn delete(&self, todo: &Todo) -> Result<()> {
        let path = todo.path()?;
        fs::remove_file(&path)?;
        self.cache.expire_file(&path)?;
        self.cache.flush()
    }

    /// Delete every completed todo, then reset the cache and rescan.
    pub fn flush_completed(&mut self) -> Result<Vec<Todo>> {
        let filter = TodoFilter {
            include_completed: true,
            ..TodoFilter::default()
        };
        let mut removed = Vec::new();
        for todo in self.cache.todos(&filter, &[], false)? {
            if todo.is_completed() {
                self.delete(&todo)?;
                removed.push(todo);
            }
        }
        self.cache.clear()?;
        self.scan()?;
        Ok(removed)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        Error::Validation(format!("cannot write to {}", path.display()))
    })?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path).map_err(|err| Error::Io(err.error))?;
    Ok(())
}
