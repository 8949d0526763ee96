use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::errors::Result;
use crate::models::Todo;

/// Run-scoped numeric ids for todos, written after every listing.
///
/// Maps the 1-based position a todo was printed at to its (list name,
/// filename), so later commands can resolve "task 3" without re-listing.
/// The mapping is presentation-session state only: any cache invalidation
/// or re-listing renumbers it, so it is never treated as an entity key.
#[derive(Debug, Default)]
pub struct IdMap {
    entries: BTreeMap<u32, (String, String)>,
}

impl IdMap {
    /// Number the given todos in listing order, starting at 1.
    pub fn assign(todos: &[Todo]) -> IdMap {
        let entries = todos
            .iter()
            .enumerate()
            .map(|(index, todo)| {
                let list_name = todo
                    .list
                    .as_ref()
                    .map(|list| list.name.clone())
                    .unwrap_or_default();
                (index as u32 + 1, (list_name, todo.filename.clone()))
            })
            .collect();
        IdMap { entries }
    }

    /// Read the id file; a missing or unreadable file is an empty map.
    pub fn load(path: &Path) -> IdMap {
        let Ok(text) = fs::read_to_string(path) else {
            return IdMap::default();
        };
        match serde_json::from_str::<Vec<(u32, (String, String))>>(&text) {
            Ok(pairs) => IdMap {
                entries: pairs.into_iter().collect(),
            },
            Err(err) => {
                debug!(path = %path.display(), "ignoring unreadable id file: {err}");
                IdMap::default()
            }
        }
    }

    pub fn dump(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let pairs: Vec<(&u32, &(String, String))> = self.entries.iter().collect();
        fs::write(path, serde_json::to_string(&pairs)?)?;
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<(&str, &str)> {
        self.entries
            .get(&id)
            .map(|(list, filename)| (list.as_str(), filename.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dump_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids");

        let mut todo = Todo::new(None);
        todo.filename = "a.ics".to_string();
        let map = IdMap::assign(&[todo]);
        map.dump(&path).unwrap();

        let loaded = IdMap::load(&path);
        assert_eq!(loaded.get(1), Some(("", "a.ics")));
        assert_eq!(loaded.get(2), None);
    }

    #[test]
    fn missing_or_corrupt_files_yield_an_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        assert!(IdMap::load(&dir.path().join("missing")).is_empty());

        let path = dir.path().join("ids");
        fs::write(&path, "not json").unwrap();
        assert!(IdMap::load(&path).is_empty());
    }
}
