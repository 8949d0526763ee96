use std::cell::OnceCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::ics::{self, Component, DateValue, Property, Rrule};
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    NeedsAction,
    InProcess,
    Completed,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NeedsAction => "NEEDS-ACTION",
            Status::InProcess => "IN-PROCESS",
            Status::Completed => "COMPLETED",
            Status::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Status> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEEDS-ACTION" => Some(Status::NeedsAction),
            "IN-PROCESS" => Some(Status::InProcess),
            "COMPLETED" => Some(Status::Completed),
            "CANCELLED" => Some(Status::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket label for a 0-9 priority.
pub fn format_priority(priority: u8) -> &'static str {
    match priority {
        0 => "none",
        1..=4 => "high",
        5 => "medium",
        _ => "low",
    }
}

/// Accepts a numeric priority or one of the bucket names.
pub fn parse_priority(input: &str) -> Result<u8> {
    match input.trim().to_ascii_lowercase().as_str() {
        "none" => Ok(0),
        "high" => Ok(4),
        "medium" => Ok(5),
        "low" => Ok(9),
        other => other
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 9)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "priority must be 0-9 or one of low, medium, high, none: {input}"
                ))
            }),
    }
}

/// A filename later gets joined onto a list directory, so it must be a bare
/// name without separators.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty()
        || Path::new(filename).is_absolute()
        || filename.contains(std::path::is_separator)
    {
        return Err(Error::Validation(format!(
            "must be a bare file name: {filename}"
        )));
    }
    Ok(())
}

fn generate_uid() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{}@{}", Uuid::new_v4().simple(), host)
}

/// A named, optionally colored directory of task files.
#[derive(Debug, Clone)]
pub struct TodoList {
    pub name: String,
    pub path: PathBuf,
    colour: OnceCell<Option<String>>,
}

impl PartialEq for TodoList {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.name == other.name
    }
}

impl Eq for TodoList {}

impl fmt::Display for TodoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TodoList {
    pub fn from_path(path: &Path) -> Self {
        TodoList {
            name: Self::name_for_path(path),
            path: path.to_path_buf(),
            colour: OnceCell::new(),
        }
    }

    /// Rebuild a list from cached values, skipping the directory reads.
    pub fn with_colour(name: String, path: PathBuf, colour: Option<String>) -> Self {
        TodoList {
            name,
            path,
            colour: OnceCell::from(colour),
        }
    }

    /// The list colour, read from the `color` file on first access.
    pub fn colour(&self) -> Option<&str> {
        self.colour
            .get_or_init(|| Self::colour_for_path(&self.path))
            .as_deref()
    }

    /// A `displayname` file overrides the directory's base name.
    pub fn name_for_path(path: &Path) -> String {
        if let Ok(name) = fs::read_to_string(path.join("displayname")) {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    fn colour_for_path(path: &Path) -> Option<String> {
        let colour = fs::read_to_string(path.join("color")).ok()?;
        let colour = colour.trim();
        (!colour.is_empty()).then(|| colour.to_string())
    }

    /// Newest mtime among the list's metadata files; 0 when there are none.
    pub fn mtime_for_path(path: &Path) -> i64 {
        ["color", "displayname"]
            .iter()
            .filter_map(|name| utils::mtime_ns(&path.join(name)))
            .max()
            .unwrap_or(0)
    }
}

/// One task. Wraps the fields of a VTODO component, with text fields
/// defaulting to "" and date fields normalized to timezone-aware values.
#[derive(Debug, Clone)]
pub struct Todo {
    /// Cache row id; None until the todo has been through the cache.
    pub id: Option<i64>,
    pub uid: String,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub categories: Vec<String>,
    pub status: Status,
    pub percent_complete: u8,
    pub priority: u8,
    pub due: Option<DateValue>,
    pub start: Option<DateValue>,
    pub created_at: Option<DateTime<Local>>,
    pub completed_at: Option<DateTime<Local>>,
    pub dtstamp: DateTime<Local>,
    pub last_modified: Option<DateTime<Local>>,
    pub sequence: i64,
    pub rrule: String,
    pub filename: String,
    pub list: Option<TodoList>,
    /// Set when the source file holds more than one VTODO; such records
    /// refuse to be written back.
    pub read_only: bool,
}

impl Todo {
    /// A fresh todo with a generated uid and dtstamp/created-at of now.
    pub fn new(list: Option<TodoList>) -> Self {
        let now = Local::now();
        let uid = generate_uid();
        let filename = format!("{uid}.ics");
        Todo {
            id: None,
            uid,
            summary: String::new(),
            description: String::new(),
            location: String::new(),
            categories: Vec::new(),
            status: Status::NeedsAction,
            percent_complete: 0,
            priority: 0,
            due: None,
            start: None,
            created_at: Some(now),
            completed_at: None,
            dtstamp: now,
            last_modified: None,
            sequence: 0,
            rrule: String::new(),
            filename,
            list,
            read_only: false,
        }
    }

    pub fn with_filename(list: Option<TodoList>, filename: String) -> Result<Self> {
        validate_filename(&filename)?;
        let mut todo = Todo::new(list);
        todo.filename = filename;
        Ok(todo)
    }

    /// Full path of the backing file.
    pub fn path(&self) -> Result<PathBuf> {
        let list = self.list.as_ref().ok_or_else(|| {
            Error::Validation("a todo without a list does not have a path".to_string())
        })?;
        validate_filename(&self.filename)?;
        Ok(list.path.join(&self.filename))
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
            || matches!(self.status, Status::Completed | Status::Cancelled)
    }

    pub fn is_recurring(&self) -> bool {
        !self.rrule.is_empty()
    }

    /// Mark complete or restore. Completing an already-completed todo is a
    /// no-op so an existing completion timestamp is never clobbered.
    pub fn set_completed(&mut self, completed: bool) {
        if completed {
            if self.is_completed() {
                return;
            }
            self.completed_at = Some(Local::now());
            self.percent_complete = 100;
            self.status = Status::Completed;
        } else {
            self.completed_at = None;
            self.percent_complete = 0;
            self.status = Status::NeedsAction;
        }
    }

    pub fn cancel(&mut self) {
        self.status = Status::Cancelled;
    }

    /// Complete this todo. For a recurring todo the next occurrence is
    /// synthesized first (rule retained, due/start shifted one period) and
    /// returned so the caller can persist both records together; the rule is
    /// stripped from the completed occurrence.
    pub fn complete(&mut self) -> Result<Option<Todo>> {
        if self.is_completed() {
            return Ok(None);
        }
        let next = if self.is_recurring() {
            let rule = Rrule::parse(&self.rrule)?;
            let mut copy = self.clone_new();
            copy.due = self.due.and_then(|due| rule.advance(due));
            copy.start = self.start.and_then(|start| rule.advance(start));
            self.rrule = String::new();
            Some(copy)
        } else {
            None
        };
        self.set_completed(true);
        Ok(next)
    }

    /// A copy with a fresh uid, a filename derived from it, and no cache id.
    pub fn clone_new(&self) -> Todo {
        let mut copy = self.clone();
        let uid = generate_uid();
        copy.filename = format!("{uid}.ics");
        copy.uid = uid;
        copy.id = None;
        copy.read_only = false;
        copy
    }

    /// Build a todo from a parsed VTODO component.
    pub fn from_vtodo(comp: &Component) -> Result<Todo> {
        let mut todo = Todo::new(None);
        todo.created_at = None;
        if let Some(uid) = comp.prop_value("UID") {
            todo.uid = uid.trim().to_string();
            todo.filename = format!("{}.ics", todo.uid);
        }
        todo.summary = comp
            .prop_value("SUMMARY")
            .map(ics::unescape_text)
            .unwrap_or_default();
        todo.description = comp
            .prop_value("DESCRIPTION")
            .map(ics::unescape_text)
            .unwrap_or_default();
        todo.location = comp
            .prop_value("LOCATION")
            .map(ics::unescape_text)
            .unwrap_or_default();
        todo.categories = comp
            .props("CATEGORIES")
            .flat_map(|p| ics::split_text_list(&p.value))
            .collect();
        todo.status = comp
            .prop_value("STATUS")
            .and_then(Status::parse)
            .unwrap_or_default();
        todo.priority = comp
            .prop_value("PRIORITY")
            .and_then(|v| v.trim().parse::<u8>().ok())
            .filter(|p| *p <= 9)
            .unwrap_or(0);
        todo.percent_complete = comp
            .prop_value("PERCENT-COMPLETE")
            .and_then(|v| v.trim().parse::<u8>().ok())
            .filter(|p| *p <= 100)
            .unwrap_or(0);
        todo.due = comp.prop("DUE").map(ics::parse_date_prop).transpose()?;
        todo.start = comp.prop("DTSTART").map(ics::parse_date_prop).transpose()?;
        todo.created_at = comp
            .prop("CREATED")
            .map(ics::parse_datetime_prop)
            .transpose()?;
        todo.completed_at = comp
            .prop("COMPLETED")
            .map(ics::parse_datetime_prop)
            .transpose()?;
        if let Some(prop) = comp.prop("DTSTAMP") {
            todo.dtstamp = ics::parse_datetime_prop(prop)?;
        }
        todo.last_modified = comp
            .prop("LAST-MODIFIED")
            .map(ics::parse_datetime_prop)
            .transpose()?;
        todo.sequence = comp
            .prop_value("SEQUENCE")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);
        todo.rrule = comp.prop_value("RRULE").unwrap_or_default().to_string();
        Ok(todo)
    }

    /// Write this todo's fields into a VTODO component. Every managed
    /// property is cleared first and only re-added when the field is set, so
    /// empty values never leave markers behind; properties this tool does
    /// not manage are left untouched.
    pub fn apply_to(&self, vtodo: &mut Component) {
        vtodo.remove_prop("SUMMARY");
        if !self.summary.is_empty() {
            vtodo.push_prop(Property::new("SUMMARY", ics::escape_text(&self.summary)));
        }
        vtodo.remove_prop("PRIORITY");
        if self.priority > 0 {
            vtodo.push_prop(Property::new("PRIORITY", self.priority.to_string()));
        }
        vtodo.remove_prop("SEQUENCE");
        if self.sequence > 0 {
            vtodo.push_prop(Property::new("SEQUENCE", self.sequence.to_string()));
        }
        vtodo.remove_prop("UID");
        if !self.uid.is_empty() {
            vtodo.push_prop(Property::new("UID", self.uid.clone()));
        }
        vtodo.remove_prop("CATEGORIES");
        if !self.categories.is_empty() {
            vtodo.push_prop(Property::new(
                "CATEGORIES",
                ics::join_text_list(&self.categories),
            ));
        }
        vtodo.remove_prop("COMPLETED");
        if let Some(completed_at) = &self.completed_at {
            vtodo.push_prop(ics::datetime_property("COMPLETED", completed_at));
        }
        vtodo.remove_prop("DESCRIPTION");
        if !self.description.is_empty() {
            vtodo.push_prop(Property::new(
                "DESCRIPTION",
                ics::escape_text(&self.description),
            ));
        }
        vtodo.remove_prop("DTSTAMP");
        vtodo.push_prop(ics::datetime_property("DTSTAMP", &self.dtstamp));
        vtodo.remove_prop("DTSTART");
        if let Some(start) = &self.start {
            vtodo.push_prop(ics::date_property("DTSTART", start));
        }
        vtodo.remove_prop("DUE");
        if let Some(due) = &self.due {
            vtodo.push_prop(ics::date_property("DUE", due));
        }
        vtodo.remove_prop("LOCATION");
        if !self.location.is_empty() {
            vtodo.push_prop(Property::new("LOCATION", ics::escape_text(&self.location)));
        }
        vtodo.remove_prop("PERCENT-COMPLETE");
        if self.percent_complete > 0 {
            vtodo.push_prop(Property::new(
                "PERCENT-COMPLETE",
                self.percent_complete.to_string(),
            ));
        }
        vtodo.remove_prop("STATUS");
        vtodo.push_prop(Property::new("STATUS", self.status.as_str()));
        vtodo.remove_prop("CREATED");
        if let Some(created_at) = &self.created_at {
            vtodo.push_prop(ics::datetime_property("CREATED", created_at));
        }
        vtodo.remove_prop("LAST-MODIFIED");
        if let Some(last_modified) = &self.last_modified {
            vtodo.push_prop(ics::datetime_property("LAST-MODIFIED", last_modified));
        }
        vtodo.remove_prop("RRULE");
        if !self.rrule.is_empty() {
            vtodo.push_prop(Property::new("RRULE", self.rrule.clone()));
        }
    }
}
