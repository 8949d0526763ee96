use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDateTime};
use clap::{Args, Parser, Subcommand};

use crate::cache::TodoFilter;
use crate::config::Config;
use crate::database::Database;
use crate::errors::{Error, Result};
use crate::ics::{self, DateValue};
use crate::ids::IdMap;
use crate::models::{self, Todo, TodoList};
use crate::utils;

#[derive(Parser)]
#[command(name = "tdo")]
#[command(about = "Plain-text todos stored as iCalendar files")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List todos; the most urgent ones print last, nearest the prompt
    List(ListArgs),
    /// Show one todo in full
    Show {
        /// Todo id from the last listing
        id: u32,
    },
    /// Create a new todo
    New(NewArgs),
    /// Edit fields of an existing todo
    Edit(EditArgs),
    /// Mark todos as done
    Done {
        #[arg(required = true)]
        ids: Vec<u32>,
    },
    /// Restore completed todos
    Undo {
        #[arg(required = true)]
        ids: Vec<u32>,
    },
    /// Cancel todos without completing them
    Cancel {
        #[arg(required = true)]
        ids: Vec<u32>,
    },
    /// Delete todos and their files
    Delete {
        #[arg(required = true)]
        ids: Vec<u32>,
    },
    /// Move todos to another list
    Move {
        /// Destination list
        #[arg(long)]
        to: String,
        #[arg(required = true)]
        ids: Vec<u32>,
    },
    /// Copy todos to another list
    Copy {
        /// Destination list
        #[arg(long)]
        to: String,
        #[arg(required = true)]
        ids: Vec<u32>,
    },
    /// Show all lists with their colors and counts
    Lists,
    /// Delete every completed todo and reset the cache
    Flush,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only show these lists
    pub lists: Vec<String>,
    /// Include completed todos
    #[arg(long)]
    pub all: bool,
    /// Only priority 9 todos
    #[arg(long)]
    pub urgent: bool,
    /// Only todos with a location containing this string
    #[arg(long)]
    pub location: Option<String>,
    /// Only todos with a category containing this string
    #[arg(long)]
    pub category: Option<String>,
    /// Only todos whose summary contains this string
    #[arg(long)]
    pub grep: Option<String>,
    /// Only todos that have started (or have no start date)
    #[arg(long)]
    pub startable: bool,
    /// Comma-separated sort fields; prefix one with - to flip it
    #[arg(long)]
    pub sort: Option<String>,
    /// Flip the whole ordering
    #[arg(long)]
    pub reverse: bool,
}

#[derive(Args)]
pub struct NewArgs {
    /// Summary text
    #[arg(required = true)]
    pub summary: Vec<String>,
    /// Target list (defaults to the configured default list)
    #[arg(short, long)]
    pub list: Option<String>,
    /// Due date (YYYY-MM-DD or "YYYY-MM-DD HH:MM")
    #[arg(long)]
    pub due: Option<String>,
    /// Start date (same formats as --due)
    #[arg(long)]
    pub start: Option<String>,
    /// 0-9 or none/low/medium/high
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Category; repeat for more than one
    #[arg(long = "category")]
    pub categories: Vec<String>,
}

#[derive(Args)]
pub struct EditArgs {
    /// Todo id from the last listing
    pub id: u32,
    #[arg(long)]
    pub summary: Option<String>,
    /// Due date (YYYY-MM-DD or "YYYY-MM-DD HH:MM")
    #[arg(long)]
    pub due: Option<String>,
    #[arg(long)]
    pub start: Option<String>,
    /// 0-9 or none/low/medium/high
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Replace the categories; repeat for more than one
    #[arg(long = "category")]
    pub categories: Vec<String>,
}

/// Dispatch one parsed command against a freshly scanned database.
pub fn run(command: Commands, config: &Config) -> Result<()> {
    let lists = config.discover_lists()?;
    if lists.is_empty() {
        return Err(Error::NoListsFound(config.path.join(", ")));
    }
    let mut db = Database::new(lists, &config.get_cache_path())?;
    let id_file = config.id_file_path();

    match command {
        Commands::List(args) => handle_list(args, &db, &id_file),
        Commands::Show { id } => handle_show(id, &db, &id_file),
        Commands::New(args) => handle_new(args, &db, config),
        Commands::Edit(args) => handle_edit(args, &db, &id_file),
        Commands::Done { ids } => handle_done(ids, &db, &id_file),
        Commands::Undo { ids } => handle_undo(ids, &db, &id_file),
        Commands::Cancel { ids } => handle_cancel(ids, &db, &id_file),
        Commands::Delete { ids } => handle_delete(ids, &db, &id_file),
        Commands::Move { to, ids } => handle_move(to, ids, &db, &id_file),
        Commands::Copy { to, ids } => handle_copy(to, ids, &db, &id_file),
        Commands::Lists => handle_lists(&db),
        Commands::Flush => handle_flush(&mut db),
    }
}

fn handle_list(args: ListArgs, db: &Database, id_file: &Path) -> Result<()> {
    let sort: Vec<String> = args
        .sort
        .map(|spec| {
            spec.split(',')
                .map(|field| field.trim().to_string())
                .filter(|field| !field.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let filter = TodoFilter {
        include_completed: args.all,
        lists: args.lists,
        urgent: args.urgent,
        location: args.location,
        category: args.category,
        grep: args.grep,
        startable: args.startable,
    };

    let todos = db.todos(&filter, &sort, args.reverse)?;
    for (index, todo) in todos.iter().enumerate() {
        println!("{}", compact_line(Some(index as u32 + 1), todo));
    }
    IdMap::assign(&todos).dump(id_file)
}

fn handle_show(id: u32, db: &Database, id_file: &Path) -> Result<()> {
    let map = IdMap::load(id_file);
    let todo = resolve_with(db, &map, id)?;

    println!("{}", compact_line(Some(id), &todo));
    println!("uid: {}", todo.uid);
    println!("status: {}", todo.status);
    if todo.priority > 0 {
        println!(
            "priority: {} ({})",
            todo.priority,
            models::format_priority(todo.priority)
        );
    }
    if todo.percent_complete > 0 {
        println!("percent complete: {}%", todo.percent_complete);
    }
    if let Some(due) = &todo.due {
        println!("due: {}", format_date(due));
    }
    if let Some(start) = &todo.start {
        println!("start: {}", format_date(start));
    }
    if !todo.categories.is_empty() {
        println!("categories: {}", todo.categories.join(", "));
    }
    if !todo.location.is_empty() {
        println!("location: {}", todo.location);
    }
    if !todo.rrule.is_empty() {
        println!("repeats: {}", todo.rrule);
    }
    if !todo.description.is_empty() {
        println!("\n{}", todo.description);
    }
    Ok(())
}

fn handle_new(args: NewArgs, db: &Database, config: &Config) -> Result<()> {
    let list = pick_list(db, args.list.as_deref(), config)?;
    let mut todo = Todo::new(Some(list));
    todo.summary = args.summary.join(" ");
    todo.due = match &args.due {
        Some(due) => Some(parse_date_arg(due)?),
        None if config.default_due > 0 => Some(DateValue::from_datetime(
            Local::now() + Duration::hours(config.default_due),
        )),
        None => None,
    };
    if let Some(start) = &args.start {
        todo.start = Some(parse_date_arg(start)?);
    }
    todo.priority = match &args.priority {
        Some(priority) => models::parse_priority(priority)?,
        None => config.default_priority.unwrap_or(0),
    };
    todo.location = args.location.unwrap_or_default();
    todo.description = args.description.unwrap_or_default();
    todo.categories = args.categories;

    db.save(&mut todo)?;
    println!("{}", compact_line(None, &todo));
    Ok(())
}

fn handle_edit(args: EditArgs, db: &Database, id_file: &Path) -> Result<()> {
    let map = IdMap::load(id_file);
    let mut todo = resolve_with(db, &map, args.id)?;

    if let Some(summary) = args.summary {
        todo.summary = summary;
    }
    if let Some(due) = &args.due {
        todo.due = Some(parse_date_arg(due)?);
    }
    if let Some(start) = &args.start {
        todo.start = Some(parse_date_arg(start)?);
    }
    if let Some(priority) = &args.priority {
        todo.priority = models::parse_priority(priority)?;
    }
    if let Some(location) = args.location {
        todo.location = location;
    }
    if let Some(description) = args.description {
        todo.description = description;
    }
    if !args.categories.is_empty() {
        todo.categories = args.categories;
    }

    db.save(&mut todo)?;
    println!("{}", compact_line(Some(args.id), &todo));
    Ok(())
}

fn handle_done(ids: Vec<u32>, db: &Database, id_file: &Path) -> Result<()> {
    for_each_todo(db, id_file, ids, |mut todo| {
        if let Some(mut next) = todo.complete()? {
            db.save(&mut next)?;
        }
        db.save(&mut todo)?;
        println!("{}", compact_line(None, &todo));
        Ok(())
    })
}

fn handle_undo(ids: Vec<u32>, db: &Database, id_file: &Path) -> Result<()> {
    for_each_todo(db, id_file, ids, |mut todo| {
        todo.set_completed(false);
        db.save(&mut todo)?;
        println!("{}", compact_line(None, &todo));
        Ok(())
    })
}

fn handle_cancel(ids: Vec<u32>, db: &Database, id_file: &Path) -> Result<()> {
    for_each_todo(db, id_file, ids, |mut todo| {
        todo.cancel();
        db.save(&mut todo)?;
        println!("{}", compact_line(None, &todo));
        Ok(())
    })
}

fn handle_delete(ids: Vec<u32>, db: &Database, id_file: &Path) -> Result<()> {
    for_each_todo(db, id_file, ids, |todo| {
        db.delete(&todo)?;
        println!("deleted: {}", todo.summary);
        Ok(())
    })
}

fn handle_move(to: String, ids: Vec<u32>, db: &Database, id_file: &Path) -> Result<()> {
    let dest = db.list_by_name(&to)?;
    for_each_todo(db, id_file, ids, |todo| {
        db.move_to(&todo, &dest)?;
        println!("moved to {}: {}", dest.name, todo.summary);
        Ok(())
    })
}

fn handle_copy(to: String, ids: Vec<u32>, db: &Database, id_file: &Path) -> Result<()> {
    let dest = db.list_by_name(&to)?;
    for_each_todo(db, id_file, ids, |todo| {
        let mut copy = todo.clone_new();
        copy.list = Some(dest.clone());
        db.save(&mut copy)?;
        println!("{}", compact_line(None, &copy));
        Ok(())
    })
}

fn handle_lists(db: &Database) -> Result<()> {
    let counts = db.list_counts()?;
    for list in db.lists()? {
        let count = counts.get(&list.name).copied().unwrap_or(0);
        match list.colour() {
            Some(colour) => println!("{} {} ({})", list.name, colour, count),
            None => println!("{} ({})", list.name, count),
        }
    }
    Ok(())
}

fn handle_flush(db: &mut Database) -> Result<()> {
    for todo in db.flush_completed()? {
        println!("deleted: {}", todo.summary);
    }
    Ok(())
}

/// Resolve a run-scoped id through the id file to an on-disk record.
fn resolve_with(db: &Database, map: &IdMap, id: u32) -> Result<Todo> {
    if map.is_empty() {
        return Err(Error::Validation(
            "no id mapping found; run `tdo list` first".to_string(),
        ));
    }
    let (list_name, filename) = map.get(id).ok_or(Error::NoSuchTodo(i64::from(id)))?;
    db.todo_at(list_name, filename).map_err(|err| match err {
        Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            Error::NoSuchTodo(i64::from(id))
        }
        other => other,
    })
}

/// Apply an operation per id; missing ids are warned about and skipped so
/// one stale id does not abort a whole batch.
fn for_each_todo(
    db: &Database,
    id_file: &Path,
    ids: Vec<u32>,
    mut apply: impl FnMut(Todo) -> Result<()>,
) -> Result<()> {
    let map = IdMap::load(id_file);
    for id in ids {
        match resolve_with(db, &map, id) {
            Ok(todo) => apply(todo)?,
            Err(Error::NoSuchTodo(missing)) => {
                eprintln!("no todo with id {missing}, skipping");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn pick_list(db: &Database, requested: Option<&str>, config: &Config) -> Result<TodoList> {
    if let Some(name) = requested {
        return db.list_by_name(name);
    }
    if let Some(name) = &config.default_list {
        return db.list_by_name(name);
    }
    let mut lists = db.lists()?;
    if lists.len() == 1 {
        return Ok(lists.remove(0));
    }
    Err(Error::Validation(
        "multiple lists configured; pick one with --list".to_string(),
    ))
}

fn parse_date_arg(input: &str) -> Result<DateValue> {
    if let Ok(date) = utils::parse_date(input) {
        return Ok(DateValue::from_date(date));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Ok(DateValue::from_datetime(ics::local_from_naive(ndt)));
    }
    Err(Error::Validation(format!(
        "unrecognized date: {input}; use YYYY-MM-DD or \"YYYY-MM-DD HH:MM\""
    )))
}

fn format_date(value: &DateValue) -> String {
    if value.date_only {
        value.dt.format("%Y-%m-%d").to_string()
    } else {
        value.dt.format("%Y-%m-%d %H:%M").to_string()
    }
}

fn priority_marks(priority: u8) -> &'static str {
    match priority {
        0 => "",
        1..=4 => "!!!",
        5 => "!!",
        _ => "!",
    }
}

fn compact_line(id: Option<u32>, todo: &Todo) -> String {
    let check = if todo.is_completed() { "X" } else { " " };
    let mut line = match id {
        Some(id) => format!("[{check}] {id:3}"),
        None => format!("[{check}]"),
    };
    let marks = priority_marks(todo.priority);
    if !marks.is_empty() {
        line.push(' ');
        line.push_str(marks);
    }
    if let Some(due) = &todo.due {
        line.push(' ');
        line.push_str(&format_date(due));
    }
    line.push(' ');
    line.push_str(&todo.summary);
    if let Some(list) = &todo.list {
        line.push_str(&format!(" @{list}"));
    }
    if todo.read_only {
        line.push_str(" (read-only)");
    }
    line
}
