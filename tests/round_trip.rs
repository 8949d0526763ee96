use std::fs;
use std::path::{Path, PathBuf};

use chrono::TimeZone;
use pretty_assertions::assert_eq;
use tdo::ics::DateValue;
use tdo::{Database, Status, Todo};

fn make_list(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir(&dir).unwrap();
    dir
}

#[test]
fn saved_fields_survive_a_reparse() {
    let tmp = tempfile::TempDir::new().unwrap();
    let work = make_list(tmp.path(), "work");
    let db = Database::new(vec![work], &tmp.path().join("cache.sqlite3")).unwrap();

    let mut todo = Todo::new(Some(db.list_by_name("work").unwrap()));
    todo.summary = "pay rent; transfer, confirm".to_string();
    todo.description = "first line\nsecond line".to_string();
    todo.location = "bank".to_string();
    todo.categories = vec!["money".to_string(), "home, admin".to_string()];
    todo.priority = 4;
    todo.percent_complete = 25;
    todo.status = Status::InProcess;
    todo.due = Some(DateValue::from_date(
        chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
    ));
    todo.start = Some(DateValue::from_datetime(
        chrono::Local.with_ymd_and_hms(2024, 2, 25, 9, 30, 0).unwrap(),
    ));
    todo.rrule = "FREQ=MONTHLY".to_string();
    db.save(&mut todo).unwrap();

    let loaded = db.todo_at("work", &todo.filename).unwrap();
    assert_eq!(loaded.uid, todo.uid);
    assert_eq!(loaded.summary, todo.summary);
    assert_eq!(loaded.description, todo.description);
    assert_eq!(loaded.location, todo.location);
    assert_eq!(loaded.categories, todo.categories);
    assert_eq!(loaded.priority, todo.priority);
    assert_eq!(loaded.percent_complete, todo.percent_complete);
    assert_eq!(loaded.status, todo.status);
    assert_eq!(loaded.due, todo.due);
    assert_eq!(loaded.start, todo.start);
    assert_eq!(loaded.rrule, todo.rrule);
    assert!(!loaded.read_only);
}

#[test]
fn unknown_properties_survive_a_save() {
    let tmp = tempfile::TempDir::new().unwrap();
    let work = make_list(tmp.path(), "work");
    let file = work.join("task.ics");
    fs::write(
        &file,
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTODO\r\nUID:t1\r\n\
         DTSTAMP:20240301T000000Z\r\nSUMMARY:original\r\n\
         X-FANCY-CLIENT-META:keep me\r\nEND:VTODO\r\nEND:VCALENDAR\r\n",
    )
    .unwrap();

    let db = Database::new(vec![work], &tmp.path().join("cache.sqlite3")).unwrap();
    let mut todo = db.todo_at("work", "task.ics").unwrap();
    todo.summary = "renamed".to_string();
    db.save(&mut todo).unwrap();

    let text = fs::read_to_string(&file).unwrap();
    assert!(text.contains("X-FANCY-CLIENT-META:keep me"));
    assert!(text.contains("SUMMARY:renamed"));
    assert!(!text.contains("SUMMARY:original"));

    let reloaded = db.todo_at("work", "task.ics").unwrap();
    assert_eq!(reloaded.summary, "renamed");
    assert_eq!(reloaded.uid, "t1");
}

#[test]
fn sibling_components_survive_a_save() {
    let tmp = tempfile::TempDir::new().unwrap();
    let work = make_list(tmp.path(), "work");
    let file = work.join("task.ics");
    fs::write(
        &file,
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\n\
         BEGIN:VTIMEZONE\r\nTZID:Europe/Amsterdam\r\nEND:VTIMEZONE\r\n\
         BEGIN:VTODO\r\nUID:t1\r\nDTSTAMP:20240301T000000Z\r\nSUMMARY:original\r\nEND:VTODO\r\n\
         END:VCALENDAR\r\n",
    )
    .unwrap();

    let db = Database::new(vec![work], &tmp.path().join("cache.sqlite3")).unwrap();
    let mut todo = db.todo_at("work", "task.ics").unwrap();
    assert!(!todo.read_only);
    todo.summary = "renamed".to_string();
    db.save(&mut todo).unwrap();

    let text = fs::read_to_string(&file).unwrap();
    assert!(text.contains("BEGIN:VTIMEZONE"));
    assert!(text.contains("TZID:Europe/Amsterdam"));
    assert!(text.contains("SUMMARY:renamed"));
}

#[test]
fn cleared_fields_leave_no_markers_in_the_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let work = make_list(tmp.path(), "work");
    let db = Database::new(vec![work], &tmp.path().join("cache.sqlite3")).unwrap();

    let mut todo = Todo::new(Some(db.list_by_name("work").unwrap()));
    todo.summary = "tidy".to_string();
    todo.location = "garage".to_string();
    db.save(&mut todo).unwrap();

    todo.location = String::new();
    db.save(&mut todo).unwrap();

    let text = fs::read_to_string(db.list_by_name("work").unwrap().path.join(&todo.filename))
        .unwrap();
    assert!(!text.contains("LOCATION"));
}
