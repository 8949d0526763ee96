pub mod cache;
pub mod cli;
pub mod config;
pub mod database;
pub mod errors;
pub mod ics;
pub mod ids;
pub mod models;
pub mod utils;

pub use cache::{Cache, TodoFilter};
pub use config::Config;
pub use database::Database;
pub use errors::{Error, Result};
pub use models::{Status, Todo, TodoList};
