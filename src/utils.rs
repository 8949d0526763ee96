use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::NaiveDate;
use directories::{BaseDirs, ProjectDirs};

/// Get the configuration directory path for tdo
pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "tdo", "tdo").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the cache directory path for tdo (snapshot and id files live here)
pub fn get_cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "tdo", "tdo").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Nanosecond mtime of a file, used as the cache staleness witness.
pub fn mtime_ns(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_nanos()).ok()
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtime_is_present_for_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x");
        std::fs::write(&file, "hi").unwrap();
        assert!(mtime_ns(&file).is_some());
        assert!(mtime_ns(&dir.path().join("missing")).is_none());
    }

    #[test]
    fn parse_date_accepts_iso_dates() {
        assert!(parse_date("2024-03-01").is_ok());
        assert!(parse_date("03/01/2024").is_err());
    }
}
