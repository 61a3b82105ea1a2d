// 🔌 Storage Driver - how the Book gets a database connection
//
// The Book never builds connections itself: it is handed a `Driver` at
// construction time and asks it for a fresh connection on every call. Tests
// inject their own drivers (temporary files, drivers that refuse to open).

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

pub trait Driver: Send + Sync {
    /// Open a new connection. The caller drops it before returning.
    fn open(&self) -> rusqlite::Result<Connection>;

    /// Human readable location, for logs
    fn describe(&self) -> String;
}

/// SQLite database stored in a single file
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    path: PathBuf,
}

impl SqliteDriver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SqliteDriver { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Driver for SqliteDriver {
    fn open(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // bundled builds enforce foreign keys by default; removed accounts
        // and categories must leave their transactions behind
        conn.pragma_update(None, "foreign_keys", false)?;
        Ok(conn)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_driver_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::new(dir.path().join("book.db"));

        let conn = driver.open().unwrap();
        conn.execute_batch("CREATE TABLE t(x INTEGER)").unwrap();
        drop(conn);

        assert!(driver.path().exists());
        assert!(driver.describe().ends_with("book.db"));
    }

    #[test]
    fn test_sqlite_driver_disables_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SqliteDriver::new(dir.path().join("book.db"));

        let conn = driver.open().unwrap();
        let enforced: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();

        assert_eq!(enforced, 0);
    }

    #[test]
    fn test_sqlite_driver_fails_on_missing_dir() {
        let driver = SqliteDriver::new("/nonexistent-dir/for/sure/book.db");
        assert!(driver.open().is_err());
    }
}
