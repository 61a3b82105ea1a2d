// 📒 Book - storage gateway for every finance entity
//
// Every public call follows the same protocol:
//
//   1. clear the error flag
//   2. ask the driver for a fresh connection (failure ⇒ flag + neutral value)
//   3. run the statements (a rusqlite transaction when more than one write)
//   4. drop the connection before returning
//
// Mutations return `Result<Change>`; queries return an empty list, `-1` or a
// zero-filled value on failure. In both cases `is_error()` and `last_error()`
// describe the most recent call.

mod accounts;
mod categories;
mod recurrent;
mod transactions;

pub use recurrent::{GenerationFailure, GenerationReport};
pub use transactions::TransactionFilter;
pub(crate) use transactions::account_month_totals;

use rusqlite::Connection;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::BookConfig;
use crate::db;
use crate::driver::{Driver, SqliteDriver};
use crate::error::{BookError, Result};

// ============================================================================
// CALL RESULTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Account,
    Category,
    Transaction,
    RecurrentTransaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Stored,
    Removed,
}

/// Outcome of a successful mutation: which rows were touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub entity: EntityKind,
    pub kind: ChangeKind,
    pub ids: Vec<Uuid>,
}

impl Change {
    pub(crate) fn stored(entity: EntityKind, ids: Vec<Uuid>) -> Self {
        Change { entity, kind: ChangeKind::Stored, ids }
    }

    pub(crate) fn removed(entity: EntityKind, ids: Vec<Uuid>) -> Self {
        Change { entity, kind: ChangeKind::Removed, ids }
    }
}

/// LIMIT/OFFSET window for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: u32) -> Self {
        Page { limit, offset: 0 }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn clause(page: Option<Page>) -> String {
        match page {
            Some(p) => format!(" LIMIT {} OFFSET {}", p.limit, p.offset),
            None => String::new(),
        }
    }
}

// ============================================================================
// BOOK
// ============================================================================

pub struct Book {
    driver: Arc<dyn Driver>,
    last_error: Option<String>,
}

impl Book {
    /// Build a book over `driver` and create any missing table.
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::with_shared_driver(Arc::new(driver))
    }

    pub fn with_shared_driver(driver: Arc<dyn Driver>) -> Self {
        let mut book = Book {
            driver,
            last_error: None,
        };
        // a failed bootstrap is reported through the flag
        let _ = book.init_database();
        book
    }

    /// Book backed by the SQLite file described by `config`. The data
    /// directory is created if absent.
    pub fn from_config(config: &BookConfig) -> Self {
        let driver = SqliteDriver::new(config.database_path());
        match config.ensure_data_dir() {
            Ok(()) => Self::new(driver),
            Err(e) => {
                let mut book = Book {
                    driver: Arc::new(driver),
                    last_error: None,
                };
                book.fail("from_config", &BookError::Io(e));
                book
            }
        }
    }

    /// Create every missing table. Returns the tables created by this call.
    pub fn init_database(&mut self) -> Result<Vec<&'static str>> {
        let location = self.driver.describe();
        let created = self.call("init_database", db::setup_database)?;
        if !created.is_empty() {
            tracing::info!(database = %location, tables = ?created, "schema bootstrapped");
        }
        Ok(created)
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.driver)
    }

    /// True iff the most recent call failed
    pub fn is_error(&self) -> bool {
        self.last_error.is_some()
    }

    /// Error text of the most recent call, if it failed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ========================================================================
    // CALL PROTOCOL
    // ========================================================================

    pub(crate) fn call<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        self.last_error = None;

        let outcome = match self.driver.open() {
            Ok(mut conn) => f(&mut conn),
            Err(e) => Err(BookError::Connection(e)),
        };

        if let Err(e) = &outcome {
            self.fail(operation, e);
        }
        outcome
    }

    /// Listing: empty on failure
    pub(crate) fn query<T: Default>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> T {
        self.call(operation, f).unwrap_or_default()
    }

    /// Count: -1 on failure
    pub(crate) fn count(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Connection) -> Result<i64>,
    ) -> i64 {
        self.call(operation, f).unwrap_or(-1)
    }

    /// Validation failure detected before any connection is opened
    pub(crate) fn reject<T>(&mut self, operation: &'static str, err: BookError) -> Result<T> {
        self.fail(operation, &err);
        Err(err)
    }

    pub(crate) fn fail(&mut self, operation: &'static str, err: &BookError) {
        tracing::error!(operation, error = %err, "book call failed");
        self.last_error = Some(err.to_string());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::entities::{Account, Category, CategoryType};

    pub struct TestBook {
        pub book: Book,
        pub _dir: tempfile::TempDir,
    }

    pub fn temp_book() -> TestBook {
        let dir = tempfile::tempdir().unwrap();
        let book = Book::new(SqliteDriver::new(dir.path().join("book.db")));
        assert!(!book.is_error(), "{:?}", book.last_error());
        TestBook { book, _dir: dir }
    }

    pub fn stored_account(book: &mut Book, name: &str, initial: f64) -> Account {
        let mut account = Account::new(name, initial);
        book.store_account(&mut account).unwrap();
        account
    }

    pub fn stored_category(book: &mut Book, name: &str, category_type: CategoryType) -> Category {
        let mut category = Category::new(name, category_type);
        book.store_category(&mut category).unwrap();
        category
    }

    /// Driver whose connections can never be opened
    pub struct BrokenDriver;

    impl Driver for BrokenDriver {
        fn open(&self) -> rusqlite::Result<Connection> {
            Connection::open_with_flags(
                "/nonexistent-dir/for/sure/book.db",
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE,
            )
        }

        fn describe(&self) -> String {
            "broken".to_string()
        }
    }
}
