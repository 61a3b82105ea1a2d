// 🗄️ Database Schema - table bootstrap and column helpers
//
// The schema is created lazily: on first use the existing tables are listed
// (case-insensitively) and every missing table is created, together with its
// indexes, inside a single transaction. There is no migration framework;
// every statement is idempotent.

use chrono::{Datelike, NaiveDate};
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{BookError, Result};

// ============================================================================
// TABLES
// ============================================================================

pub struct TableDefinition {
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const TABLES: &[TableDefinition] = &[
    TableDefinition {
        name: "Accounts",
        statements: &["CREATE TABLE IF NOT EXISTS Accounts (
            uuid VARCHAR(40) PRIMARY KEY,
            name TEXT NOT NULL,
            memo TEXT,
            color TEXT,
            initialAmount REAL NOT NULL DEFAULT 0,
            amount REAL NOT NULL DEFAULT 0
        )"],
    },
    TableDefinition {
        name: "Categories",
        statements: &[
            "CREATE TABLE IF NOT EXISTS Categories (
                uuid VARCHAR(40) PRIMARY KEY,
                parent VARCHAR(40),
                name TEXT NOT NULL,
                type INTEGER NOT NULL,
                color TEXT
            )",
            "CREATE INDEX IF NOT EXISTS category_parent_index ON Categories(parent)",
        ],
    },
    TableDefinition {
        name: "Transactions",
        statements: &[
            "CREATE TABLE IF NOT EXISTS Transactions (
                uuid VARCHAR(40) PRIMARY KEY,
                account VARCHAR(40) NOT NULL,
                category VARCHAR(40) NOT NULL,
                amount REAL NOT NULL,
                day INTEGER NOT NULL,
                month INTEGER NOT NULL,
                year INTEGER NOT NULL,
                contents TEXT,
                memo TEXT,
                is_recurrent INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS transaction_month_index ON Transactions(year, month)",
            "CREATE INDEX IF NOT EXISTS transaction_category_index ON Transactions(category)",
            "CREATE INDEX IF NOT EXISTS transaction_category_month_index ON Transactions(category, year, month)",
            "CREATE INDEX IF NOT EXISTS transaction_account_index ON Transactions(account)",
        ],
    },
    TableDefinition {
        name: "RecurrentTransactions",
        statements: &[
            "CREATE TABLE IF NOT EXISTS RecurrentTransactions (
                uuid VARCHAR(40) PRIMARY KEY,
                amount REAL NOT NULL,
                account VARCHAR(40) NOT NULL,
                category VARCHAR(40) NOT NULL,
                contents TEXT,
                memo TEXT,
                startDay INTEGER NOT NULL,
                startMonth INTEGER NOT NULL,
                startYear INTEGER NOT NULL,
                lastDay INTEGER,
                lastMonth INTEGER,
                lastYear INTEGER,
                endDay INTEGER,
                endMonth INTEGER,
                endYear INTEGER,
                defaultType INTEGER,
                numberDays INTEGER,
                occurrences INTEGER,
                template VARCHAR(40)
            )",
            "CREATE INDEX IF NOT EXISTS recurrent_category_index ON RecurrentTransactions(category)",
        ],
    },
    TableDefinition {
        name: "RecurrentTransactionRelations",
        statements: &[
            "CREATE TABLE IF NOT EXISTS RecurrentTransactionRelations (
                recurrent_transaction VARCHAR(40) NOT NULL,
                generated_transaction VARCHAR(40) NOT NULL,
                PRIMARY KEY(recurrent_transaction, generated_transaction)
            )",
            "CREATE INDEX IF NOT EXISTS recurrent_generated_index
                ON RecurrentTransactionRelations(generated_transaction)",
        ],
    },
    TableDefinition {
        name: "Attachments",
        statements: &["CREATE TABLE IF NOT EXISTS Attachments (
            uuid VARCHAR(40) PRIMARY KEY,
            name TEXT NOT NULL,
            data BLOB
        )"],
    },
    TableDefinition {
        name: "AttachmentTransactionRelations",
        statements: &["CREATE TABLE IF NOT EXISTS AttachmentTransactionRelations (
            singleTransaction VARCHAR(40) NOT NULL,
            attachment VARCHAR(40) NOT NULL,
            PRIMARY KEY(singleTransaction, attachment)
        )"],
    },
];

/// Lower-cased names of the tables already present
pub fn existing_tables(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .map(|name| name.map(|n| n.to_lowercase()))
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(names)
}

/// Create every missing table. Returns the names of the tables created.
pub fn setup_database(conn: &mut Connection) -> Result<Vec<&'static str>> {
    // WAL must be set outside of a transaction
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let existing = existing_tables(conn)?;
    let missing: Vec<&TableDefinition> = TABLES
        .iter()
        .filter(|table| !existing.contains(&table.name.to_lowercase()))
        .collect();

    if missing.is_empty() {
        tracing::debug!("all tables present");
        return Ok(Vec::new());
    }

    let tx = conn.transaction()?;
    for table in &missing {
        tracing::info!(table = table.name, "creating missing table");
        for statement in table.statements {
            tx.execute_batch(statement)?;
        }
    }
    tx.commit()?;

    Ok(missing.iter().map(|table| table.name).collect())
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

pub fn conversion_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidColumn(pub String);

pub fn uuid_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(index, e))
}

pub fn optional_uuid_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(index, e)))
        .transpose()
}

/// Read a date stored as (day, month, year) columns starting at `index`
pub fn date_columns(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<NaiveDate> {
    optional_date_columns(row, index)?.ok_or_else(|| {
        conversion_error(index, InvalidColumn("missing date".to_string()))
    })
}

pub fn optional_date_columns(
    row: &rusqlite::Row<'_>,
    index: usize,
) -> rusqlite::Result<Option<NaiveDate>> {
    let day: Option<u32> = row.get(index)?;
    let month: Option<u32> = row.get(index + 1)?;
    let year: Option<i32> = row.get(index + 2)?;

    match (day, month, year) {
        (Some(d), Some(m), Some(y)) => NaiveDate::from_ymd_opt(y, m, d)
            .map(Some)
            .ok_or_else(|| conversion_error(index, InvalidColumn(format!("invalid date {}/{}/{}", d, m, y)))),
        _ => Ok(None),
    }
}

/// (day, month, year) values to bind, NULLs when absent
pub fn date_values(date: Option<NaiveDate>) -> [Value; 3] {
    match date {
        Some(d) => [
            Value::Integer(i64::from(d.day())),
            Value::Integer(i64::from(d.month())),
            Value::Integer(i64::from(d.year())),
        ],
        None => [Value::Null, Value::Null, Value::Null],
    }
}

// ============================================================================
// SHARED WRITES
// ============================================================================

/// Shift an account balance by `delta`. Fails when the account row is gone.
pub fn apply_balance(conn: &Connection, account: &Uuid, delta: f64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE Accounts SET amount = amount + ?1 WHERE uuid = ?2",
        params![delta, account.to_string()],
    )?;
    if updated == 0 {
        return Err(BookError::MissingReference {
            kind: "Account",
            id: *account,
        });
    }
    Ok(())
}

/// Like `apply_balance`, but a removed account is skipped. Returns whether
/// a balance was shifted.
pub fn shift_existing_balance(conn: &Connection, account: &Uuid, delta: f64) -> Result<bool> {
    if account_balance(conn, account)?.is_none() {
        return Ok(false);
    }
    apply_balance(conn, account, delta)?;
    Ok(true)
}

pub fn account_balance(conn: &Connection, account: &Uuid) -> Result<Option<f64>> {
    let amount = conn
        .query_row(
            "SELECT amount FROM Accounts WHERE uuid = ?1",
            [account.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_connection() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("schema.db")).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_setup_creates_all_tables_once() {
        let (_dir, mut conn) = temp_connection();

        let created = setup_database(&mut conn).unwrap();
        assert_eq!(created.len(), TABLES.len());

        let existing = existing_tables(&conn).unwrap();
        for table in TABLES {
            assert!(existing.contains(&table.name.to_lowercase()));
        }

        // second bootstrap is a no-op
        let created_again = setup_database(&mut conn).unwrap();
        assert!(created_again.is_empty());
    }

    #[test]
    fn test_setup_only_creates_missing_tables() {
        let (_dir, mut conn) = temp_connection();
        conn.execute_batch(
            "CREATE TABLE accounts (uuid VARCHAR(40) PRIMARY KEY, name TEXT NOT NULL, memo TEXT,
             color TEXT, initialAmount REAL NOT NULL DEFAULT 0, amount REAL NOT NULL DEFAULT 0)",
        )
        .unwrap();

        let created = setup_database(&mut conn).unwrap();

        assert!(!created.contains(&"Accounts"));
        assert_eq!(created.len(), TABLES.len() - 1);
    }

    #[test]
    fn test_apply_balance_on_missing_account_fails() {
        let (_dir, mut conn) = temp_connection();
        setup_database(&mut conn).unwrap();

        let err = apply_balance(&conn, &Uuid::new_v4(), 10.0).unwrap_err();
        assert!(matches!(err, BookError::MissingReference { kind: "Account", .. }));
    }

    #[test]
    fn test_shift_existing_balance_skips_removed_accounts() {
        let (_dir, mut conn) = temp_connection();
        setup_database(&mut conn).unwrap();
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO Accounts (uuid, name, initialAmount, amount) VALUES (?1, 'Cash', 0, 0)",
            [id.to_string()],
        )
        .unwrap();

        assert!(shift_existing_balance(&conn, &id, -12.5).unwrap());
        assert_eq!(account_balance(&conn, &id).unwrap(), Some(-12.5));
        assert!(!shift_existing_balance(&conn, &Uuid::new_v4(), 10.0).unwrap());
    }

    #[test]
    fn test_invalid_date_reports_the_column_text() {
        let (_dir, conn) = temp_connection();

        let err = conn
            .query_row("SELECT 31, 2, 2025", [], |row| date_columns(row, 0))
            .unwrap_err();

        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(0, _, _)));
        assert!(err.to_string().contains("invalid date 31/2/2025"));
        let boxed: Box<dyn std::error::Error> = Box::new(InvalidColumn("missing date".to_string()));
        assert_eq!(boxed.to_string(), "missing date");
    }

    #[test]
    fn test_date_values_round_trip_through_columns() {
        let (_dir, conn) = temp_connection();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let values = date_values(Some(date));

        let read = conn
            .query_row(
                "SELECT ?1, ?2, ?3, NULL, NULL, NULL",
                rusqlite::params_from_iter(values.iter()),
                |row| Ok((date_columns(row, 0)?, optional_date_columns(row, 3)?)),
            )
            .unwrap();

        assert_eq!(read, (date, None));
    }
}
