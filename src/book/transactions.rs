// 💸 Transactions - balance-keeping writes and filtered listings
//
// Writing a transaction always touches two tables: the transaction row and
// the balance of its account. Both happen inside one rusqlite transaction,
// so a failed write leaves balances exactly as they were.
//
// Sign rule: the stored amount is normalized by the type of the category as
// stored in the database (expenses ≤ 0, income ≥ 0). The caller's category
// snapshot is never trusted for that.

use chrono::Datelike;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::accounts::account_from_row;
use super::categories::{category_from_row, stored_category_type};
use super::{Book, Change, EntityKind, Page};
use crate::db;
use crate::entities::{Account, Attachment, Category, CategoryType, RecurrentTransaction, Transaction};
use crate::error::{BookError, Result};

// ============================================================================
// FILTERS
// ============================================================================

/// Predicate shared by `Book::transactions` and `Book::number_of_transactions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionFilter {
    All,
    Month { month: u32, year: i32 },
    Day { day: u32, month: u32, year: i32 },
    Category { category: Uuid, month_year: Option<(u32, i32)> },
    Account { account: Uuid, year: Option<i32> },
    /// Transactions generated by a recurrent template (template included)
    Recurrent { recurrent: Uuid },
}

/// Unstored entities filter on the nil UUID, which never matches a row
fn id_or_nil(id: Option<Uuid>) -> Uuid {
    id.unwrap_or(Uuid::nil())
}

impl TransactionFilter {
    pub fn month(month: u32, year: i32) -> Self {
        TransactionFilter::Month { month, year }
    }

    pub fn day(day: u32, month: u32, year: i32) -> Self {
        TransactionFilter::Day { day, month, year }
    }

    pub fn category(category: &Category) -> Self {
        TransactionFilter::Category {
            category: id_or_nil(category.id),
            month_year: None,
        }
    }

    pub fn category_in_month(category: &Category, month: u32, year: i32) -> Self {
        TransactionFilter::Category {
            category: id_or_nil(category.id),
            month_year: Some((month, year)),
        }
    }

    pub fn account(account: &Account) -> Self {
        TransactionFilter::Account {
            account: id_or_nil(account.id),
            year: None,
        }
    }

    pub fn account_in_year(account: &Account, year: i32) -> Self {
        TransactionFilter::Account {
            account: id_or_nil(account.id),
            year: Some(year),
        }
    }

    pub fn recurrent(recurrent: &RecurrentTransaction) -> Self {
        TransactionFilter::Recurrent {
            recurrent: id_or_nil(recurrent.id),
        }
    }

    /// WHERE clause and bound values; `prefix` qualifies column names
    fn predicate(&self, prefix: &str) -> (String, Vec<Value>) {
        let p = prefix;
        match self {
            TransactionFilter::All => (String::new(), Vec::new()),
            TransactionFilter::Month { month, year } => (
                format!(" WHERE {p}month = ? AND {p}year = ?"),
                vec![Value::Integer(i64::from(*month)), Value::Integer(i64::from(*year))],
            ),
            TransactionFilter::Day { day, month, year } => (
                format!(" WHERE {p}day = ? AND {p}month = ? AND {p}year = ?"),
                vec![
                    Value::Integer(i64::from(*day)),
                    Value::Integer(i64::from(*month)),
                    Value::Integer(i64::from(*year)),
                ],
            ),
            TransactionFilter::Category { category, month_year: None } => (
                format!(" WHERE {p}category = ?"),
                vec![Value::Text(category.to_string())],
            ),
            TransactionFilter::Category { category, month_year: Some((month, year)) } => (
                format!(" WHERE {p}category = ? AND {p}month = ? AND {p}year = ?"),
                vec![
                    Value::Text(category.to_string()),
                    Value::Integer(i64::from(*month)),
                    Value::Integer(i64::from(*year)),
                ],
            ),
            TransactionFilter::Account { account, year: None } => (
                format!(" WHERE {p}account = ?"),
                vec![Value::Text(account.to_string())],
            ),
            TransactionFilter::Account { account, year: Some(year) } => (
                format!(" WHERE {p}account = ? AND {p}year = ?"),
                vec![Value::Text(account.to_string()), Value::Integer(i64::from(*year))],
            ),
            TransactionFilter::Recurrent { recurrent } => (
                format!(
                    " WHERE {p}uuid IN (SELECT generated_transaction FROM RecurrentTransactionRelations
                      WHERE recurrent_transaction = ?)"
                ),
                vec![Value::Text(recurrent.to_string())],
            ),
        }
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const TRANSACTION_SELECT: &str = "SELECT t.uuid, t.amount, t.day, t.month, t.year, t.contents, t.memo, t.is_recurrent,
        t.account, a.name, a.memo, a.color, a.initialAmount, a.amount,
        t.category, c.parent, c.name, c.type, c.color
    FROM Transactions AS t";

const ORDER_BY_DATE: &str = " ORDER BY t.year, t.month, t.day, t.contents";

const LISTING_JOINS: &str = " INNER JOIN Accounts AS a ON a.uuid = t.account
    INNER JOIN Categories AS c ON c.uuid = t.category";

/// Account and category columns starting at `account_at` / `category_at`.
/// Rows a LEFT JOIN did not find become placeholders carrying the id; the
/// placeholder category takes its type from the sign of `amount`.
pub(crate) fn joined_references(
    row: &Row<'_>,
    account_at: usize,
    category_at: usize,
    amount: f64,
) -> rusqlite::Result<(Account, Category)> {
    let account = match row.get::<_, Option<String>>(account_at + 1)? {
        Some(_) => account_from_row(row, account_at)?,
        None => Account::detached(db::uuid_column(row, account_at)?),
    };

    let category = match row.get::<_, Option<String>>(category_at + 2)? {
        Some(_) => category_from_row(row, category_at)?,
        None => {
            let category_type = if amount < 0.0 {
                CategoryType::Expense
            } else {
                CategoryType::Income
            };
            Category::detached(db::uuid_column(row, category_at)?, category_type)
        }
    };
    Ok((account, category))
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let amount: f64 = row.get(1)?;
    let (account, category) = joined_references(row, 8, 14, amount)?;

    Ok(Transaction {
        id: Some(db::uuid_column(row, 0)?),
        account,
        category,
        amount,
        date: db::date_columns(row, 2)?,
        contents: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        memo: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        attachments: Vec::new(),
        is_recurrent: row.get(7)?,
    })
}

pub(crate) fn select_transactions(
    conn: &Connection,
    filter: &TransactionFilter,
    page: Option<Page>,
) -> Result<Vec<Transaction>> {
    let (predicate, values) = filter.predicate("t.");
    let sql = format!(
        "{}{}{}{}{}",
        TRANSACTION_SELECT,
        LISTING_JOINS,
        predicate,
        ORDER_BY_DATE,
        Page::clause(page)
    );
    let mut stmt = conn.prepare(&sql)?;
    let transactions = stmt
        .query_map(params_from_iter(values), transaction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(transactions)
}

/// Net signed sum per month of one account's transactions in `year`, read
/// from the Transactions table alone: rows whose category was removed still
/// count, as they do in the balance.
pub(crate) fn account_month_totals(conn: &Connection, account: &Uuid, year: i32) -> Result<Vec<(u32, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT month, SUM(amount) FROM Transactions
         WHERE account = ?1 AND year = ?2
         GROUP BY month",
    )?;
    let totals = stmt
        .query_map(params![account.to_string(), year], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(totals)
}

// ============================================================================
// WRITES
// ============================================================================

/// What a write changed, applied to the caller's entity after commit
pub(crate) struct StoredTransaction {
    pub id: Uuid,
    pub amount: f64,
    pub category_type: CategoryType,
    pub account: Uuid,
    pub attachments: Vec<Uuid>,
    pub balance: f64,
}

impl StoredTransaction {
    /// Read the final balance of the account (after every write of the call)
    pub(crate) fn refresh_balance(&mut self, conn: &Connection) -> Result<()> {
        self.balance = db::account_balance(conn, &self.account)?.unwrap_or(self.balance);
        Ok(())
    }

    pub(crate) fn apply_to(self, transaction: &mut Transaction) {
        transaction.id = Some(self.id);
        transaction.amount = self.amount;
        transaction.category.category_type = self.category_type;
        transaction.account.amount = self.balance;
        for (attachment, id) in transaction.attachments.iter_mut().zip(self.attachments) {
            attachment.id = Some(id);
        }
    }
}

/// Fail before any write when the references were never stored
pub(crate) fn check_references(transaction: &Transaction) -> Result<(Uuid, Uuid)> {
    let account = transaction
        .account
        .id
        .ok_or(BookError::NotStored("transaction account was never stored"))?;
    let category = transaction
        .category
        .id
        .ok_or(BookError::NotStored("transaction category was never stored"))?;
    Ok((account, category))
}

/// Insert or update one transaction and keep both account balances right:
/// the previous amount leaves the previous account, the new normalized
/// amount enters the new one.
pub(crate) fn write_transaction(conn: &Connection, transaction: &Transaction) -> Result<StoredTransaction> {
    let (account, category) = check_references(transaction)?;

    let category_type = stored_category_type(conn, &category)?;
    if db::account_balance(conn, &account)?.is_none() {
        return Err(BookError::MissingReference { kind: "Account", id: account });
    }

    let amount = category_type.normalize(transaction.amount);
    let id = transaction.id.unwrap_or_else(Uuid::new_v4);

    let previous: Option<(Uuid, f64)> = conn
        .query_row(
            "SELECT account, amount FROM Transactions WHERE uuid = ?1",
            [id.to_string()],
            |row| Ok((db::uuid_column(row, 0)?, row.get(1)?)),
        )
        .optional()?;

    conn.execute(
        "INSERT INTO Transactions
            (uuid, account, category, amount, day, month, year, contents, memo, is_recurrent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(uuid) DO UPDATE SET
            account = excluded.account,
            category = excluded.category,
            amount = excluded.amount,
            day = excluded.day,
            month = excluded.month,
            year = excluded.year,
            contents = excluded.contents,
            memo = excluded.memo,
            is_recurrent = excluded.is_recurrent",
        params![
            id.to_string(),
            account.to_string(),
            category.to_string(),
            amount,
            transaction.date.day(),
            transaction.date.month(),
            transaction.date.year(),
            transaction.contents,
            transaction.memo,
            transaction.is_recurrent
        ],
    )?;

    if let Some((old_account, old_amount)) = previous {
        reverse_balance(conn, &old_account, old_amount)?;
    }
    db::apply_balance(conn, &account, amount)?;

    let attachments = write_attachments(conn, &id, &transaction.attachments)?;

    Ok(StoredTransaction {
        id,
        amount,
        category_type,
        account,
        attachments,
        balance: 0.0,
    })
}

/// Take `amount` back out of an account, unless the account is gone
fn reverse_balance(conn: &Connection, account: &Uuid, amount: f64) -> Result<()> {
    if !db::shift_existing_balance(conn, account, -amount)? {
        tracing::warn!(account = %account, "account already removed, balance not reverted");
    }
    Ok(())
}

fn write_attachments(conn: &Connection, transaction: &Uuid, attachments: &[Attachment]) -> Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let id = attachment.id.unwrap_or_else(Uuid::new_v4);
        conn.execute(
            "INSERT INTO Attachments (uuid, name, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(uuid) DO UPDATE SET name = excluded.name, data = excluded.data",
            params![id.to_string(), attachment.name, attachment.data],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO AttachmentTransactionRelations (singleTransaction, attachment)
             VALUES (?1, ?2)",
            params![transaction.to_string(), id.to_string()],
        )?;
        ids.push(id);
    }
    Ok(ids)
}

/// Delete a transaction with its attachments and relations, reverting its
/// effect on the account balance. Returns the account it belonged to, or
/// None when no such row exists.
pub(crate) fn delete_transaction(conn: &Connection, id: &Uuid) -> Result<Option<Uuid>> {
    let key = id.to_string();
    let previous: Option<(Uuid, f64)> = conn
        .query_row(
            "SELECT account, amount FROM Transactions WHERE uuid = ?1",
            [&key],
            |row| Ok((db::uuid_column(row, 0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((account, amount)) = previous else {
        tracing::debug!(transaction = %id, "transaction not present, nothing to delete");
        return Ok(None);
    };

    conn.execute(
        "DELETE FROM Attachments WHERE uuid IN
            (SELECT attachment FROM AttachmentTransactionRelations WHERE singleTransaction = ?1)",
        [&key],
    )?;
    conn.execute("DELETE FROM AttachmentTransactionRelations WHERE singleTransaction = ?1", [&key])?;
    conn.execute("DELETE FROM RecurrentTransactionRelations WHERE generated_transaction = ?1", [&key])?;
    conn.execute("UPDATE RecurrentTransactions SET template = NULL WHERE template = ?1", [&key])?;
    conn.execute("DELETE FROM Transactions WHERE uuid = ?1", [&key])?;

    reverse_balance(conn, &account, amount)?;
    Ok(Some(account))
}

// ============================================================================
// BOOK OPERATIONS
// ============================================================================

impl Book {
    /// Store one transaction and update the affected account balances
    pub fn store_transaction(&mut self, transaction: &mut Transaction) -> Result<Change> {
        if let Err(e) = check_references(transaction) {
            return self.reject("store_transaction", e);
        }

        let stored = self.call("store_transaction", |conn| {
            let tx = conn.transaction()?;
            let mut stored = write_transaction(&tx, transaction)?;
            stored.refresh_balance(&tx)?;
            tx.commit()?;
            Ok(stored)
        })?;

        let id = stored.id;
        stored.apply_to(transaction);
        tracing::debug!(transaction = %id, amount = transaction.amount, "transaction stored");
        Ok(Change::stored(EntityKind::Transaction, vec![id]))
    }

    /// Store every transaction or none of them
    pub fn store_transactions(&mut self, transactions: &mut [Transaction]) -> Result<Change> {
        let stored = self.call("store_transactions", |conn| {
            let tx = conn.transaction()?;
            let mut stored = Vec::with_capacity(transactions.len());
            for transaction in transactions.iter() {
                stored.push(write_transaction(&tx, transaction)?);
            }
            for entry in &mut stored {
                entry.refresh_balance(&tx)?;
            }
            tx.commit()?;
            Ok(stored)
        })?;

        let ids: Vec<Uuid> = stored.iter().map(|s| s.id).collect();
        for (transaction, entry) in transactions.iter_mut().zip(stored) {
            entry.apply_to(transaction);
        }
        tracing::debug!(count = ids.len(), "transactions stored");
        Ok(Change::stored(EntityKind::Transaction, ids))
    }

    /// Remove a transaction and revert its effect on the account balance
    pub fn remove_transaction(&mut self, transaction: &mut Transaction) -> Result<Change> {
        let Some(id) = transaction.id else {
            return self.reject("remove_transaction", BookError::NotStored("transaction was never stored"));
        };

        let balance = self.call("remove_transaction", |conn| {
            let tx = conn.transaction()?;
            let balance = match delete_transaction(&tx, &id)? {
                Some(account) => db::account_balance(&tx, &account)?,
                None => None,
            };
            tx.commit()?;
            Ok(balance)
        })?;

        transaction.id = None;
        for attachment in &mut transaction.attachments {
            attachment.id = None;
        }
        if let Some(balance) = balance {
            transaction.account.amount = balance;
        }
        tracing::debug!(transaction = %id, "transaction removed");
        Ok(Change::removed(EntityKind::Transaction, vec![id]))
    }

    /// Lookup by id. Transactions whose account or category was removed are
    /// still returned, with placeholder references.
    pub fn transaction(&mut self, id: Uuid) -> Option<Transaction> {
        self.query("transaction", |conn| {
            let sql = format!(
                "{} LEFT JOIN Accounts AS a ON a.uuid = t.account
                    LEFT JOIN Categories AS c ON c.uuid = t.category
                 WHERE t.uuid = ?1",
                TRANSACTION_SELECT
            );
            Ok(conn
                .query_row(&sql, [id.to_string()], transaction_from_row)
                .optional()?)
        })
    }

    /// Transactions matching `filter`, oldest first
    pub fn transactions(&mut self, filter: &TransactionFilter, page: Option<Page>) -> Vec<Transaction> {
        self.query("transactions", |conn| select_transactions(conn, filter, page))
    }

    /// Size of the matching `transactions` listing. Orphaned transactions
    /// are left out of both.
    pub fn number_of_transactions(&mut self, filter: &TransactionFilter) -> i64 {
        self.count("number_of_transactions", |conn| {
            let (predicate, values) = filter.predicate("t.");
            let sql = format!("SELECT COUNT(*) FROM Transactions AS t{}{}", LISTING_JOINS, predicate);
            Ok(conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?)
        })
    }

    /// Months of `year` with at least one transaction, latest first
    pub fn months_with_transactions(&mut self, year: i32, page: Option<Page>) -> Vec<u32> {
        self.query("months_with_transactions", |conn| {
            let sql = format!(
                "SELECT DISTINCT month FROM Transactions WHERE year = ?1 ORDER BY month DESC{}",
                Page::clause(page)
            );
            let mut stmt = conn.prepare(&sql)?;
            let months = stmt
                .query_map([year], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<u32>>>()?;
            Ok(months)
        })
    }

    pub fn number_of_months_with_transactions(&mut self, year: i32) -> i64 {
        self.count("number_of_months_with_transactions", |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(DISTINCT month) FROM Transactions WHERE year = ?1",
                [year],
                |row| row.get(0),
            )?)
        })
    }

    /// Days of a month with at least one transaction, latest first
    pub fn days_with_transactions(&mut self, month: u32, year: i32, page: Option<Page>) -> Vec<u32> {
        self.query("days_with_transactions", |conn| {
            let sql = format!(
                "SELECT DISTINCT day FROM Transactions WHERE month = ?1 AND year = ?2 ORDER BY day DESC{}",
                Page::clause(page)
            );
            let mut stmt = conn.prepare(&sql)?;
            let days = stmt
                .query_map(params![month, year], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<u32>>>()?;
            Ok(days)
        })
    }

    pub fn number_of_days_with_transactions(&mut self, month: u32, year: i32) -> i64 {
        self.count("number_of_days_with_transactions", |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(DISTINCT day) FROM Transactions WHERE month = ?1 AND year = ?2",
                params![month, year],
                |row| row.get(0),
            )?)
        })
    }

    /// Attachments stored with a transaction, by name
    pub fn attachments(&mut self, transaction: &Transaction) -> Vec<Attachment> {
        let Some(id) = transaction.id else {
            let _ = self.reject::<()>("attachments", BookError::NotStored("transaction was never stored"));
            return Vec::new();
        };

        self.query("attachments", |conn| {
            let mut stmt = conn.prepare(
                "SELECT a.uuid, a.name, a.data FROM Attachments AS a
                 INNER JOIN AttachmentTransactionRelations AS r ON r.attachment = a.uuid
                 WHERE r.singleTransaction = ?1
                 ORDER BY a.name",
            )?;
            let attachments = stmt
                .query_map([id.to_string()], |row| {
                    Ok(Attachment {
                        id: Some(db::uuid_column(row, 0)?),
                        name: row.get(1)?,
                        data: row.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(attachments)
        })
    }
}
