// 🔁 Recurrent Transactions - templates and their materialized occurrences
//
// A rule row holds the template values and the recurrence. Every transaction
// produced by a rule (the template itself included) is linked to it through
// RecurrentTransactionRelations. Generation is restartable: the checkpoint
// (lastDay/lastMonth/lastYear) only moves in the same rusqlite transaction
// that inserts the occurrences.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::categories::stored_category_type;
use super::transactions::{check_references, delete_transaction, joined_references, write_transaction};
use super::{Book, Change, EntityKind, Page};
use crate::db;
use crate::entities::{Cadence, Category, Recurrence, RecurrenceEnd, RecurrentTransaction, Transaction};
use crate::error::{BookError, Result};
use crate::recurrence;

// ============================================================================
// GENERATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    pub recurrent: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Rules inspected
    pub templates: usize,
    /// Transactions created
    pub generated: usize,
    /// Rules whose occurrences were rolled back
    pub failures: Vec<GenerationFailure>,
    /// Rules left alone because their account or category was removed
    pub skipped: Vec<Uuid>,
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const RECURRENT_SELECT: &str = "SELECT r.uuid, r.amount, r.contents, r.memo,
        r.startDay, r.startMonth, r.startYear,
        r.lastDay, r.lastMonth, r.lastYear,
        r.endDay, r.endMonth, r.endYear,
        r.defaultType, r.numberDays, r.occurrences, r.template,
        r.account, a.name, a.memo, a.color, a.initialAmount, a.amount,
        r.category, c.parent, c.name, c.type, c.color
    FROM RecurrentTransactions AS r
    LEFT JOIN Accounts AS a ON a.uuid = r.account
    LEFT JOIN Categories AS c ON c.uuid = r.category";

fn recurrent_from_row(row: &Row<'_>) -> rusqlite::Result<RecurrentTransaction> {
    let start_date = db::date_columns(row, 4)?;

    let cadence = Cadence::from_db(row.get(13)?, row.get(14)?).ok_or_else(|| {
        db::conversion_error(13, db::InvalidColumn("recurrence without cadence".to_string()))
    })?;

    let end = match (db::optional_date_columns(row, 10)?, row.get::<_, Option<u32>>(15)?) {
        (Some(date), _) => RecurrenceEnd::OnDate(date),
        (None, Some(count)) => RecurrenceEnd::AfterOccurrences(count),
        (None, None) => RecurrenceEnd::Never,
    };

    let recurrence = Recurrence {
        cadence,
        start_date,
        last_generated: db::optional_date_columns(row, 7)?,
        end,
    };

    let amount: f64 = row.get(1)?;
    let (account, category) = joined_references(row, 17, 23, amount)?;

    let transaction = Transaction {
        id: db::optional_uuid_column(row, 16)?,
        account,
        category,
        amount,
        date: start_date,
        contents: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        memo: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        attachments: Vec::new(),
        is_recurrent: true,
    };

    Ok(RecurrentTransaction {
        id: Some(db::uuid_column(row, 0)?),
        transaction,
        recurrence,
    })
}

fn category_filter(category: Option<&Category>) -> Option<Value> {
    category.map(|c| Value::Text(c.id.unwrap_or(Uuid::nil()).to_string()))
}

fn select_recurrent(
    conn: &Connection,
    category: Option<&Category>,
    page: Option<Page>,
) -> Result<Vec<RecurrentTransaction>> {
    let filter = category_filter(category);
    let predicate = if filter.is_some() { " WHERE r.category = ?" } else { "" };
    let sql = format!(
        "{}{} ORDER BY r.contents, r.startYear, r.startMonth, r.startDay{}",
        RECURRENT_SELECT,
        predicate,
        Page::clause(page)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rules = stmt
        .query_map(params_from_iter(filter), recurrent_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rules)
}

// ============================================================================
// WRITES
// ============================================================================

fn optional_integer(value: Option<i64>) -> Value {
    value.map(Value::Integer).unwrap_or(Value::Null)
}

/// Insert or update the rule row. An existing checkpoint is kept: only
/// generation moves it.
fn upsert_recurrent(
    conn: &Connection,
    rule: &RecurrentTransaction,
    id: &Uuid,
    amount: f64,
    account: &Uuid,
    category: &Uuid,
    template: &Uuid,
) -> Result<()> {
    let recurrence = &rule.recurrence;

    let mut values = vec![
        Value::Text(id.to_string()),
        Value::Real(amount),
        Value::Text(account.to_string()),
        Value::Text(category.to_string()),
        Value::Text(rule.transaction.contents.clone()),
        Value::Text(rule.transaction.memo.clone()),
    ];
    values.extend(db::date_values(Some(recurrence.start_date)));
    values.extend(db::date_values(recurrence.last_generated));
    values.extend(db::date_values(recurrence.end.end_date()));
    values.push(optional_integer(recurrence.cadence.default_type()));
    values.push(optional_integer(recurrence.cadence.number_of_days().map(i64::from)));
    values.push(optional_integer(recurrence.end.occurrences().map(i64::from)));
    values.push(Value::Text(template.to_string()));

    conn.execute(
        "INSERT INTO RecurrentTransactions
            (uuid, amount, account, category, contents, memo,
             startDay, startMonth, startYear, lastDay, lastMonth, lastYear,
             endDay, endMonth, endYear, defaultType, numberDays, occurrences, template)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
         ON CONFLICT(uuid) DO UPDATE SET
            amount = excluded.amount,
            account = excluded.account,
            category = excluded.category,
            contents = excluded.contents,
            memo = excluded.memo,
            startDay = excluded.startDay,
            startMonth = excluded.startMonth,
            startYear = excluded.startYear,
            endDay = excluded.endDay,
            endMonth = excluded.endMonth,
            endYear = excluded.endYear,
            defaultType = excluded.defaultType,
            numberDays = excluded.numberDays,
            occurrences = excluded.occurrences,
            template = excluded.template",
        params_from_iter(values),
    )?;
    Ok(())
}

fn link_generated(conn: &Connection, rule: &Uuid, generated: &Uuid) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO RecurrentTransactionRelations (recurrent_transaction, generated_transaction)
         VALUES (?1, ?2)",
        params![rule.to_string(), generated.to_string()],
    )?;
    Ok(())
}

fn stored_checkpoint(conn: &Connection, id: &Uuid) -> Result<Option<NaiveDate>> {
    let checkpoint = conn
        .query_row(
            "SELECT lastDay, lastMonth, lastYear FROM RecurrentTransactions WHERE uuid = ?1",
            [id.to_string()],
            |row| db::optional_date_columns(row, 0),
        )
        .optional()?;
    Ok(checkpoint.flatten())
}

/// Create every missing occurrence of one rule and advance its checkpoint,
/// all in one rusqlite transaction.
fn materialize(conn: &mut Connection, rule: &RecurrentTransaction, today: NaiveDate) -> Result<usize> {
    let Some(id) = rule.id else {
        return Err(BookError::NotStored("recurrent transaction was never stored"));
    };

    let dates = recurrence::missing_dates(&rule.recurrence, today);
    let Some(last) = dates.last().copied() else {
        return Ok(0);
    };

    let tx = conn.transaction()?;
    for date in &dates {
        let occurrence = rule.transaction.occurrence_on(*date);
        let stored = write_transaction(&tx, &occurrence)?;
        link_generated(&tx, &id, &stored.id)?;
    }

    let mut values: Vec<Value> = db::date_values(Some(last)).into();
    values.push(Value::Text(id.to_string()));
    tx.execute(
        "UPDATE RecurrentTransactions SET lastDay = ?1, lastMonth = ?2, lastYear = ?3 WHERE uuid = ?4",
        params_from_iter(values),
    )?;
    tx.commit()?;

    tracing::debug!(recurrent = %id, count = dates.len(), %last, "occurrences generated");
    Ok(dates.len())
}

// ============================================================================
// BOOK OPERATIONS
// ============================================================================

impl Book {
    /// Store the rule. A template transaction without identity is stored
    /// with it (balance applied) and linked as the first occurrence.
    pub fn store_recurrent(&mut self, rule: &mut RecurrentTransaction) -> Result<Change> {
        let (account, category) = match check_references(&rule.transaction) {
            Ok(references) => references,
            Err(e) => return self.reject("store_recurrent", e),
        };
        let id = rule.id.unwrap_or_else(Uuid::new_v4);

        let (template, amount, checkpoint) = self.call("store_recurrent", |conn| {
            let tx = conn.transaction()?;

            let category_type = stored_category_type(&tx, &category)?;
            if db::account_balance(&tx, &account)?.is_none() {
                return Err(BookError::MissingReference { kind: "Account", id: account });
            }
            let amount = category_type.normalize(rule.transaction.amount);

            let template = match rule.transaction.id {
                Some(_) => None,
                None => {
                    let mut template = rule.transaction.clone();
                    template.is_recurrent = true;
                    let mut stored = write_transaction(&tx, &template)?;
                    stored.refresh_balance(&tx)?;
                    Some(stored)
                }
            };
            let template_id = match (&template, rule.transaction.id) {
                (Some(stored), _) => stored.id,
                (None, Some(existing)) => existing,
                (None, None) => return Err(BookError::NotStored("template transaction was never stored")),
            };

            upsert_recurrent(&tx, rule, &id, amount, &account, &category, &template_id)?;
            link_generated(&tx, &id, &template_id)?;
            let checkpoint = stored_checkpoint(&tx, &id)?;

            tx.commit()?;
            Ok((template, amount, checkpoint))
        })?;

        rule.id = Some(id);
        match template {
            Some(stored) => stored.apply_to(&mut rule.transaction),
            None => rule.transaction.amount = amount,
        }
        rule.transaction.is_recurrent = true;
        rule.recurrence.last_generated = checkpoint;

        tracing::debug!(recurrent = %id, cadence = %rule.recurrence.cadence.label(), "recurrent transaction stored");
        Ok(Change::stored(EntityKind::RecurrentTransaction, vec![id]))
    }

    /// Remove the rule. With `remove_generated` every transaction it produced
    /// (the template included) is removed too and balances are reverted.
    pub fn remove_recurrent(&mut self, rule: &mut RecurrentTransaction, remove_generated: bool) -> Result<Change> {
        let Some(id) = rule.id else {
            return self.reject("remove_recurrent", BookError::NotStored("recurrent transaction was never stored"));
        };

        let removed = self.call("remove_recurrent", |conn| {
            let tx = conn.transaction()?;
            let key = id.to_string();

            let generated = {
                let mut stmt = tx.prepare(
                    "SELECT generated_transaction FROM RecurrentTransactionRelations
                     WHERE recurrent_transaction = ?1",
                )?;
                let generated = stmt
                    .query_map([&key], |row| db::uuid_column(row, 0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                generated
            };

            let mut removed = Vec::new();
            if remove_generated {
                for transaction in &generated {
                    if delete_transaction(&tx, transaction)?.is_some() {
                        removed.push(*transaction);
                    }
                }
            }

            tx.execute("DELETE FROM RecurrentTransactionRelations WHERE recurrent_transaction = ?1", [&key])?;
            tx.execute("DELETE FROM RecurrentTransactions WHERE uuid = ?1", [&key])?;
            tx.commit()?;
            Ok(removed)
        })?;

        rule.id = None;
        if rule.transaction.id.is_some_and(|t| removed.contains(&t)) {
            rule.transaction.id = None;
        }
        tracing::debug!(recurrent = %id, transactions = removed.len(), "recurrent transaction removed");

        let mut ids = vec![id];
        ids.extend(removed);
        Ok(Change::removed(EntityKind::RecurrentTransaction, ids))
    }

    /// Rules ordered by their contents, optionally for one category only.
    /// Rules whose account or category was removed are listed with
    /// placeholder references.
    pub fn recurrent_transactions(&mut self, category: Option<&Category>, page: Option<Page>) -> Vec<RecurrentTransaction> {
        self.query("recurrent_transactions", |conn| select_recurrent(conn, category, page))
    }

    pub fn number_of_recurrent_transactions(&mut self, category: Option<&Category>) -> i64 {
        self.count("number_of_recurrent_transactions", |conn| {
            let filter = category_filter(category);
            let sql = if filter.is_some() {
                "SELECT COUNT(*) FROM RecurrentTransactions WHERE category = ?"
            } else {
                "SELECT COUNT(*) FROM RecurrentTransactions"
            };
            Ok(conn.query_row(sql, params_from_iter(filter), |row| row.get(0))?)
        })
    }

    /// Materialize every missing occurrence up to the local date
    pub fn generate_recurrent_transactions(&mut self) -> Result<GenerationReport> {
        let today = chrono::Local::now().date_naive();
        self.generate_recurrent_transactions_until(today)
    }

    /// Materialize every missing occurrence up to `today`. Each rule is
    /// handled in its own rusqlite transaction: a failing rule is rolled back
    /// and reported, the others still run. Rules due for generation whose
    /// account or category was removed are skipped with a warning and do
    /// not set the error flag.
    pub fn generate_recurrent_transactions_until(&mut self, today: NaiveDate) -> Result<GenerationReport> {
        let report = self.call("generate_recurrent_transactions", |conn| {
            let rules = select_recurrent(conn, None, None)?;
            let mut report = GenerationReport {
                templates: rules.len(),
                ..GenerationReport::default()
            };

            for rule in &rules {
                let recurrent = rule.id.unwrap_or(Uuid::nil());
                match materialize(conn, rule, today) {
                    Ok(count) => report.generated += count,
                    Err(BookError::MissingReference { kind, id }) => {
                        tracing::warn!(recurrent = %recurrent, kind, missing = %id, "rule references a removed row, skipped");
                        report.skipped.push(recurrent);
                    }
                    Err(e) => {
                        tracing::error!(recurrent = %recurrent, error = %e, "generation rolled back");
                        report.failures.push(GenerationFailure {
                            recurrent,
                            error: e.to_string(),
                        });
                    }
                }
            }
            Ok(report)
        })?;

        if let Some(failure) = report.failures.last() {
            self.last_error = Some(failure.error.clone());
        }
        tracing::info!(
            %today,
            templates = report.templates,
            generated = report.generated,
            failures = report.failures.len(),
            skipped = report.skipped.len(),
            "recurrent transactions generated"
        );
        Ok(report)
    }
}
