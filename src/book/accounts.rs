// 🏦 Accounts - store, remove and list accounts

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{Book, Change, EntityKind, Page};
use crate::db;
use crate::entities::Account;
use crate::error::{BookError, Result};

pub(crate) const ACCOUNT_COLUMNS: &str = "uuid, name, memo, color, initialAmount, amount";

/// Map `ACCOUNT_COLUMNS` starting at `offset`
pub(crate) fn account_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Account> {
    Ok(Account {
        id: Some(db::uuid_column(row, offset)?),
        name: row.get(offset + 1)?,
        memo: row.get::<_, Option<String>>(offset + 2)?.unwrap_or_default(),
        color: row.get::<_, Option<String>>(offset + 3)?.unwrap_or_default(),
        initial_amount: row.get(offset + 4)?,
        amount: row.get(offset + 5)?,
    })
}

/// Insert or update one account row and return its stored balance.
///
/// A new row starts at its initial amount. Changing the initial amount of an
/// existing row shifts the balance by the same delta so that
/// `amount == initialAmount + Σ transactions` keeps holding.
fn upsert_account(conn: &Connection, account: &Account, id: &Uuid) -> Result<f64> {
    conn.execute(
        "INSERT INTO Accounts (uuid, name, memo, color, initialAmount, amount)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(uuid) DO UPDATE SET
            name = excluded.name,
            memo = excluded.memo,
            color = excluded.color,
            amount = amount + (excluded.initialAmount - initialAmount),
            initialAmount = excluded.initialAmount",
        params![
            id.to_string(),
            account.name,
            account.memo,
            account.color,
            account.initial_amount
        ],
    )?;

    db::account_balance(conn, id)?.ok_or(BookError::MissingReference {
        kind: "Account",
        id: *id,
    })
}

pub(crate) fn load_account(conn: &Connection, id: &Uuid) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM Accounts WHERE uuid = ?1", ACCOUNT_COLUMNS);
    let account = conn
        .query_row(&sql, [id.to_string()], |row| account_from_row(row, 0))
        .optional()?;
    Ok(account)
}

impl Book {
    pub fn store_account(&mut self, account: &mut Account) -> Result<Change> {
        let id = account.id.unwrap_or_else(Uuid::new_v4);
        let amount = self.call("store_account", |conn| upsert_account(conn, account, &id))?;

        account.id = Some(id);
        account.amount = amount;
        tracing::debug!(account = %id, name = %account.name, "account stored");
        Ok(Change::stored(EntityKind::Account, vec![id]))
    }

    /// Store every account or none of them
    pub fn store_accounts(&mut self, accounts: &mut [Account]) -> Result<Change> {
        let ids: Vec<Uuid> = accounts
            .iter()
            .map(|a| a.id.unwrap_or_else(Uuid::new_v4))
            .collect();

        let amounts = self.call("store_accounts", |conn| {
            let tx = conn.transaction()?;
            let mut amounts = Vec::with_capacity(ids.len());
            for (account, id) in accounts.iter().zip(&ids) {
                amounts.push(upsert_account(&tx, account, id)?);
            }
            tx.commit()?;
            Ok(amounts)
        })?;

        for ((account, id), amount) in accounts.iter_mut().zip(&ids).zip(amounts) {
            account.id = Some(*id);
            account.amount = amount;
        }
        tracing::debug!(count = ids.len(), "accounts stored");
        Ok(Change::stored(EntityKind::Account, ids))
    }

    /// Delete the account row. Its transactions are left in place.
    pub fn remove_account(&mut self, account: &mut Account) -> Result<Change> {
        let Some(id) = account.id else {
            return self.reject("remove_account", BookError::NotStored("account was never stored"));
        };

        self.call("remove_account", |conn| {
            conn.execute("DELETE FROM Accounts WHERE uuid = ?1", [id.to_string()])?;
            Ok(())
        })?;

        account.id = None;
        tracing::debug!(account = %id, "account removed");
        Ok(Change::removed(EntityKind::Account, vec![id]))
    }

    pub fn account(&mut self, id: Uuid) -> Option<Account> {
        self.query("account", |conn| load_account(conn, &id))
    }

    /// Accounts in alphabetical order
    pub fn accounts(&mut self, page: Option<Page>) -> Vec<Account> {
        self.query("accounts", |conn| {
            let sql = format!(
                "SELECT {} FROM Accounts ORDER BY name{}",
                ACCOUNT_COLUMNS,
                Page::clause(page)
            );
            let mut stmt = conn.prepare(&sql)?;
            let accounts = stmt
                .query_map([], |row| account_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(accounts)
        })
    }

    pub fn number_of_accounts(&mut self) -> i64 {
        self.count("number_of_accounts", |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM Accounts", [], |row| row.get(0))?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_store_assigns_identity() {
        let mut env = temp_book();
        let mut account = Account::with_details("Bankia", 120.0, "main", "#123456");

        let change = env.book.store_account(&mut account).unwrap();

        let id = account.id.unwrap();
        assert_eq!(change.ids, vec![id]);
        let loaded = env.book.account(id).unwrap();
        assert_eq!(loaded, account);
        assert_eq!(loaded.amount, 120.0);
    }

    #[test]
    fn test_update_shifts_balance_by_initial_amount_change() {
        let mut env = temp_book();
        let mut account = stored_account(&mut env.book, "Cash", 50.0);
        let id = account.id.unwrap();

        env.book
            .call("test", |conn| db::apply_balance(conn, &id, -20.0))
            .unwrap();

        account.initial_amount = 80.0;
        account.name = "Wallet".to_string();
        env.book.store_account(&mut account).unwrap();

        assert_eq!(account.amount, 60.0);
        let loaded = env.book.account(id).unwrap();
        assert_eq!(loaded.name, "Wallet");
        assert_eq!(loaded.amount, 60.0);
        assert_eq!(env.book.number_of_accounts(), 1);
    }

    #[test]
    fn test_batch_store_and_paged_listing() {
        let mut env = temp_book();
        let mut accounts = vec![
            Account::new("Savings", 0.0),
            Account::new("Bankia", 0.0),
            Account::new("Cash", 0.0),
        ];

        let change = env.book.store_accounts(&mut accounts).unwrap();

        assert_eq!(change.ids.len(), 3);
        assert!(accounts.iter().all(|a| a.was_stored()));
        assert_eq!(env.book.number_of_accounts(), 3);

        let names: Vec<String> = env.book.accounts(None).into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Bankia", "Cash", "Savings"]);

        let page: Vec<String> = env
            .book
            .accounts(Some(Page::new(1).with_offset(1)))
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(page, vec!["Cash"]);
    }

    #[test]
    fn test_remove_clears_identity() {
        let mut env = temp_book();
        let mut account = stored_account(&mut env.book, "Bankia", 0.0);
        let id = account.id.unwrap();

        env.book.remove_account(&mut account).unwrap();

        assert_eq!(account.id, None);
        assert!(env.book.account(id).is_none());
        assert!(!env.book.is_error());
        assert_eq!(env.book.number_of_accounts(), 0);
    }

    #[test]
    fn test_remove_unstored_is_an_error() {
        let mut env = temp_book();
        let mut account = Account::new("Ghost", 0.0);

        let err = env.book.remove_account(&mut account).unwrap_err();

        assert!(matches!(err, BookError::NotStored(_)));
        assert!(env.book.is_error());
    }
}
