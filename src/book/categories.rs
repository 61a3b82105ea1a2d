// 🏷️ Categories - store, cascade remove and list categories
//
// Parents are stored as a nullable UUID column. Removing a category also
// removes its direct children (one generation); removing a child never
// touches its parent.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{Book, Change, EntityKind, Page};
use crate::db;
use crate::entities::{Category, CategoryTree, CategoryType};
use crate::error::{BookError, Result};

pub(crate) const CATEGORY_COLUMNS: &str = "uuid, parent, name, type, color";

pub(crate) fn category_type_column(row: &Row<'_>, index: usize) -> rusqlite::Result<CategoryType> {
    let raw: i64 = row.get(index)?;
    CategoryType::from_db(raw).ok_or_else(|| {
        db::conversion_error(index, db::InvalidColumn(format!("unknown category type {}", raw)))
    })
}

/// Map `CATEGORY_COLUMNS` starting at `offset`
pub(crate) fn category_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Category> {
    Ok(Category {
        id: Some(db::uuid_column(row, offset)?),
        parent: db::optional_uuid_column(row, offset + 1)?,
        name: row.get(offset + 2)?,
        category_type: category_type_column(row, offset + 3)?,
        color: row.get::<_, Option<String>>(offset + 4)?.unwrap_or_default(),
    })
}

/// Type of a stored category, the source of truth for sign normalization
pub(crate) fn stored_category_type(conn: &Connection, id: &Uuid) -> Result<CategoryType> {
    let raw: Option<i64> = conn
        .query_row(
            "SELECT type FROM Categories WHERE uuid = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    raw.and_then(CategoryType::from_db)
        .ok_or(BookError::MissingReference {
            kind: "Category",
            id: *id,
        })
}

/// Flip every amount filed under `id` whose sign disagrees with
/// `category_type`, moving the account balances along with it. Returns the
/// number of transactions flipped.
fn renormalize_amounts(conn: &Connection, id: &Uuid, category_type: CategoryType) -> Result<usize> {
    let wrong_sign = match category_type {
        CategoryType::Expense => "amount > 0",
        CategoryType::Income => "amount < 0",
    };
    let key = id.to_string();

    let flipped = {
        let sql = format!("SELECT account, amount FROM Transactions WHERE category = ?1 AND {}", wrong_sign);
        let mut stmt = conn.prepare(&sql)?;
        let flipped = stmt
            .query_map([&key], |row| Ok((db::uuid_column(row, 0)?, row.get::<_, f64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        flipped
    };

    for (account, amount) in &flipped {
        if !db::shift_existing_balance(conn, account, -2.0 * amount)? {
            tracing::warn!(account = %account, "account already removed, balance not renormalized");
        }
    }

    conn.execute(
        &format!("UPDATE Transactions SET amount = -amount WHERE category = ?1 AND {}", wrong_sign),
        [&key],
    )?;
    conn.execute(
        &format!("UPDATE RecurrentTransactions SET amount = -amount WHERE category = ?1 AND {}", wrong_sign),
        [&key],
    )?;
    Ok(flipped.len())
}

/// Insert or update a category. A type change renormalizes the amounts
/// already filed under it.
fn upsert_category(conn: &Connection, category: &Category, id: &Uuid) -> Result<()> {
    if let Some(parent) = category.parent {
        let exists = conn
            .query_row(
                "SELECT 1 FROM Categories WHERE uuid = ?1",
                [parent.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Err(BookError::MissingReference {
                kind: "Category",
                id: parent,
            });
        }
    }

    let previous: Option<i64> = conn
        .query_row(
            "SELECT type FROM Categories WHERE uuid = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    conn.execute(
        "INSERT INTO Categories (uuid, parent, name, type, color)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(uuid) DO UPDATE SET
            parent = excluded.parent,
            name = excluded.name,
            type = excluded.type,
            color = excluded.color",
        params![
            id.to_string(),
            category.parent.map(|p| p.to_string()),
            category.name,
            category.category_type.to_db(),
            category.color
        ],
    )?;

    let new_type = category.category_type;
    if previous.is_some_and(|old| old != new_type.to_db()) {
        let flipped = renormalize_amounts(conn, id, new_type)?;
        tracing::info!(category = %id, category_type = new_type.as_str(), flipped, "category type changed");
    }
    Ok(())
}

fn select_categories(
    conn: &Connection,
    filter: &str,
    values: Vec<Value>,
    page: Option<Page>,
) -> Result<Vec<Category>> {
    let sql = format!(
        "SELECT {} FROM Categories{} ORDER BY name{}",
        CATEGORY_COLUMNS,
        filter,
        Page::clause(page)
    );
    let mut stmt = conn.prepare(&sql)?;
    let categories = stmt
        .query_map(params_from_iter(values), |row| category_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(categories)
}

fn type_filter(category_type: Option<CategoryType>) -> (&'static str, Vec<Value>) {
    match category_type {
        Some(t) => (" WHERE type = ?1", vec![Value::Integer(t.to_db())]),
        None => ("", Vec::new()),
    }
}

const RECURRENT_FILTER: &str =
    " WHERE uuid IN (SELECT DISTINCT category FROM RecurrentTransactions)";

impl Book {
    pub fn store_category(&mut self, category: &mut Category) -> Result<Change> {
        let id = category.id.unwrap_or_else(Uuid::new_v4);
        self.call("store_category", |conn| {
            let tx = conn.transaction()?;
            upsert_category(&tx, category, &id)?;
            tx.commit()?;
            Ok(())
        })?;

        category.id = Some(id);
        tracing::debug!(category = %id, name = %category.name, "category stored");
        Ok(Change::stored(EntityKind::Category, vec![id]))
    }

    /// Store every category or none of them. Parents must already be stored
    /// or appear earlier in the slice.
    pub fn store_categories(&mut self, categories: &mut [Category]) -> Result<Change> {
        let ids: Vec<Uuid> = categories
            .iter()
            .map(|c| c.id.unwrap_or_else(Uuid::new_v4))
            .collect();

        self.call("store_categories", |conn| {
            let tx = conn.transaction()?;
            for (category, id) in categories.iter().zip(&ids) {
                upsert_category(&tx, category, id)?;
            }
            tx.commit()?;
            Ok(())
        })?;

        for (category, id) in categories.iter_mut().zip(&ids) {
            category.id = Some(*id);
        }
        Ok(Change::stored(EntityKind::Category, ids))
    }

    /// Remove a category together with its direct children
    pub fn remove_category(&mut self, category: &mut Category) -> Result<Change> {
        let Some(id) = category.id else {
            return self.reject("remove_category", BookError::NotStored("category was never stored"));
        };

        let removed = self.call("remove_category", |conn| {
            let tx = conn.transaction()?;

            let children = {
                let mut stmt = tx.prepare("SELECT uuid FROM Categories WHERE parent = ?1")?;
                let children = stmt
                    .query_map([id.to_string()], |row| db::uuid_column(row, 0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                children
            };

            tx.execute("DELETE FROM Categories WHERE parent = ?1", [id.to_string()])?;
            tx.execute("DELETE FROM Categories WHERE uuid = ?1", [id.to_string()])?;
            tx.commit()?;

            let mut removed = vec![id];
            removed.extend(children);
            Ok(removed)
        })?;

        category.id = None;
        tracing::debug!(category = %id, children = removed.len() - 1, "category removed");
        Ok(Change::removed(EntityKind::Category, removed))
    }

    pub fn category(&mut self, id: Uuid) -> Option<Category> {
        self.query("category", |conn| {
            let sql = format!("SELECT {} FROM Categories WHERE uuid = ?1", CATEGORY_COLUMNS);
            Ok(conn
                .query_row(&sql, [id.to_string()], |row| category_from_row(row, 0))
                .optional()?)
        })
    }

    /// Categories in alphabetical order, optionally of one type only
    pub fn categories(&mut self, category_type: Option<CategoryType>, page: Option<Page>) -> Vec<Category> {
        self.query("categories", |conn| {
            let (filter, values) = type_filter(category_type);
            select_categories(conn, filter, values, page)
        })
    }

    pub fn number_of_categories(&mut self, category_type: Option<CategoryType>) -> i64 {
        self.count("number_of_categories", |conn| {
            let (filter, values) = type_filter(category_type);
            let sql = format!("SELECT COUNT(*) FROM Categories{}", filter);
            Ok(conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?)
        })
    }

    /// Categories used by at least one recurrent transaction
    pub fn recurrent_categories(&mut self, page: Option<Page>) -> Vec<Category> {
        self.query("recurrent_categories", |conn| {
            select_categories(conn, RECURRENT_FILTER, Vec::new(), page)
        })
    }

    pub fn number_of_recurrent_categories(&mut self) -> i64 {
        self.count("number_of_recurrent_categories", |conn| {
            let sql = format!("SELECT COUNT(*) FROM Categories{}", RECURRENT_FILTER);
            Ok(conn.query_row(&sql, [], |row| row.get(0))?)
        })
    }

    /// Every category, linked into a tree in one pass
    pub fn category_tree(&mut self) -> CategoryTree {
        let categories = self.query("category_tree", |conn| {
            select_categories(conn, "", Vec::new(), None)
        });
        CategoryTree::build(categories)
    }
}
