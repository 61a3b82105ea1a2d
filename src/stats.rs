// 📊 Stats Engine - read-only aggregation over stored transactions
//
// Account totals are summed straight from the Transactions table, like the
// balance they must agree with. Category figures are computed in memory from
// `Book::transactions`. Nothing is ever written; failures surface through
// the same `is_error()` / `last_error()` pair as the Book.

use chrono::Datelike;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::book::{account_month_totals, Book, TransactionFilter};
use crate::driver::Driver;
use crate::entities::{Account, Category};
use crate::error::BookError;

pub const MONTHS: usize = 12;

/// Totals of one month across every category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryPercentageTotal {
    pub count: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPercentage {
    pub category: Category,
    pub count: usize,
    pub amount: f64,
}

impl CategoryPercentage {
    /// Share of the month's transactions, 0.0..=1.0
    pub fn share_of_count(&self, total: &CategoryPercentageTotal) -> f64 {
        if total.count == 0 {
            0.0
        } else {
            self.count as f64 / total.count as f64
        }
    }
}

pub struct Stats {
    book: Book,
}

impl Stats {
    /// Stats over their own Book, sharing the driver
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Stats {
            book: Book::with_shared_driver(driver),
        }
    }

    pub fn from_book(book: Book) -> Self {
        Stats { book }
    }

    pub fn is_error(&self) -> bool {
        self.book.is_error()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.book.last_error()
    }

    /// Net signed sum per month (January first) of an account's transactions,
    /// including those whose category was removed. Months without
    /// transactions are 0.
    pub fn months_total_for_account(&mut self, account: &Account, year: i32) -> [f64; MONTHS] {
        let mut totals = [0.0; MONTHS];
        let Some(id) = account.id else {
            self.book
                .fail("months_total_for_account", &BookError::NotStored("account was never stored"));
            return totals;
        };

        let sums = self
            .book
            .query("months_total_for_account", |conn| account_month_totals(conn, &id, year));
        for (month, sum) in sums {
            if let Some(slot) = (month as usize).checked_sub(1).and_then(|i| totals.get_mut(i)) {
                *slot = sum;
            }
        }
        totals
    }

    /// Magnitude per month (January first) of a category's transactions.
    /// Months without transactions are 0.
    pub fn months_total_for_category(&mut self, category: &Category, year: i32) -> [f64; MONTHS] {
        let mut totals = [0.0; MONTHS];
        if category.id.is_none() {
            self.book
                .fail("months_total_for_category", &BookError::NotStored("category was never stored"));
            return totals;
        }

        let filter = TransactionFilter::category(category);
        for transaction in self.book.transactions(&filter, None) {
            if transaction.date.year() == year {
                totals[transaction.date.month0() as usize] += transaction.amount.abs();
            }
        }
        totals
    }

    /// Count and signed amount per category for one month, plus the totals
    /// across all of them. Only categories with transactions that month are
    /// listed, alphabetically.
    pub fn category_percentages(
        &mut self,
        month: u32,
        year: i32,
    ) -> (CategoryPercentageTotal, Vec<CategoryPercentage>) {
        let mut total = CategoryPercentageTotal::default();
        let mut per_category: HashMap<Uuid, CategoryPercentage> = HashMap::new();

        for transaction in self.book.transactions(&TransactionFilter::month(month, year), None) {
            let Some(id) = transaction.category.id else {
                continue;
            };
            total.count += 1;
            total.amount += transaction.amount;

            let entry = per_category.entry(id).or_insert_with(|| CategoryPercentage {
                category: transaction.category.clone(),
                count: 0,
                amount: 0.0,
            });
            entry.count += 1;
            entry.amount += transaction.amount;
        }

        let mut breakdown: Vec<CategoryPercentage> = per_category.into_values().collect();
        breakdown.sort_by(|a, b| a.category.name.cmp(&b.category.name));

        tracing::debug!(month, year, categories = breakdown.len(), "category percentages computed");
        (total, breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::test_support::*;
    use crate::entities::{CategoryType, Transaction};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_months_total_is_zero_filled() {
        let mut env = temp_book();
        let bankia = stored_account(&mut env.book, "Bankia", 0.0);
        let food = stored_category(&mut env.book, "Food", CategoryType::Expense);
        let salary = stored_category(&mut env.book, "Salary", CategoryType::Income);
        let mut batch = vec![
            Transaction::new(&bankia, 20.0, &food, date(2025, 3, 1), "Market"),
            Transaction::new(&bankia, 500.0, &salary, date(2025, 3, 28), "Payroll"),
            Transaction::new(&bankia, 99.0, &food, date(2024, 3, 1), "Last year"),
        ];
        env.book.store_transactions(&mut batch).unwrap();

        let mut stats = Stats::new(env.book.driver());
        let totals = stats.months_total_for_account(&bankia, 2025);

        assert!(!stats.is_error());
        assert_eq!(totals.len(), 12);
        assert_eq!(totals[2], 480.0);
        assert_eq!(totals.iter().filter(|t| **t == 0.0).count(), 11);
    }

    #[test]
    fn test_months_total_for_category() {
        let mut env = temp_book();
        let bankia = stored_account(&mut env.book, "Bankia", 0.0);
        let food = stored_category(&mut env.book, "Food", CategoryType::Expense);
        let mut batch = vec![
            Transaction::new(&bankia, 20.0, &food, date(2025, 1, 10), "a"),
            Transaction::new(&bankia, 5.0, &food, date(2025, 1, 11), "b"),
            Transaction::new(&bankia, 7.5, &food, date(2025, 12, 24), "c"),
        ];
        env.book.store_transactions(&mut batch).unwrap();

        let mut stats = Stats::from_book(env.book);
        let totals = stats.months_total_for_category(&food, 2025);

        assert_eq!(totals[0], 25.0);
        assert_eq!(totals[11], 7.5);
        assert_eq!(totals[5], 0.0);
    }

    #[test]
    fn test_category_percentages() {
        let mut env = temp_book();
        let bankia = stored_account(&mut env.book, "Bankia", 0.0);
        let food = stored_category(&mut env.book, "Food", CategoryType::Expense);
        let car = stored_category(&mut env.book, "Car", CategoryType::Expense);
        let salary = stored_category(&mut env.book, "Salary", CategoryType::Income);
        stored_category(&mut env.book, "Unused", CategoryType::Expense);
        let mut batch = vec![
            Transaction::new(&bankia, 10.0, &food, date(2025, 4, 1), "a"),
            Transaction::new(&bankia, 30.0, &food, date(2025, 4, 2), "b"),
            Transaction::new(&bankia, 60.0, &car, date(2025, 4, 3), "c"),
            Transaction::new(&bankia, 1000.0, &salary, date(2025, 4, 30), "d"),
            Transaction::new(&bankia, 1.0, &food, date(2025, 5, 1), "other month"),
        ];
        env.book.store_transactions(&mut batch).unwrap();

        let mut stats = Stats::from_book(env.book);
        let (total, breakdown) = stats.category_percentages(4, 2025);

        assert_eq!(total.count, 4);
        assert_eq!(total.amount, 900.0);
        let names: Vec<&str> = breakdown.iter().map(|c| c.category.name.as_str()).collect();
        assert_eq!(names, vec!["Car", "Food", "Salary"]);
        assert_eq!(breakdown[1].count, 2);
        assert_eq!(breakdown[1].amount, -40.0);
        assert_eq!(breakdown[1].share_of_count(&total), 0.5);
    }

    #[test]
    fn test_unstored_account_sets_flag() {
        let env = temp_book();
        let mut stats = Stats::from_book(env.book);

        let totals = stats.months_total_for_account(&Account::new("Ghost", 0.0), 2025);

        assert_eq!(totals, [0.0; 12]);
        assert!(stats.is_error());
    }

    #[test]
    fn test_broken_driver_returns_zeros() {
        let mut stats = Stats::new(Arc::new(BrokenDriver));
        let mut account = Account::new("Bankia", 0.0);
        account.id = Some(Uuid::new_v4());

        assert_eq!(stats.months_total_for_account(&account, 2025), [0.0; 12]);
        assert!(stats.is_error());
        let (total, breakdown) = stats.category_percentages(1, 2025);
        assert_eq!(total.count, 0);
        assert!(breakdown.is_empty());
    }

    #[test]
    fn test_months_total_keeps_transactions_of_removed_categories() {
        let mut env = temp_book();
        let bankia = stored_account(&mut env.book, "Bankia", 0.0);
        let mut food = stored_category(&mut env.book, "Food", CategoryType::Expense);
        let mut lunch = Transaction::new(&bankia, 100.0, &food, date(2025, 3, 10), "Lunch");
        env.book.store_transaction(&mut lunch).unwrap();

        env.book.remove_category(&mut food).unwrap();
        let balance = env.book.account(bankia.id.unwrap()).unwrap().amount;

        let mut stats = Stats::new(env.book.driver());
        let totals = stats.months_total_for_account(&bankia, 2025);

        assert!(!stats.is_error());
        assert_eq!(totals[2], -100.0);
        assert_eq!(totals.iter().sum::<f64>(), balance);
    }
}
