// End-to-end scenarios through the public API: a real SQLite file per test.

use chancho_book::{
    Account, Book, BookConfig, Cadence, Category, CategoryType, Driver, Recurrence,
    RecurrentTransaction, SqliteDriver, Stats, Transaction, TransactionFilter,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn open_book(dir: &tempfile::TempDir) -> Book {
    chancho_book::init_tracing();
    let book = Book::new(SqliteDriver::new(dir.path().join("chancho.db")));
    assert!(!book.is_error(), "{:?}", book.last_error());
    book
}

fn balance(book: &mut Book, account: &Account) -> f64 {
    book.account(account.id.unwrap()).unwrap().amount
}

#[test]
fn bankia_food_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open_book(&dir);

    let mut bankia = Account::new("Bankia", 0.0);
    book.store_account(&mut bankia).unwrap();
    let mut food = Category::new("Food", CategoryType::Expense);
    book.store_category(&mut food).unwrap();

    let mut lunch = Transaction::new(&bankia, 100.0, &food, date(2025, 6, 1), "Lunch");
    book.store_transaction(&mut lunch).unwrap();
    assert_eq!(balance(&mut book, &bankia), -100.0);

    book.remove_transaction(&mut lunch).unwrap();
    assert_eq!(balance(&mut book, &bankia), 0.0);
    assert!(!book.is_error());

    println!("✅ Bankia/Food round trip PASSED");
}

#[test]
fn balance_is_conserved_across_stores_moves_and_removes() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open_book(&dir);

    let mut accounts = vec![Account::new("Bankia", 100.0), Account::new("Cash", 20.0)];
    book.store_accounts(&mut accounts).unwrap();
    let mut categories = vec![
        Category::new("Food", CategoryType::Expense),
        Category::new("Salary", CategoryType::Income),
    ];
    book.store_categories(&mut categories).unwrap();
    let (bankia, cash) = (accounts[0].clone(), accounts[1].clone());
    let (food, salary) = (categories[0].clone(), categories[1].clone());

    let mut batch = vec![
        Transaction::new(&bankia, 15.0, &food, date(2025, 1, 3), "Market"),
        Transaction::new(&bankia, -900.0, &salary, date(2025, 1, 31), "Payroll"),
        Transaction::new(&cash, 4.5, &food, date(2025, 2, 2), "Coffee"),
    ];
    book.store_transactions(&mut batch).unwrap();

    // move the market expense to cash, remove the coffee
    batch[0].account = cash.clone();
    book.store_transaction(&mut batch[0]).unwrap();
    book.remove_transaction(&mut batch[2]).unwrap();

    for account in [&bankia, &cash] {
        let stored: f64 = book
            .transactions(&TransactionFilter::account(account), None)
            .iter()
            .map(|t| t.amount)
            .sum();
        let current = book.account(account.id.unwrap()).unwrap();
        assert_eq!(current.amount, current.initial_amount + stored);
    }
    assert_eq!(balance(&mut book, &bankia), 1000.0);
    assert_eq!(balance(&mut book, &cash), 5.0);

    for transaction in book.transactions(&TransactionFilter::All, None) {
        match transaction.category.category_type {
            CategoryType::Expense => assert!(transaction.amount <= 0.0),
            CategoryType::Income => assert!(transaction.amount >= 0.0),
        }
    }

    println!("✅ Balance conservation PASSED");
}

#[test]
fn parent_removal_cascades_one_generation() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open_book(&dir);

    let mut food = Category::new("Food", CategoryType::Expense);
    book.store_category(&mut food).unwrap();
    let food_id = food.id.unwrap();
    let mut children: Vec<Category> = ["Bakery", "Restaurants", "Groceries"]
        .iter()
        .map(|name| Category::with_parent(*name, CategoryType::Expense, food_id))
        .collect();
    book.store_categories(&mut children).unwrap();
    assert_eq!(book.category_tree().children_of(&food_id).len(), 3);

    let change = book.remove_category(&mut food).unwrap();

    assert_eq!(change.ids.len(), 4);
    assert_eq!(book.number_of_categories(None), 0);

    println!("✅ Category cascade PASSED");
}

#[test]
fn recurrent_generation_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let mut book = open_book(&dir);

    let mut bankia = Account::new("Bankia", 0.0);
    book.store_account(&mut bankia).unwrap();
    let mut gym = Category::new("Gym", CategoryType::Expense);
    book.store_category(&mut gym).unwrap();

    let template = Transaction::new(&bankia, 30.0, &gym, date(2025, 1, 15), "Membership");
    let mut rule = RecurrentTransaction::new(
        template,
        Recurrence::new(Cadence::Monthly, date(2025, 1, 15)).until(date(2025, 4, 30)),
    );
    book.store_recurrent(&mut rule).unwrap();

    let first = book.generate_recurrent_transactions_until(date(2025, 12, 31)).unwrap();
    let second = book.generate_recurrent_transactions_until(date(2025, 12, 31)).unwrap();

    assert_eq!(first.generated, 3);
    assert_eq!(second.generated, 0);
    assert_eq!(balance(&mut book, &bankia), -120.0);

    let mut stats = Stats::new(book.driver());
    let totals = stats.months_total_for_account(&bankia, 2025);
    assert_eq!(&totals[..4], &[-30.0, -30.0, -30.0, -30.0]);
    assert!(totals[4..].iter().all(|t| *t == 0.0));

    let (total, breakdown) = stats.category_percentages(2, 2025);
    assert_eq!(total.count, 1);
    assert_eq!(breakdown[0].category.name, "Gym");
    assert!(!stats.is_error());

    println!("✅ Recurrent generation PASSED");
}

#[test]
fn config_backed_book_persists_between_instances() {
    let dir = tempfile::tempdir().unwrap();
    let config = BookConfig::new(dir.path().join("data"));

    let mut first = Book::from_config(&config);
    let mut account = Account::new("Savings", 250.0);
    first.store_account(&mut account).unwrap();
    drop(first);

    let mut second = Book::from_config(&config);
    let accounts = second.accounts(None);
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].amount, 250.0);
}

struct ReadOnlyDriver {
    inner: SqliteDriver,
}

impl Driver for ReadOnlyDriver {
    fn open(&self) -> rusqlite::Result<Connection> {
        let conn = self.inner.open()?;
        conn.execute_batch("PRAGMA query_only = ON")?;
        Ok(conn)
    }

    fn describe(&self) -> String {
        format!("read-only {}", self.inner.describe())
    }
}

#[test]
fn failing_writes_set_the_error_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chancho.db");
    let mut book = Book::new(SqliteDriver::new(&path));
    let mut bankia = Account::new("Bankia", 0.0);
    book.store_account(&mut bankia).unwrap();

    let mut read_only = Book::with_shared_driver(Arc::new(ReadOnlyDriver {
        inner: SqliteDriver::new(&path),
    }));
    assert_eq!(read_only.number_of_accounts(), 1);
    assert!(!read_only.is_error());

    bankia.name = "Renamed".to_string();
    assert!(read_only.store_account(&mut bankia).is_err());
    assert!(read_only.is_error());
    assert!(read_only.last_error().is_some());

    // the next successful call clears the flag
    assert_eq!(read_only.accounts(None)[0].name, "Bankia");
    assert!(!read_only.is_error());
}
