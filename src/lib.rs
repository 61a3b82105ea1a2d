// Chancho Book - Core Library
// Persistence and domain engine for a personal-finance tracker: accounts,
// hierarchical categories, one-off and recurrent transactions, statistics.

pub mod book;
pub mod config;
pub mod db;
pub mod driver;
pub mod entities;
pub mod error;
pub mod recurrence; // pure occurrence-date generator
pub mod stats;

// Re-export commonly used types
pub use book::{
    Book, Change, ChangeKind, EntityKind, GenerationFailure, GenerationReport, Page,
    TransactionFilter,
};
pub use config::BookConfig;
pub use driver::{Driver, SqliteDriver};
pub use entities::{
    Account, Attachment, Cadence, Category, CategoryTree, CategoryType, Recurrence,
    RecurrenceEnd, RecurrentTransaction, Transaction,
};
pub use error::{BookError, Result};
pub use recurrence::{missing_dates, occurrences_passed};
pub use stats::{CategoryPercentage, CategoryPercentageTotal, Stats};

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static INIT_TRACING: Once = Once::new();

/// Install a fmt subscriber filtered by `RUST_LOG` (default
/// `chancho_book=info`). Safe to call more than once.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("chancho_book=info"));
        // another subscriber may already be installed by the host application
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        tracing::info!(version = VERSION, "chancho book tracing initialized");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_tracing_twice() {
        super::init_tracing();
        super::init_tracing();
    }
}
