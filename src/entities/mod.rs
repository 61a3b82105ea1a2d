// Entity Models
//
// Plain value holders with identity. None of them knows how it is persisted:
// every entity starts with `id: None`, the Book assigns a UUID on the first
// successful store and clears it again on removal.

pub mod account;
pub mod attachment;
pub mod category;
pub mod recurrent;
pub mod transaction;

pub use account::Account;
pub use attachment::Attachment;
pub use category::{Category, CategoryTree, CategoryType};
pub use recurrent::{Cadence, Recurrence, RecurrenceEnd, RecurrentTransaction};
pub use transaction::Transaction;
