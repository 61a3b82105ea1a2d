// 🏦 Account Entity - where money lives
//
// "The account name is a VALUE, the UUID is the IDENTITY"
//
// The identity is assigned by the Book on the first successful store and
// cleared again when the account is removed. `amount` is the running balance:
// initial amount plus the signed sum of every stored transaction. The Book
// maintains it, callers only read it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    // ========================================================================
    // IDENTITY (None until stored)
    // ========================================================================
    pub id: Option<Uuid>,

    // ========================================================================
    // VALUES
    // ========================================================================
    /// Account name (e.g., "Bankia", "Cash")
    pub name: String,

    /// Current balance (signed)
    pub amount: f64,

    /// Opening balance
    pub initial_amount: f64,

    pub memo: String,

    /// Display hint for the UI (e.g., "#FF5733")
    pub color: String,
}

impl Account {
    /// Create a new, not yet stored account. The balance starts at the
    /// initial amount.
    pub fn new(name: impl Into<String>, initial_amount: f64) -> Self {
        Account {
            id: None,
            name: name.into(),
            amount: initial_amount,
            initial_amount,
            memo: String::new(),
            color: String::new(),
        }
    }

    pub fn with_details(
        name: impl Into<String>,
        initial_amount: f64,
        memo: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        let mut account = Self::new(name, initial_amount);
        account.memo = memo.into();
        account.color = color.into();
        account
    }

    /// Placeholder for a row whose account was removed (orphaned transaction).
    pub(crate) fn detached(id: Uuid) -> Self {
        let mut account = Self::new("", 0.0);
        account.id = Some(id);
        account
    }

    pub fn was_stored(&self) -> bool {
        self.id.is_some()
    }
}
