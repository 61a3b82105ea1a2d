// 💸 Transaction Entity - a single dated movement of money
//
// A transaction references an Account and a Category. It carries snapshots of
// both so callers can render it without extra queries; the Book only trusts
// their identities and re-reads everything else from the database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Account, Attachment, Category};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// None until stored
    pub id: Option<Uuid>,

    pub account: Account,

    pub category: Category,

    /// Signed amount. Sign-normalized by category type when stored.
    pub amount: f64,

    pub date: NaiveDate,

    /// Free text label (e.g., "Groceries at Mercadona")
    pub contents: String,

    pub memo: String,

    /// Attachments to persist with the transaction. Not filled when the
    /// transaction is read back; use `Book::attachments`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// True when the transaction was produced by a recurrent template
    #[serde(default)]
    pub is_recurrent: bool,
}

impl Transaction {
    pub fn new(
        account: &Account,
        amount: f64,
        category: &Category,
        date: NaiveDate,
        contents: impl Into<String>,
    ) -> Self {
        Transaction {
            id: None,
            account: account.clone(),
            category: category.clone(),
            amount,
            date,
            contents: contents.into(),
            memo: String::new(),
            attachments: Vec::new(),
            is_recurrent: false,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn was_stored(&self) -> bool {
        self.id.is_some()
    }

    /// Copy of this transaction moved to another date, without identity.
    /// Used to materialize occurrences of a recurrent template.
    pub fn occurrence_on(&self, date: NaiveDate) -> Transaction {
        Transaction {
            id: None,
            date,
            attachments: Vec::new(),
            is_recurrent: true,
            ..self.clone()
        }
    }
}
