// 📎 Attachment - a named binary blob linked to a transaction (e.g., a receipt)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Option<Uuid>,
    pub name: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Attachment {
            id: None,
            name: name.into(),
            data,
        }
    }

    pub fn was_stored(&self) -> bool {
        self.id.is_some()
    }
}
