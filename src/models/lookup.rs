use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of a reference dimension (category, colour, status, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LookupEntry {
    pub id: i32,
    pub name: String,
}

impl LookupEntry {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
