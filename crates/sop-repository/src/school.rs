//! School record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A school as stored in the `schools` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl School {
    /// Creates a school stamped with the current time.
    pub fn new(id: i64, name: impl Into<String>, address: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address,
            created_at: Utc::now(),
        }
    }
}
