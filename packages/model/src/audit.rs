//! Audit log records. Append-only on the server, immutable here.

use chrono::{DateTime, Utc};
use plaid_common::Id;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditUser {
    pub id: Id,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditOp {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Id,
    pub time: DateTime<Utc>,
    pub user: AuditUser,
    #[serde(default)]
    pub ops: Vec<AuditOp>,
}

impl AuditEntry {
    /// One-line summary of the entry's operations
    pub fn summary(&self) -> String {
        self.ops
            .iter()
            .map(|op| {
                if op.description.is_empty() {
                    op.op_type.clone()
                } else {
                    op.description.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
