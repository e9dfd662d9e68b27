//! Queued mutation records and their typed view.
//!
//! A `QueuedOperation` is what the store persists: a wire type name, an
//! opaque JSON payload, and retry bookkeeping. `Operation` is the closed,
//! typed view used to create records and to dispatch them. Records are
//! kept loosely typed on disk so a row written by a different build can
//! still be read, reported, and dropped.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::bookmark::{BookmarkUpdate, GroupData};

/// Length of the random suffix in operation ids.
const ID_SUFFIX_LEN: usize = 9;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ============================================================================
// Operation Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    CreateBookmark,
    UpdateBookmark,
    DeleteBookmark,
    ToggleFavorite,
    ArchiveBookmark,
    RestoreBookmark,
    AddTag,
    RemoveTag,
    CreateGroup,
    UpdateGroup,
    DeleteGroup,
}

impl OperationType {
    pub const ALL: [OperationType; 11] = [
        OperationType::CreateBookmark,
        OperationType::UpdateBookmark,
        OperationType::DeleteBookmark,
        OperationType::ToggleFavorite,
        OperationType::ArchiveBookmark,
        OperationType::RestoreBookmark,
        OperationType::AddTag,
        OperationType::RemoveTag,
        OperationType::CreateGroup,
        OperationType::UpdateGroup,
        OperationType::DeleteGroup,
    ];

    /// Wire name, as persisted in the queue.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::CreateBookmark => "CREATE_BOOKMARK",
            OperationType::UpdateBookmark => "UPDATE_BOOKMARK",
            OperationType::DeleteBookmark => "DELETE_BOOKMARK",
            OperationType::ToggleFavorite => "TOGGLE_FAVORITE",
            OperationType::ArchiveBookmark => "ARCHIVE_BOOKMARK",
            OperationType::RestoreBookmark => "RESTORE_BOOKMARK",
            OperationType::AddTag => "ADD_TAG",
            OperationType::RemoveTag => "REMOVE_TAG",
            OperationType::CreateGroup => "CREATE_GROUP",
            OperationType::UpdateGroup => "UPDATE_GROUP",
            OperationType::DeleteGroup => "DELETE_GROUP",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = OperationDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OperationDecodeError::UnknownType(s.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum OperationDecodeError {
    #[error("Unknown operation type: {0}")]
    UnknownType(String),

    #[error("Invalid payload for {op_type}: {source}")]
    InvalidPayload {
        op_type: OperationType,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Typed Operation
// ============================================================================

/// A mutation against the backend, one variant per operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    CreateBookmark {
        url: String,
        #[serde(rename = "groupId", default)]
        group_id: Option<String>,
    },
    UpdateBookmark {
        id: String,
        data: BookmarkUpdate,
    },
    DeleteBookmark {
        id: String,
    },
    ToggleFavorite {
        id: String,
        #[serde(rename = "isFavorite")]
        is_favorite: bool,
    },
    ArchiveBookmark {
        id: String,
    },
    RestoreBookmark {
        id: String,
    },
    AddTag {
        id: String,
        tag: String,
    },
    RemoveTag {
        id: String,
        tag: String,
    },
    CreateGroup(GroupData),
    UpdateGroup {
        id: String,
        data: GroupData,
    },
    DeleteGroup {
        id: String,
    },
}

impl Operation {
    pub fn op_type(&self) -> OperationType {
        match self {
            Operation::CreateBookmark { .. } => OperationType::CreateBookmark,
            Operation::UpdateBookmark { .. } => OperationType::UpdateBookmark,
            Operation::DeleteBookmark { .. } => OperationType::DeleteBookmark,
            Operation::ToggleFavorite { .. } => OperationType::ToggleFavorite,
            Operation::ArchiveBookmark { .. } => OperationType::ArchiveBookmark,
            Operation::RestoreBookmark { .. } => OperationType::RestoreBookmark,
            Operation::AddTag { .. } => OperationType::AddTag,
            Operation::RemoveTag { .. } => OperationType::RemoveTag,
            Operation::CreateGroup(_) => OperationType::CreateGroup,
            Operation::UpdateGroup { .. } => OperationType::UpdateGroup,
            Operation::DeleteGroup { .. } => OperationType::DeleteGroup,
        }
    }

    /// Split into the persisted `(type, payload)` pair.
    pub fn to_parts(&self) -> Result<(OperationType, Value), serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        let payload = value
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok((self.op_type(), payload))
    }

    /// Rebuild from a persisted `(type, payload)` pair.
    pub fn from_parts(op_type: &str, payload: &Value) -> Result<Self, OperationDecodeError> {
        let known: OperationType = op_type.parse()?;
        let tagged = serde_json::json!({ "type": op_type, "payload": payload });
        serde_json::from_value(tagged).map_err(|source| OperationDecodeError::InvalidPayload {
            op_type: known,
            source,
        })
    }
}

// ============================================================================
// Persisted Record
// ============================================================================

/// A durably stored mutation waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct QueuedOperation {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: String,
    pub payload: Value,
    /// Enqueue time, Unix milliseconds
    pub timestamp: i64,
    pub retries: u32,
}

impl QueuedOperation {
    /// Build a fresh record for `operation` enqueued at `timestamp` (ms).
    pub fn new(operation: &Operation, timestamp: i64) -> Result<Self, serde_json::Error> {
        let (op_type, payload) = operation.to_parts()?;
        Ok(Self {
            id: generate_id(op_type, timestamp),
            op_type: op_type.as_str().to_string(),
            payload,
            timestamp,
            retries: 0,
        })
    }

    /// Decode the typed operation for dispatch.
    pub fn operation(&self) -> Result<Operation, OperationDecodeError> {
        Operation::from_parts(&self.op_type, &self.payload)
    }
}

/// `{TYPE}-{timestamp}-{random}`, unique even for same-millisecond enqueues.
fn generate_id(op_type: OperationType, timestamp: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", op_type.as_str(), timestamp, suffix)
}

// ============================================================================
// Queue Reports
// ============================================================================

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ReplaySummary {
    pub processed: usize,
    pub failed: usize,
    pub remaining: usize,
}

/// Snapshot of the queue for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct QueueStatus {
    pub size: usize,
    pub operations: Vec<QueuedOperation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let op = Operation::DeleteBookmark { id: "b1".into() };
        let queued = QueuedOperation::new(&op, 1_700_000_000_000).unwrap();

        let parts: Vec<&str> = queued.id.splitn(3, '-').collect();
        assert_eq!(parts[0], "DELETE_BOOKMARK");
        assert_eq!(parts[1], "1700000000000");
        assert_eq!(parts[2].len(), ID_SUFFIX_LEN);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_same_millisecond_ids_differ() {
        let op = Operation::ArchiveBookmark { id: "b1".into() };
        let a = QueuedOperation::new(&op, 42).unwrap();
        let b = QueuedOperation::new(&op, 42).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_wire_payload_shapes() {
        let op = Operation::ToggleFavorite {
            id: "b1".into(),
            is_favorite: true,
        };
        let queued = QueuedOperation::new(&op, 1).unwrap();
        assert_eq!(queued.op_type, "TOGGLE_FAVORITE");
        assert_eq!(queued.payload, serde_json::json!({"id": "b1", "isFavorite": true}));

        let group = Operation::CreateGroup(GroupData {
            name: "Reading".into(),
            color: "#ff0000".into(),
        });
        let queued = QueuedOperation::new(&group, 1).unwrap();
        assert_eq!(
            queued.payload,
            serde_json::json!({"name": "Reading", "color": "#ff0000"})
        );
    }

    #[test]
    fn test_decode_restores_update_payload() {
        let payload = serde_json::json!({"id": "b1", "data": {"title": "X"}});
        let op = Operation::from_parts("UPDATE_BOOKMARK", &payload).unwrap();
        assert_eq!(
            op,
            Operation::UpdateBookmark {
                id: "b1".into(),
                data: BookmarkUpdate {
                    title: Some("X".into()),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = Operation::from_parts("PIN_BOOKMARK", &serde_json::json!({"id": "b1"}))
            .unwrap_err();
        assert!(matches!(err, OperationDecodeError::UnknownType(ref t) if t == "PIN_BOOKMARK"));
    }

    #[test]
    fn test_decode_invalid_payload() {
        let err = Operation::from_parts("ADD_TAG", &serde_json::json!({"id": "b1"})).unwrap_err();
        assert!(matches!(
            err,
            OperationDecodeError::InvalidPayload {
                op_type: OperationType::AddTag,
                ..
            }
        ));
    }

    #[test]
    fn test_operation_type_parse() {
        for t in OperationType::ALL {
            assert_eq!(t.as_str().parse::<OperationType>().unwrap(), t);
        }
        assert!("create_bookmark".parse::<OperationType>().is_err());
    }
}
