//! Normalized row types
//!
//! One ingested event becomes a [`HeaderRow`] plus a [`PayloadRow`]. Header
//! rows refer to the dimension rows ([`ProviderInfoRow`], [`TaskInfoRow`],
//! [`OperationInfoRow`]) through compact keys.

use serde::{Deserialize, Serialize};

use crate::overlay::HasKey;
use crate::time::EpochTicks;

/// Surrogate id of a provider, dense from 1
pub type ProviderId = u32;

/// Compact header of one event record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRow {
    /// Record id, the primary order key
    pub rid: i64,
    /// Creation time in epoch ticks
    pub stamp: EpochTicks,
    /// Event type id
    pub event_id: i32,
    /// Event type version
    pub event_version: i32,
    /// Task id
    pub task_id: i32,
    /// Provider surrogate id
    pub provider_id: ProviderId,
    /// Operation (opcode) id
    pub operation_id: i32,
}

impl HeaderRow {
    /// Key of the task dimension row this header refers to
    pub fn task_key(&self) -> TaskKey {
        TaskKey {
            event_id: self.event_id,
            event_version: self.event_version,
            task_id: self.task_id,
            provider_id: self.provider_id,
        }
    }

    /// Key of the operation dimension row this header refers to
    pub fn operation_key(&self) -> OperationKey {
        OperationKey {
            task: self.task_key(),
            operation_id: self.operation_id,
        }
    }
}

/// Payload text of one event record, 1:1 with its header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRow {
    pub rid: i64,
    pub payload: String,
}

/// A provider known to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfoRow {
    /// Surrogate id, permanent once assigned
    pub provider_id: ProviderId,
    /// Unique provider name
    pub name: String,
    /// Provider GUID, if the source declared one
    pub guid: Option<String>,
}

impl ProviderInfoRow {
    pub fn new(provider_id: ProviderId, name: impl Into<String>, guid: Option<String>) -> Self {
        Self {
            provider_id,
            name: name.into(),
            guid,
        }
    }
}

impl HasKey for ProviderInfoRow {
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }
}

/// Description attached to a task or operation dimension row
///
/// `Unknown` means no lookup was attempted yet; `Empty` means one was
/// attempted and found nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Description {
    #[default]
    Unknown,
    Empty,
    Text(String),
}

impl Description {
    /// Whether a lookup still has to be attempted
    pub fn is_unknown(&self) -> bool {
        matches!(self, Description::Unknown)
    }

    /// The description text, if there is any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Description::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<Option<String>> for Description {
    fn from(value: Option<String>) -> Self {
        match value {
            None => Description::Unknown,
            Some(text) if text.is_empty() => Description::Empty,
            Some(text) => Description::Text(text),
        }
    }
}

impl From<&str> for Description {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Description::Empty
        } else {
            Description::Text(value.to_string())
        }
    }
}

/// Key of a task dimension row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub event_id: i32,
    pub event_version: i32,
    pub task_id: i32,
    pub provider_id: ProviderId,
}

impl TaskKey {
    pub fn new(event_id: i32, event_version: i32, task_id: i32, provider_id: ProviderId) -> Self {
        Self {
            event_id,
            event_version,
            task_id,
            provider_id,
        }
    }

    /// Tuple form used as the table key
    pub fn as_tuple(&self) -> (i32, i32, i32, ProviderId) {
        (self.event_id, self.event_version, self.task_id, self.provider_id)
    }

    pub fn from_tuple((event_id, event_version, task_id, provider_id): (i32, i32, i32, ProviderId)) -> Self {
        Self::new(event_id, event_version, task_id, provider_id)
    }
}

/// Key of an operation dimension row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationKey {
    pub task: TaskKey,
    pub operation_id: i32,
}

impl OperationKey {
    pub fn new(task: TaskKey, operation_id: i32) -> Self {
        Self { task, operation_id }
    }

    /// Tuple form used as the table key
    pub fn as_tuple(&self) -> (i32, i32, i32, ProviderId, i32) {
        let (e, v, t, p) = self.task.as_tuple();
        (e, v, t, p, self.operation_id)
    }

    pub fn from_tuple((e, v, t, p, o): (i32, i32, i32, ProviderId, i32)) -> Self {
        Self::new(TaskKey::new(e, v, t, p), o)
    }
}

/// Task dimension row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfoRow {
    pub key: TaskKey,
    pub description: Description,
}

impl TaskInfoRow {
    pub fn new(key: TaskKey, description: impl Into<Description>) -> Self {
        Self {
            key,
            description: description.into(),
        }
    }
}

impl HasKey for TaskInfoRow {
    type Key = TaskKey;

    fn key(&self) -> TaskKey {
        self.key
    }
}

/// Operation dimension row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfoRow {
    pub key: OperationKey,
    pub description: Description,
}

impl OperationInfoRow {
    pub fn new(key: OperationKey, description: impl Into<Description>) -> Self {
        Self {
            key,
            description: description.into(),
        }
    }
}

impl HasKey for OperationInfoRow {
    type Key = OperationKey;

    fn key(&self) -> OperationKey {
        self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_from_option() {
        assert_eq!(Description::from(None), Description::Unknown);
        assert_eq!(Description::from(Some(String::new())), Description::Empty);
        assert_eq!(
            Description::from(Some("Logon".to_string())),
            Description::Text("Logon".to_string())
        );
        assert!(Description::default().is_unknown());
        assert_eq!(Description::from("Logon").as_text(), Some("Logon"));
        assert_eq!(Description::Empty.as_text(), None);
    }

    #[test]
    fn test_header_keys() {
        let header = HeaderRow {
            rid: 42,
            stamp: 0,
            event_id: 4624,
            event_version: 2,
            task_id: 12544,
            provider_id: 3,
            operation_id: 0,
        };
        assert_eq!(header.task_key().as_tuple(), (4624, 2, 12544, 3));
        assert_eq!(header.operation_key().as_tuple(), (4624, 2, 12544, 3, 0));
        assert_eq!(
            OperationKey::from_tuple(header.operation_key().as_tuple()),
            header.operation_key()
        );
    }

    #[test]
    fn test_rows_serialize() {
        let row = TaskInfoRow::new(TaskKey::new(1, 0, 2, 1), "Process Creation");
        let json = serde_json::to_string(&row).unwrap();
        let back: TaskInfoRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
