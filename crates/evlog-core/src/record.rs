//! Raw record seam
//!
//! [`EventRecord`] is what ingestion needs from an OS event reader. The
//! description accessors are lazy: ingestion only calls them when the
//! matching dimension row has no description yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{EpochTicks, ticks_from_datetime};

/// One raw event record as produced by an event source
pub trait EventRecord {
    /// Record id; `None` marks a malformed record
    fn rid(&self) -> Option<i64>;

    /// Creation time in epoch ticks; `None` marks a malformed record
    fn timestamp(&self) -> Option<EpochTicks>;

    fn provider_name(&self) -> &str;

    fn provider_guid(&self) -> Option<&str>;

    fn event_id(&self) -> i32;

    fn version(&self) -> i32;

    fn task(&self) -> i32;

    fn opcode(&self) -> i32;

    /// Full payload text (XML for Windows event logs)
    fn payload(&self) -> &str;

    /// Look up the task display name. `Some("")` means the lookup ran but
    /// produced nothing.
    fn task_description(&self) -> Option<String> {
        None
    }

    /// Look up the opcode display name, with the same convention as
    /// [`task_description`](Self::task_description)
    fn operation_description(&self) -> Option<String> {
        None
    }
}

/// A self-contained raw record, deserializable from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEventRecord {
    #[serde(default)]
    pub rid: Option<i64>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
    pub provider: String,
    #[serde(default)]
    pub provider_guid: Option<String>,
    pub event_id: i32,
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub task: Option<i32>,
    #[serde(default)]
    pub opcode: Option<i32>,
    #[serde(default)]
    pub task_name: Option<String>,
    #[serde(default)]
    pub opcode_name: Option<String>,
    #[serde(default)]
    pub payload: String,
}

impl RawEventRecord {
    pub fn new(rid: i64, time_created: DateTime<Utc>, provider: impl Into<String>, event_id: i32) -> Self {
        Self {
            rid: Some(rid),
            time_created: Some(time_created),
            provider: provider.into(),
            event_id,
            ..Default::default()
        }
    }

    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.provider_guid = Some(guid.into());
        self
    }

    pub fn with_task(mut self, task: i32, name: Option<&str>) -> Self {
        self.task = Some(task);
        self.task_name = name.map(str::to_string);
        self
    }

    pub fn with_opcode(mut self, opcode: i32, name: Option<&str>) -> Self {
        self.opcode = Some(opcode);
        self.opcode_name = name.map(str::to_string);
        self
    }

    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }
}

impl EventRecord for RawEventRecord {
    fn rid(&self) -> Option<i64> {
        self.rid
    }

    fn timestamp(&self) -> Option<EpochTicks> {
        self.time_created.and_then(|dt| ticks_from_datetime(dt).ok())
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }

    fn provider_guid(&self) -> Option<&str> {
        self.provider_guid.as_deref()
    }

    fn event_id(&self) -> i32 {
        self.event_id
    }

    fn version(&self) -> i32 {
        self.version.unwrap_or(0)
    }

    fn task(&self) -> i32 {
        self.task.unwrap_or(0)
    }

    fn opcode(&self) -> i32 {
        self.opcode.unwrap_or(0)
    }

    fn payload(&self) -> &str {
        &self.payload
    }

    fn task_description(&self) -> Option<String> {
        self.task_name.clone()
    }

    fn operation_description(&self) -> Option<String> {
        self.opcode_name.clone()
    }
}
