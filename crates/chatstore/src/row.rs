use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::query::Filter;

/// A record as the store returns it: column name to JSON value.
pub type Row = Map<String, Value>;

pub const MESSAGES_TABLE: &str = "peer_support_chats";
pub const MINDFULNESS_TABLE: &str = "mindfulness_entries";
pub const PROFILES_TABLE: &str = "profiles";

/// Primary key, normalised to text. Tables use either uuids or integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// The `id` column of a raw row.
    pub fn of(row: &Row) -> Option<Self> {
        row.get("id").and_then(Self::from_value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(d)?;
        RowId::from_value(&v).ok_or_else(|| serde::de::Error::custom("id must be a string or integer"))
    }
}

/// Typed view of a `peer_support_chats` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: RowId,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub is_anonymous: Option<bool>,
}

impl MessageRow {
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(row.clone())).map_err(|e| StoreError::Decode {
            table: MESSAGES_TABLE.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Fields for a new outgoing message; the store assigns id and timestamps.
    pub fn new_outgoing(sender_id: &str, receiver_id: &str, envelope: String, anonymous: bool) -> Row {
        let mut row = Row::new();
        row.insert("sender_id".into(), Value::from(sender_id));
        row.insert("receiver_id".into(), Value::from(receiver_id));
        row.insert("message".into(), Value::from(envelope));
        row.insert("is_anonymous".into(), Value::from(anonymous));
        row.insert("is_read".into(), Value::from(false));
        row
    }

    /// Messages exchanged between `a` and `b`, in either direction.
    pub fn conversation_filter(a: &str, b: &str) -> Filter {
        Filter::AnyOf(vec![
            vec![Filter::eq("sender_id", a), Filter::eq("receiver_id", b)],
            vec![Filter::eq("sender_id", b), Filter::eq("receiver_id", a)],
        ])
    }
}
