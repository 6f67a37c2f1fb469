use std::io::Read;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// One webhook event, as delivered in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub event_type: String,
    /// Logical resource name, e.g. `invoices`.
    pub resource: String,
    /// Sender-supplied creation time, kept verbatim.
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub id: ResourceId,
    /// Where the resource body is fetched from.
    #[serde(default)]
    pub href: String,
}

impl EventRecord {
    /// `{resource}/{id}`.
    pub fn uri(&self) -> Result<String, UnsupportedId> {
        Ok(format!("{}/{}", self.resource, self.data.id.uri_segment()?))
    }
}

/// External resource identifier.
///
/// Senders use integers, floats and strings interchangeably. Any other JSON
/// shape still decodes, as [`ResourceId::Unsupported`], so one bad event
/// does not poison its batch; it is rejected when the URI is built.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceId {
    Integer(i64),
    Float(f64),
    Text(String),
    Unsupported(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported identifier type: {kind}")]
pub struct UnsupportedId {
    pub kind: &'static str,
}

impl ResourceId {
    /// Printable form used in the record URI. Floats are truncated toward zero.
    pub fn uri_segment(&self) -> Result<String, UnsupportedId> {
        match self {
            ResourceId::Integer(n) => Ok(n.to_string()),
            ResourceId::Float(f) => Ok((f.trunc() as i64).to_string()),
            ResourceId::Text(s) => Ok(s.clone()),
            ResourceId::Unsupported(value) => Err(UnsupportedId {
                kind: json_kind(value),
            }),
        }
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        ResourceId::Unsupported(Value::Null)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl From<Value> for ResourceId {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => ResourceId::Integer(i),
                (None, Some(f)) => ResourceId::Float(f),
                (None, None) => ResourceId::Unsupported(Value::Number(n)),
            },
            Value::String(s) => ResourceId::Text(s),
            other => ResourceId::Unsupported(other),
        }
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ResourceId::from)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResourceId::Integer(n) => serializer.serialize_i64(*n),
            ResourceId::Float(f) => serializer.serialize_f64(*f),
            ResourceId::Text(s) => serializer.serialize_str(s),
            ResourceId::Unsupported(value) => value.serialize(serializer),
        }
    }
}

/// Decode a JSON array of events.
pub fn decode_batch<R: Read>(reader: R) -> Result<Vec<EventRecord>, serde_json::Error> {
    serde_json::from_reader(reader)
}
