use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier the name-resolution service assigns to a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub i64);

impl LocationId {
    /// Read an identifier out of one search record.
    ///
    /// Returns `None` for anything that is not an object carrying an integer
    /// under `field`; such records are simply not matches.
    pub fn from_record(record: &Value, field: &str) -> Option<Self> {
        record.as_object()?.get(field)?.as_i64().map(LocationId)
    }
}

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LocationId {
    fn from(value: i64) -> Self {
        LocationId(value)
    }
}

/// Weather detail exactly as the upstream returned it.
pub type WeatherPayload = Map<String, Value>;
