use serde::de::{self, Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Event field holding the purchased line items.
pub const ITEMS_FIELD: &str = "items";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EventError {
    #[error("event has no `{0}` field")]
    MissingField(String),
    #[error("event field `{field}` is not a list of items: {reason}")]
    InvalidItems { field: String, reason: String },
}

/// The triggering purchase event, kept as the raw object the host delivered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventData(Map<String, Value>);

impl EventData {
    pub fn new(fields: Map<String, Value>) -> Self {
        EventData(fields)
    }

    /// Looks up an event field by key path. Dots separate segments and a
    /// numeric segment indexes into an array, so `items.0.item_id` works.
    /// A key that itself contains dots is matched whole before splitting.
    pub fn get_event_data(&self, key_path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(key_path) {
            return Some(value);
        }

        let mut segments = key_path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(list) => list.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn purchased_items(&self) -> Result<Vec<PurchasedItem>, EventError> {
        let raw = self
            .get_event_data(ITEMS_FIELD)
            .ok_or_else(|| EventError::MissingField(ITEMS_FIELD.to_string()))?;
        debug!("Purchased items: {}", raw);

        Vec::<PurchasedItem>::deserialize(raw).map_err(|e| EventError::InvalidItems {
            field: ITEMS_FIELD.to_string(),
            reason: e.to_string(),
        })
    }
}

impl<'de> Deserialize<'de> for EventData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw_value: Value = Deserialize::deserialize(deserializer)?;
        match raw_value {
            Value::Object(fields) => Ok(EventData(fields)),
            other => Err(de::Error::custom(format!(
                "unsupported event type, expected an object: {other}"
            ))),
        }
    }
}

/// One line item of a purchase event.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchasedItem {
    /// `None` when the item carries no usable identifier.
    pub item_id: Option<String>,
    pub fields: Map<String, Value>,
}

impl PurchasedItem {
    pub fn new(item_id: impl Into<String>) -> Self {
        let item_id = item_id.into();
        let mut fields = Map::new();
        fields.insert("item_id".to_string(), Value::String(item_id.clone()));
        PurchasedItem {
            item_id: Some(item_id),
            fields,
        }
    }
}

impl<'de> Deserialize<'de> for PurchasedItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        let item_id = match fields.get("item_id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(number_key(id)),
            _ => None,
        };
        Ok(PurchasedItem { item_id, fields })
    }
}

/// Dataset keys are strings, so a numeric id is looked up by its shortest
/// decimal form: `4711.0` becomes `"4711"`, `12.5` stays `"12.5"`.
fn number_key(id: &Number) -> String {
    if let Some(i) = id.as_u64() {
        return i.to_string();
    }
    if let Some(i) = id.as_i64() {
        return i.to_string();
    }
    match id.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => id.to_string(),
    }
}
