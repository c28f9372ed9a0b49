//! Incoming claim records: payload shape and key normalisation.

use serde_json::{Map, Value};

use crate::error::ValidationError;

/// One claim as posted by a client, with keys normalised the way the
/// training data was (`" patient  share "` -> `PATIENT_SHARE`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimRecord {
    fields: Map<String, Value>,
}

/// A request body is either a single claim or a list of claims.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Single(ClaimRecord),
    Batch(Vec<ClaimRecord>),
}

pub fn normalize_key(key: &str) -> String {
    key.split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

impl ClaimRecord {
    pub fn from_object(raw: Map<String, Value>) -> Result<Self, ValidationError> {
        let mut fields = Map::with_capacity(raw.len());
        for (key, value) in raw {
            let normalized = normalize_key(&key);
            if fields.contains_key(&normalized) {
                return Err(ValidationError::invalid(
                    &normalized,
                    "supplied more than once after key normalisation",
                ));
            }
            fields.insert(normalized, value);
        }
        Ok(Self { fields })
    }

    /// Present and not `null`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Move `from` to `to` unless the record already carries `to`.
    pub fn alias(&mut self, from: &str, to: &str) {
        if self.fields.contains_key(to) {
            return;
        }
        if let Some(value) = self.fields.remove(from) {
            self.fields.insert(to.to_string(), value);
        }
    }

    /// Read a field as a number. Numeric strings are accepted; `None` means
    /// the field is absent or `null`.
    pub fn number(&self, key: &str) -> Result<Option<f64>, ValidationError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(ValidationError::invalid(key, "expected a finite number")),
        }
    }

    /// Read a field as a category label. Numbers and booleans are stringified.
    pub fn category(&self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(ValidationError::invalid(key, "expected a category label")),
        }
    }

    pub fn text(&self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ValidationError::invalid(key, "expected a string")),
        }
    }
}

pub fn parse_payload(body: &[u8]) -> Result<Payload, ValidationError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

    match value {
        Value::Object(map) => Ok(Payload::Single(ClaimRecord::from_object(map)?)),
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ValidationError::EmptyBatch);
            }
            items
                .into_iter()
                .enumerate()
                .map(|(row, item)| match item {
                    Value::Object(map) => {
                        ClaimRecord::from_object(map).map_err(|e| e.in_row(row))
                    }
                    _ => Err(ValidationError::UnsupportedPayload.in_row(row)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Payload::Batch)
        }
        _ => Err(ValidationError::UnsupportedPayload),
    }
}
