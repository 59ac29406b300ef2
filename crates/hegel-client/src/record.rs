//! Machine records as returned by the hardware backend

use hegel_common::{Error, Result};
use serde_json::Value;

/// One machine's record, held for the lifetime of a single request
#[derive(Clone, Debug, PartialEq)]
pub struct Hardware {
    document: Value,
}

impl Hardware {
    /// Parse a record from the JSON text carried on the wire
    ///
    /// # Errors
    /// Returns `Error::MalformedRecord` if the text is not a JSON object.
    pub fn from_json(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| Error::MalformedRecord(e.to_string()))?;
        Self::from_value(document)
    }

    /// Wrap an already-decoded document
    ///
    /// # Errors
    /// Returns `Error::MalformedRecord` if the document is not an object.
    pub fn from_value(document: Value) -> Result<Self> {
        if !document.is_object() {
            return Err(Error::MalformedRecord(
                "hardware record is not a JSON object".to_string(),
            ));
        }
        Ok(Self { document })
    }

    /// The record as a JSON tree
    #[must_use]
    pub const fn document(&self) -> &Value {
        &self.document
    }

    /// Instance id, if the record carries an instance
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.document
            .pointer("/metadata/instance/id")
            .and_then(Value::as_str)
    }
}
