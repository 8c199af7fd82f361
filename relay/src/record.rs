use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field of every produced record that names the client it is addressed to.
pub const CLIENT_KEY_FIELD: &str = "localip";

/// Identifier partitioning all relay state, typically a device's local address.
/// Always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::missing_client_key());
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque structured payload supplied by a producer. The relay never looks
/// inside it beyond the client key field and hands it to consumers verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Parses a record from raw JSON bytes. Anything but a JSON object is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(fields) => Ok(Self(fields)),
            _ => Err(Error::invalid_record()),
        }
    }

    /// Reads the client key the record is addressed to.
    pub fn client_key(&self) -> Result<ClientKey, Error> {
        match self.0.get(CLIENT_KEY_FIELD) {
            Some(Value::String(key)) => ClientKey::new(key.as_str()),
            _ => Err(Error::missing_client_key()),
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayErrorKind;
    use serde_json::json;

    #[test]
    fn test_client_key_rejects_empty_string() {
        let err = ClientKey::new("").unwrap_err();
        assert_eq!(err.error_kind, RelayErrorKind::MissingClientKey);
    }

    #[test]
    fn test_from_slice_reads_client_key() {
        let record = Record::from_slice(br#"{"localip":"10.0.0.5","temp":42}"#).unwrap();

        assert_eq!(record.client_key().unwrap().as_str(), "10.0.0.5");
        assert_eq!(Value::from(record)["temp"], json!(42));
    }

    #[test]
    fn test_from_slice_rejects_non_objects() {
        for body in [&b"[1,2,3]"[..], b"\"text\"", b"42", b"{broken"] {
            let err = Record::from_slice(body).unwrap_err();
            assert_eq!(err.error_kind, RelayErrorKind::InvalidRecord);
        }
    }

    #[test]
    fn test_client_key_missing_empty_or_not_a_string() {
        for body in [
            json!({"temp": 42}),
            json!({"localip": ""}),
            json!({"localip": null}),
            json!({"localip": 17}),
        ] {
            let Value::Object(fields) = body else {
                unreachable!()
            };
            let err = Record::new(fields).client_key().unwrap_err();
            assert_eq!(err.error_kind, RelayErrorKind::MissingClientKey);
        }
    }

    #[test]
    fn test_record_serializes_as_plain_object() {
        let record = Record::from_slice(br#"{"localip":"k","on":true}"#).unwrap();
        let value: Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"localip": "k", "on": true}));
    }
}
