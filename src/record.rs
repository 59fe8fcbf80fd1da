//! Call records: the persisted `(args, outcome)` pair for one fixture call.
//!
//! Stored shape (4-space indent, trailing newline):
//!
//! ```json
//! {
//!     "args": [6, 2],
//!     "result": {
//!         "success": true,
//!         "data": 3
//!     }
//! }
//! ```

use crate::error::{Error, Result};
use crate::json_eq::{JsonKind, json_equals};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

const INDENT: &[u8] = b"    ";

/// Tagged outcome of a real function call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOutcome {
    Success(Value),
    Failure(Value),
}

impl RecordedOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub const fn payload(&self) -> &Value {
        match self {
            Self::Success(value) | Self::Failure(value) => value,
        }
    }
}

impl Serialize for RecordedOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            Self::Success(data) => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("data", data)?;
            }
            Self::Failure(error) => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}

/// One stored fixture call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub args: Value,
    pub result: RecordedOutcome,
}

impl Serialize for CallRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("args", &self.args)?;
        map.serialize_entry("result", &self.result)?;
        map.end()
    }
}

impl CallRecord {
    pub const fn success(args: Value, data: Value) -> Self {
        Self {
            args,
            result: RecordedOutcome::Success(data),
        }
    }

    pub const fn failure(args: Value, error: Value) -> Self {
        Self {
            args,
            result: RecordedOutcome::Failure(error),
        }
    }

    /// Whether this record was made for `args`.
    pub fn matches_args(&self, args: &Value) -> bool {
        json_equals(&self.args, args)
    }

    /// Parses stored text, validating the call-record shape.
    ///
    /// `key` only labels the error.
    pub fn parse(key: &str, text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| Error::malformed(key, format!("invalid JSON: {err}")))?;
        Self::from_value(key, value)
    }

    /// Validates an already-decoded JSON value as a call record.
    pub fn from_value(key: &str, value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(Error::malformed(key, "record is not an object"));
        };
        let Some(args) = root.remove("args") else {
            return Err(Error::malformed(key, "missing \"args\""));
        };
        let Some(result) = root.remove("result") else {
            return Err(Error::malformed(key, "missing \"result\""));
        };
        if let Some(extra) = root.keys().next() {
            return Err(Error::malformed(key, format!("unexpected key {extra:?}")));
        }

        let Value::Object(mut result) = result else {
            return Err(Error::malformed(key, "\"result\" is not an object"));
        };
        let outcome = match result.remove("success") {
            Some(Value::Bool(true)) => {
                let data = result
                    .remove("data")
                    .ok_or_else(|| Error::malformed(key, "successful result without \"data\""))?;
                RecordedOutcome::Success(data)
            }
            Some(Value::Bool(false)) => {
                let error = result
                    .remove("error")
                    .ok_or_else(|| Error::malformed(key, "failed result without \"error\""))?;
                RecordedOutcome::Failure(error)
            }
            Some(other) => {
                return Err(Error::malformed(
                    key,
                    format!("\"success\" must be a boolean, found {}", JsonKind::of(&other)),
                ));
            }
            None => return Err(Error::malformed(key, "missing \"result.success\"")),
        };
        if let Some(extra) = result.keys().next() {
            return Err(Error::malformed(
                key,
                format!("unexpected key {extra:?} in \"result\""),
            ));
        }

        Ok(Self {
            args,
            result: outcome,
        })
    }

    /// Canonical stored text: `args` before `result`, 4-space indent,
    /// trailing newline.
    pub fn to_canonical_string(&self) -> Result<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        out.push(b'\n');
        String::from_utf8(out).map_err(|err| Error::misuse(format!("non UTF-8 record: {err}")))
    }
}

/// Canonical text for an attempted call that has no baseline, used when
/// reporting a missing record.
pub fn render_attempt(args: &Value) -> Result<String> {
    CallRecord::success(args.clone(), Value::Null).to_canonical_string()
}
