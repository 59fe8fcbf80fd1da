//! Detects stored call records that a run never replayed.

use crate::error::{Error, Result};
use crate::store::{RecordKey, RecordStore};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt::Write as _;

/// Whether every stored record of a fixture was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fulfillment {
    Fulfilled,
    Unfulfilled {
        name: String,
        unconsumed: Vec<RecordKey>,
        error: String,
    },
}

impl Fulfillment {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Fulfilled)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Fulfilled => None,
            Self::Unfulfilled { error, .. } => Some(error),
        }
    }

    /// Turns an unfulfilled result into an expectation failure carrying the report.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Fulfilled => Ok(()),
            Self::Unfulfilled {
                name,
                unconsumed,
                error,
            } => Err(Error::Unfulfilled {
                name,
                unconsumed: unconsumed.iter().map(RecordKey::file_name).collect(),
                report: error,
            }),
        }
    }
}

/// Serializes as `{"success": true}` or `{"success": false, "error": "..."}`.
impl Serialize for Fulfillment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Fulfilled => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("success", &true)?;
                map.end()
            }
            Self::Unfulfilled { error, .. } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

/// Compares the stored records of `name` against `consumed` calls.
///
/// Consuming more calls than there are records counts as fulfilled.
pub async fn check_fulfillment(
    store: &dyn RecordStore,
    name: &str,
    consumed: u32,
) -> Result<Fulfillment> {
    let indices = store.list_indices(name).await?;
    let unconsumed = indices
        .into_iter()
        .filter(|index| *index > consumed)
        .map(|index| RecordKey::new(name, index))
        .collect::<Result<Vec<_>>>()?;
    if unconsumed.is_empty() {
        return Ok(Fulfillment::Fulfilled);
    }

    let mut error = format!(
        "Fixture {name} consumed {consumed} call(s) but {} stored record(s) in {} were never replayed:\n",
        unconsumed.len(),
        store.describe()
    );
    for key in &unconsumed {
        let _ = writeln!(error, "  {key}");
    }
    error.push_str("Delete these records if the calls are no longer expected.");
    Ok(Fulfillment::Unfulfilled {
        name: name.to_string(),
        unconsumed,
        error,
    })
}
