//! Serializer/deserializer pairs that turn call arguments and outcomes into
//! JSON values and back.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;

/// Converts one fixture's arguments, success values and errors.
pub trait Codec<A, T, E>: Send + Sync {
    fn serialize_args(&self, args: &A) -> Result<Value>;
    fn serialize_success(&self, value: &T) -> Result<Value>;
    fn deserialize_success(&self, value: Value) -> Result<T>;
    fn serialize_error(&self, error: &E) -> Result<Value>;
    fn deserialize_error(&self, value: Value) -> Result<E>;
}

/// Error half of a codec.
pub trait ErrorCodec<E>: Send + Sync {
    fn serialize_error(&self, error: &E) -> Result<Value>;
    fn deserialize_error(&self, value: Value) -> Result<E>;
}

/// Serde for arguments and success values; errors go through `EC`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeCodec<EC = PlainErrorCodec> {
    errors: EC,
}

impl SerdeCodec<PlainErrorCodec> {
    pub const fn new() -> Self {
        Self {
            errors: PlainErrorCodec,
        }
    }
}

impl<EC> SerdeCodec<EC> {
    pub const fn with_error_codec(errors: EC) -> Self {
        Self { errors }
    }
}

impl<A, T, E, EC> Codec<A, T, E> for SerdeCodec<EC>
where
    A: Serialize,
    T: Serialize + DeserializeOwned,
    EC: ErrorCodec<E>,
{
    fn serialize_args(&self, args: &A) -> Result<Value> {
        Ok(serde_json::to_value(args)?)
    }

    fn serialize_success(&self, value: &T) -> Result<Value> {
        Ok(serde_json::to_value(value)?)
    }

    fn deserialize_success(&self, value: Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }

    fn serialize_error(&self, error: &E) -> Result<Value> {
        self.errors.serialize_error(error)
    }

    fn deserialize_error(&self, value: Value) -> Result<E> {
        self.errors.deserialize_error(value)
    }
}

/// A message-only error, the only kind the default error codec stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct PlainError {
    pub message: String,
}

impl PlainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Default error codec: stores `{"message": ...}` and nothing else.
///
/// Richer errors are rejected instead of being flattened, since a replay
/// that loses the error type no longer behaves like the real function.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainErrorCodec;

fn plain_error_from_value(value: Value) -> Result<PlainError> {
    let Value::Object(mut map) = value else {
        return Err(Error::misuse(format!(
            "stored error is not a plain error object: {value}"
        )));
    };
    let message = match map.remove("message") {
        Some(Value::String(message)) => message,
        _ => {
            return Err(Error::misuse(
                "stored error is missing a string \"message\"",
            ));
        }
    };
    if let Some(extra) = map.keys().next() {
        return Err(Error::misuse(format!(
            "stored error has unexpected key {extra:?}; plain errors carry only a message"
        )));
    }
    Ok(PlainError { message })
}

impl ErrorCodec<PlainError> for PlainErrorCodec {
    fn serialize_error(&self, error: &PlainError) -> Result<Value> {
        Ok(serde_json::json!({ "message": error.message }))
    }

    fn deserialize_error(&self, value: Value) -> Result<PlainError> {
        plain_error_from_value(value)
    }
}

type DynError = Box<dyn std::error::Error + Send + Sync>;

impl ErrorCodec<DynError> for PlainErrorCodec {
    fn serialize_error(&self, error: &DynError) -> Result<Value> {
        match error.downcast_ref::<PlainError>() {
            Some(plain) => ErrorCodec::<PlainError>::serialize_error(self, plain),
            None => Err(Error::UnsupportedError {
                type_name: error_type_name(error.as_ref()),
            }),
        }
    }

    fn deserialize_error(&self, value: Value) -> Result<DynError> {
        Ok(Box::new(plain_error_from_value(value)?))
    }
}

/// Best-effort name for a type-erased error.
///
/// Common std and serde errors are recognized exactly. Anything else is named
/// by the leading identifier of its `Debug` output, which is the type name for
/// structs but the variant name for derived enums. Callers that need exact
/// names should supply their own [`ErrorCodec`].
fn error_type_name(error: &(dyn std::error::Error + Send + Sync + 'static)) -> String {
    if error.is::<std::io::Error>() {
        return "std::io::Error".to_string();
    }
    if error.is::<serde_json::Error>() {
        return "serde_json::Error".to_string();
    }
    if error.is::<std::fmt::Error>() {
        return "std::fmt::Error".to_string();
    }
    if error.is::<std::num::ParseIntError>() {
        return "std::num::ParseIntError".to_string();
    }
    // Derived Debug output starts with the type name.
    let debug = format!("{error:?}");
    let name: String = debug
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == ':')
        .collect();
    if name.is_empty() {
        format!("<unknown> ({debug})")
    } else {
        name
    }
}

/// Error codec for serde-serializable error types.
pub struct SerdeErrorCodec<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E> SerdeErrorCodec<E> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E> Default for SerdeErrorCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for SerdeErrorCodec<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SerdeErrorCodec")
    }
}

impl<E> ErrorCodec<E> for SerdeErrorCodec<E>
where
    E: Serialize + DeserializeOwned,
{
    fn serialize_error(&self, error: &E) -> Result<Value> {
        Ok(serde_json::to_value(error)?)
    }

    fn deserialize_error(&self, value: Value) -> Result<E> {
        Ok(serde_json::from_value(value)?)
    }
}

type SerializeFn<X> = Box<dyn Fn(&X) -> Result<Value> + Send + Sync>;
type DeserializeFn<X> = Box<dyn Fn(Value) -> Result<X> + Send + Sync>;

/// Codec assembled from five caller-supplied functions.
pub struct FnCodec<A, T, E> {
    args: SerializeFn<A>,
    success: SerializeFn<T>,
    success_back: DeserializeFn<T>,
    error: SerializeFn<E>,
    error_back: DeserializeFn<E>,
}

impl<A, T, E> FnCodec<A, T, E> {
    pub fn new(
        serialize_args: impl Fn(&A) -> Result<Value> + Send + Sync + 'static,
        serialize_success: impl Fn(&T) -> Result<Value> + Send + Sync + 'static,
        deserialize_success: impl Fn(Value) -> Result<T> + Send + Sync + 'static,
        serialize_error: impl Fn(&E) -> Result<Value> + Send + Sync + 'static,
        deserialize_error: impl Fn(Value) -> Result<E> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args: Box::new(serialize_args),
            success: Box::new(serialize_success),
            success_back: Box::new(deserialize_success),
            error: Box::new(serialize_error),
            error_back: Box::new(deserialize_error),
        }
    }
}

impl<A, T, E> Codec<A, T, E> for FnCodec<A, T, E> {
    fn serialize_args(&self, args: &A) -> Result<Value> {
        (self.args)(args)
    }

    fn serialize_success(&self, value: &T) -> Result<Value> {
        (self.success)(value)
    }

    fn deserialize_success(&self, value: Value) -> Result<T> {
        (self.success_back)(value)
    }

    fn serialize_error(&self, error: &E) -> Result<Value> {
        (self.error)(error)
    }

    fn deserialize_error(&self, value: Value) -> Result<E> {
        (self.error_back)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_eq::json_equals;
    use serde_json::json;

    #[test]
    fn serde_codec_round_trips_success_values() {
        type Pairs = Vec<(String, Option<i64>)>;
        let codec = SerdeCodec::new();
        let value: Pairs = vec![("a".to_string(), Some(1)), ("b".to_string(), None)];
        let encoded = Codec::<(), Pairs, PlainError>::serialize_success(&codec, &value).unwrap();
        let decoded =
            Codec::<(), Pairs, PlainError>::deserialize_success(&codec, encoded.clone()).unwrap();
        assert_eq!(decoded, value);
        let again = Codec::<(), Pairs, PlainError>::serialize_success(&codec, &decoded).unwrap();
        assert!(json_equals(&encoded, &again));
    }

    #[test]
    fn plain_errors_round_trip() {
        let err = PlainError::new("division by zero");
        let encoded = ErrorCodec::<PlainError>::serialize_error(&PlainErrorCodec, &err).unwrap();
        assert_eq!(encoded, json!({"message": "division by zero"}));
        let decoded = ErrorCodec::<PlainError>::deserialize_error(&PlainErrorCodec, encoded).unwrap();
        assert_eq!(decoded, err);
    }

    #[test]
    fn boxed_plain_errors_round_trip() {
        let err: DynError = Box::new(PlainError::new("nope"));
        let encoded = ErrorCodec::<DynError>::serialize_error(&PlainErrorCodec, &err).unwrap();
        let decoded = ErrorCodec::<DynError>::deserialize_error(&PlainErrorCodec, encoded).unwrap();
        assert_eq!(decoded.to_string(), "nope");
        assert!(decoded.downcast_ref::<PlainError>().is_some());
    }

    #[test]
    fn default_codec_rejects_rich_errors_by_name() {
        #[derive(Debug, thiserror::Error)]
        #[error("timeout after {0}ms")]
        struct TimeoutError(u64);

        let err: DynError = Box::new(TimeoutError(30));
        let failure = ErrorCodec::<DynError>::serialize_error(&PlainErrorCodec, &err).unwrap_err();
        assert!(
            matches!(failure, Error::UnsupportedError { ref type_name } if type_name == "TimeoutError"),
            "{failure}"
        );

        let io: DynError = Box::new(std::io::Error::other("disk"));
        let failure = ErrorCodec::<DynError>::serialize_error(&PlainErrorCodec, &io).unwrap_err();
        assert!(failure.to_string().contains("std::io::Error"));
        assert!(failure.to_string().contains("best-effort"));
    }

    #[test]
    fn unnamed_errors_are_reported_with_their_debug_text() {
        #[derive(Debug, thiserror::Error)]
        enum ApiError {
            #[error("not found")]
            NotFound,
        }

        let enum_err: DynError = Box::new(ApiError::NotFound);
        let failure =
            ErrorCodec::<DynError>::serialize_error(&PlainErrorCodec, &enum_err).unwrap_err();
        assert!(matches!(failure, Error::UnsupportedError { ref type_name } if type_name == "NotFound"));

        let text_err: DynError = Box::from("msg");
        let failure =
            ErrorCodec::<DynError>::serialize_error(&PlainErrorCodec, &text_err).unwrap_err();
        assert!(
            matches!(failure, Error::UnsupportedError { ref type_name } if type_name == "<unknown> (\"msg\")"),
            "{failure}"
        );
    }

    #[test]
    fn default_codec_rejects_non_plain_stored_errors() {
        let codec = PlainErrorCodec;
        for stored in [json!("text"), json!({}), json!({"message": 1}), json!({"message": "m", "code": 7})] {
            assert!(ErrorCodec::<PlainError>::deserialize_error(&codec, stored).is_err());
        }
    }

    #[test]
    fn serde_error_codec_keeps_rich_errors() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        enum ApiError {
            RateLimited { retry_after: u32 },
            NotFound(String),
        }

        let codec = SerdeErrorCodec::<ApiError>::new();
        for err in [ApiError::RateLimited { retry_after: 5 }, ApiError::NotFound("x".into())] {
            let encoded = codec.serialize_error(&err).unwrap();
            assert_eq!(codec.deserialize_error(encoded).unwrap(), err);
        }
    }

    #[test]
    fn fn_codec_delegates() {
        let codec: FnCodec<(i64, i64), i64, String> = FnCodec::new(
            |(a, b)| Ok(json!([a, b])),
            |v| Ok(json!(v)),
            |v| v.as_i64().ok_or_else(|| Error::misuse("not an integer")),
            |e| Ok(json!(e)),
            |v| Ok(v.as_str().unwrap_or_default().to_string()),
        );
        assert_eq!(codec.serialize_args(&(6, 2)).unwrap(), json!([6, 2]));
        assert_eq!(codec.deserialize_success(json!(3)).unwrap(), 3);
        assert!(codec.deserialize_success(json!("3")).is_err());
        assert_eq!(codec.deserialize_error(json!("bad")).unwrap(), "bad");
    }
}
