//! Error types for call fixtures.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the fixture engine itself.
///
/// Errors produced by the wrapped real function are never represented here;
/// they travel through [`FixtureError::Call`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Fixture misuse (bad configuration, bad codec output, bad arguments).
    #[error("Fixture misuse: {0}")]
    Misuse(String),

    /// Unrecognized update mode value.
    #[error("Invalid update mode {value:?} (expected one of: none, new, all)")]
    InvalidMode { value: String },

    /// The default error codec was handed an error it cannot faithfully store.
    ///
    /// `type_name` is inferred from the erased error and is best-effort; a
    /// derived enum reports its variant name.
    #[error(
        "Unsupported error type (best-effort name: {type_name}): the default error codec only stores plain message errors; supply a custom error codec"
    )]
    UnsupportedError { type_name: String },

    /// Stored record content does not have the call-record shape.
    #[error("Malformed call record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    /// Call index cannot be represented.
    #[error("Call index overflow for fixture {name}")]
    IndexOverflow { name: String },

    /// No stored record and the active mode forbids creating one.
    #[error("Missing call record {key} (update mode does not allow creating records)\n{diff}")]
    MissingRecord { key: String, diff: String },

    /// Stored record arguments differ from the current call.
    ///
    /// `first` locates the first differing argument, e.g. `$[0]: 6 vs 10`.
    #[error("Call record {key} does not match the current call (first difference at {first})\n{diff}")]
    ArgumentMismatch {
        key: String,
        first: String,
        diff: String,
    },

    /// Stored records were left over after the run's last call.
    #[error("{report}")]
    Unfulfilled {
        name: String,
        unconsumed: Vec<String>,
        report: String,
    },

    /// A second overwrite was attempted while only one update per run is allowed.
    #[error(
        "Refusing to update call record {key}: another record was already updated in this run. Review that change and re-run to update the next one"
    )]
    UpdateLimit { key: String },

    /// Record store failures.
    #[error("Record store error: {0}")]
    Store(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create a misuse error.
    pub fn misuse(message: impl Into<String>) -> Self {
        Self::Misuse(message.into())
    }

    /// Create a record store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a malformed record error.
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// True for mismatches the host runner should render as a failed comparison.
    pub const fn is_expectation_mismatch(&self) -> bool {
        matches!(
            self,
            Self::MissingRecord { .. } | Self::ArgumentMismatch { .. } | Self::Unfulfilled { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}

/// Outcome error of a fixture call.
///
/// `Call` is the real function's error, either freshly produced or replayed
/// from a stored record. `Fixture` is an engine failure (mismatch, misuse,
/// guard violation, store I/O).
#[derive(Error, Debug)]
pub enum FixtureError<E> {
    #[error("{0}")]
    Call(E),

    #[error(transparent)]
    Fixture(#[from] Error),
}

impl<E> FixtureError<E> {
    /// Returns the real function's error, if that is what this is.
    pub fn into_call(self) -> Option<E> {
        match self {
            Self::Call(err) => Some(err),
            Self::Fixture(_) => None,
        }
    }

    pub const fn as_fixture(&self) -> Option<&Error> {
        match self {
            Self::Call(_) => None,
            Self::Fixture(err) => Some(err),
        }
    }
}
