//! callfix - record-and-replay fixtures for side-effecting calls
//!
//! Wrap a real (usually async, possibly failing) function in a [`Fixture`].
//! The first run calls the real function and stores each call's arguments and
//! outcome as a JSON record. Later runs check that the arguments still match
//! and replay the stored outcome without calling the real function.
//!
//! ```ignore
//! use callfix::{Fixture, PlainError, UpdateMode};
//!
//! let div = Fixture::builder("div", |(a, b): (i64, i64)| async move {
//!     if b == 0 { Err(PlainError::new("division by zero")) } else { Ok(a / b) }
//! })
//! .records_folder("tests/fixtures/calls")
//! .mode(UpdateMode::Create)
//! .build();
//!
//! assert_eq!(div.call((6, 2)).await?, 3);
//! div.assert_fulfilled().await?;
//! ```
//!
//! Writes are governed by the [`UpdateMode`]: `None` replays only, `Create`
//! records missing calls, `CreateAndUpdate` also re-records calls whose
//! arguments drifted (optionally capped at one overwrite per run).

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod fixture;
pub mod fulfillment;
pub mod guard;
pub mod json_eq;
pub mod mode;
pub mod record;
pub mod store;

pub use codec::{Codec, ErrorCodec, FnCodec, PlainError, PlainErrorCodec, SerdeCodec, SerdeErrorCodec};
pub use config::RunConfig;
pub use error::{Error, FixtureError, Result};
pub use fixture::{Decision, Fixture, FixtureBuilder, RecordChange, decide};
pub use fulfillment::{Fulfillment, check_fulfillment};
pub use guard::{UpdateClaim, UpdateGuard};
pub use json_eq::{first_difference, json_equals};
pub use mode::{EnvModeProvider, ModeProvider, SharedMode, UpdateMode};
pub use record::{CallRecord, RecordedOutcome};
pub use store::{FsRecordStore, MemoryRecordStore, RecordKey, RecordStore, WriteOutcome};
