//! Record-and-replay fixtures.
//!
//! A [`Fixture`] wraps a real async function. Every call gets the next
//! 1-based index, looks up the stored record at that index and either replays
//! it, records a fresh one, re-records a drifted one, or fails:
//!
//! | record | args match | mode | action |
//! |---|---|---|---|
//! | absent | - | `None` | fail, real function not called |
//! | absent | - | `Create`, `CreateAndUpdate` | call, store, return |
//! | present | yes | any | replay stored outcome |
//! | present | no | `CreateAndUpdate` | call, overwrite (subject to the update guard), return |
//! | present | no | `None`, `Create` | fail with a diff |

use crate::codec::{Codec, SerdeCodec};
use crate::config::RunConfig;
use crate::diff::render_record_diff;
use crate::error::{Error, FixtureError, Result};
use crate::fulfillment::{Fulfillment, check_fulfillment};
use crate::guard::{UpdateClaim, UpdateGuard};
use crate::json_eq::first_difference;
use crate::mode::{EnvModeProvider, ModeProvider, UpdateMode};
use crate::record::{CallRecord, RecordedOutcome, render_attempt};
use crate::store::{FsRecordStore, RecordKey, RecordStore, WriteOutcome};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// What to do with one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No record and the mode forbids creating one.
    FailMissing,
    /// No record; call the real function and store the outcome.
    Record,
    /// Record matches; return the stored outcome.
    Replay,
    /// Record drifted; call the real function and overwrite.
    Update,
    /// Record drifted and the mode forbids overwriting.
    FailMismatch,
}

/// The decision table, with no I/O.
pub fn decide(existing: Option<&CallRecord>, args: &Value, mode: UpdateMode) -> Decision {
    match existing {
        None if mode.allows_create() => Decision::Record,
        None => Decision::FailMissing,
        Some(record) if record.matches_args(args) => Decision::Replay,
        Some(_) if mode.allows_update() => Decision::Update,
        Some(_) => Decision::FailMismatch,
    }
}

/// A change a fixture made to its stored records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    Created { key: RecordKey },
    Updated { key: RecordKey, diff: String },
}

impl RecordChange {
    pub const fn key(&self) -> &RecordKey {
        match self {
            Self::Created { key } | Self::Updated { key, .. } => key,
        }
    }
}

/// A real function wrapped with record-and-replay.
pub struct Fixture<A, T, E, F, C = SerdeCodec> {
    name: String,
    real: F,
    codec: C,
    store: Arc<dyn RecordStore>,
    mode: Arc<dyn ModeProvider>,
    guard: Arc<UpdateGuard>,
    calls: AtomicU32,
    changes: Mutex<Vec<RecordChange>>,
    _marker: PhantomData<fn(A) -> (T, E)>,
}

impl<A, T, E, F> Fixture<A, T, E, F, SerdeCodec> {
    /// Starts building a fixture named `name` around `real`.
    ///
    /// Defaults come from [`RunConfig::from_env`]: the records folder, the
    /// env-backed mode provider and the one-update-per-run policy.
    pub fn builder<Fut>(name: impl Into<String>, real: F) -> FixtureBuilder<A, T, E, F, SerdeCodec>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        FixtureBuilder {
            name: name.into(),
            real,
            codec: SerdeCodec::new(),
            store: None,
            records_folder: None,
            mode: None,
            guard: None,
            one_update_per_run: None,
            _marker: PhantomData,
        }
    }
}

impl<A, T, E, F, C> Fixture<A, T, E, F, C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls started so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn update_guard(&self) -> &Arc<UpdateGuard> {
        &self.guard
    }

    /// Records created or overwritten by this fixture, in order.
    pub fn changes(&self) -> Vec<RecordChange> {
        match self.changes.lock() {
            Ok(changes) => changes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether every stored record was consumed by the calls made so far.
    pub async fn is_fulfilled(&self) -> Result<Fulfillment> {
        check_fulfillment(self.store.as_ref(), &self.name, self.call_count()).await
    }

    /// Like [`Fixture::is_fulfilled`], failing when records were left over.
    pub async fn assert_fulfilled(&self) -> Result<()> {
        self.is_fulfilled().await?.into_result()
    }

    fn next_key(&self) -> Result<RecordKey> {
        let previous = self
            .calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_add(1)
            })
            .map_err(|_| Error::IndexOverflow {
                name: self.name.clone(),
            })?;
        RecordKey::new(&self.name, previous + 1)
    }

    fn push_change(&self, change: RecordChange) {
        match self.changes.lock() {
            Ok(mut changes) => changes.push(change),
            Err(poisoned) => poisoned.into_inner().push(change),
        }
    }
}

impl<A, T, E, F, C> Fixture<A, T, E, F, C>
where
    C: Codec<A, T, E>,
{
    /// Invokes the fixture.
    ///
    /// The call index is claimed here, synchronously, before the returned
    /// future is first polled. The Nth `call` maps to the Nth record no matter
    /// in which order the futures are driven.
    pub fn call<Fut>(
        &self,
        args: A,
    ) -> impl Future<Output = std::result::Result<T, FixtureError<E>>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = self.next_key();
        self.run_call(key, args)
    }

    async fn run_call<Fut>(
        &self,
        key: Result<RecordKey>,
        args: A,
    ) -> std::result::Result<T, FixtureError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = key?;
        let args_value = self.codec.serialize_args(&args)?;
        let existing = self.store.load(&key).await?;
        let mode = self.mode.current_mode()?;
        let decision = decide(existing.as_ref(), &args_value, mode);

        match (decision, existing) {
            (Decision::Replay, Some(record)) => {
                info!(fixture = %self.name, record = %key, "Replaying call record");
                self.replay(record.result)
            }
            (Decision::Record, _) => {
                info!(fixture = %self.name, record = %key, %mode, "Recording new call");
                self.invoke_and_store(&key, args, args_value, None).await
            }
            (Decision::Update, Some(_)) => {
                let claim = self.guard.claim(&key)?;
                info!(fixture = %self.name, record = %key, %mode, "Re-recording drifted call");
                self.invoke_and_store(&key, args, args_value, Some(claim))
                    .await
            }
            (Decision::FailMismatch, Some(record)) => {
                let first = first_difference(&record.args, &args_value)
                    .map_or_else(|| "$".to_string(), |difference| difference.to_string());
                let stored = record.to_canonical_string()?;
                let attempted = CallRecord {
                    args: args_value,
                    result: record.result,
                }
                .to_canonical_string()?;
                warn!(fixture = %self.name, record = %key, %mode, "Call does not match stored record");
                Err(Error::ArgumentMismatch {
                    first,
                    diff: render_record_diff(&key.file_name(), Some(&stored), &attempted),
                    key: key.file_name(),
                }
                .into())
            }
            (Decision::FailMissing, _) => {
                let attempted = render_attempt(&args_value)?;
                warn!(fixture = %self.name, record = %key, %mode, "No call record and mode forbids recording");
                Err(Error::MissingRecord {
                    diff: render_record_diff(&key.file_name(), None, &attempted),
                    key: key.file_name(),
                }
                .into())
            }
            (decision, None) => Err(Error::store(format!(
                "record {key} vanished while deciding {decision:?}"
            ))
            .into()),
        }
    }

    fn replay(&self, outcome: RecordedOutcome) -> std::result::Result<T, FixtureError<E>> {
        match outcome {
            RecordedOutcome::Success(data) => Ok(self.codec.deserialize_success(data)?),
            RecordedOutcome::Failure(error) => {
                Err(FixtureError::Call(self.codec.deserialize_error(error)?))
            }
        }
    }

    /// Calls the real function and stores its outcome.
    ///
    /// `claim` is committed only if the save overwrote a previous record;
    /// on any other path it is dropped and handed back to the guard.
    async fn invoke_and_store<Fut>(
        &self,
        key: &RecordKey,
        args: A,
        args_value: Value,
        claim: Option<UpdateClaim<'_>>,
    ) -> std::result::Result<T, FixtureError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let outcome = (self.real)(args).await;
        let record = match &outcome {
            Ok(value) => CallRecord::success(args_value, self.codec.serialize_success(value)?),
            Err(error) => CallRecord::failure(args_value, self.codec.serialize_error(error)?),
        };

        match self.store.save(key, &record).await? {
            WriteOutcome::Created => {
                info!(fixture = %self.name, record = %key, success = outcome.is_ok(), "Stored call record");
                self.push_change(RecordChange::Created { key: key.clone() });
            }
            WriteOutcome::Updated { diff } => {
                if let Some(claim) = claim {
                    claim.commit();
                }
                info!(
                    fixture = %self.name,
                    record = %key,
                    success = outcome.is_ok(),
                    "Updated call record\n{diff}"
                );
                self.push_change(RecordChange::Updated {
                    key: key.clone(),
                    diff,
                });
            }
            WriteOutcome::Unchanged => {}
        }

        outcome.map_err(FixtureError::Call)
    }
}

/// Builder for [`Fixture`].
pub struct FixtureBuilder<A, T, E, F, C> {
    name: String,
    real: F,
    codec: C,
    store: Option<Arc<dyn RecordStore>>,
    records_folder: Option<PathBuf>,
    mode: Option<Arc<dyn ModeProvider>>,
    guard: Option<Arc<UpdateGuard>>,
    one_update_per_run: Option<bool>,
    _marker: PhantomData<fn(A) -> (T, E)>,
}

impl<A, T, E, F, C> FixtureBuilder<A, T, E, F, C> {
    /// Replaces the codec.
    pub fn codec<C2>(self, codec: C2) -> FixtureBuilder<A, T, E, F, C2>
    where
        C2: Codec<A, T, E>,
    {
        FixtureBuilder {
            name: self.name,
            real: self.real,
            codec,
            store: self.store,
            records_folder: self.records_folder,
            mode: self.mode,
            guard: self.guard,
            one_update_per_run: self.one_update_per_run,
            _marker: PhantomData,
        }
    }

    /// Store records as files under `folder`.
    #[must_use]
    pub fn records_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.records_folder = Some(folder.into());
        self
    }

    /// Use a custom record store; takes precedence over `records_folder`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: impl ModeProvider + 'static) -> Self {
        self.mode = Some(Arc::new(mode));
        self
    }

    #[must_use]
    pub fn mode_provider(mut self, mode: Arc<dyn ModeProvider>) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Allow at most one record overwrite through this fixture.
    #[must_use]
    pub const fn allow_only_one_update_per_test(mut self, enabled: bool) -> Self {
        self.one_update_per_run = Some(enabled);
        self
    }

    /// Share an update guard with other fixtures of the same test; takes
    /// precedence over `allow_only_one_update_per_test`.
    #[must_use]
    pub fn update_guard(mut self, guard: Arc<UpdateGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn build(self) -> Fixture<A, T, E, F, C> {
        let needs_env = (self.store.is_none() && self.records_folder.is_none())
            || (self.guard.is_none() && self.one_update_per_run.is_none());
        let config = if needs_env {
            RunConfig::from_env()
        } else {
            RunConfig::default()
        };

        let store = self.store.unwrap_or_else(|| {
            let folder = self
                .records_folder
                .unwrap_or_else(|| config.records_dir());
            Arc::new(FsRecordStore::new(folder))
        });
        let mode = self
            .mode
            .unwrap_or_else(|| Arc::new(EnvModeProvider) as Arc<dyn ModeProvider>);
        let guard = self.guard.unwrap_or_else(|| {
            Arc::new(UpdateGuard::new(
                self.one_update_per_run
                    .unwrap_or_else(|| config.one_update_per_run()),
            ))
        });

        Fixture {
            name: self.name,
            real: self.real,
            codec: self.codec,
            store,
            mode,
            guard,
            calls: AtomicU32::new(0),
            changes: Mutex::new(Vec::new()),
            _marker: PhantomData,
        }
    }
}
