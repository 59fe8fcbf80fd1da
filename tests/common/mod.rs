//! Shared helpers for `callfix` integration tests.

#![allow(dead_code)]

use callfix::{Fixture, FixtureBuilder, PlainError, RecordStore, SerdeCodec, SharedMode};
use std::future::{Future, Ready, ready};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Runs an async future to completion on the current thread.
pub fn run_async<T>(future: impl Future<Output = T>) -> T {
    futures::executor::block_on(future)
}

/// Counts how often the real function behind a fixture ran.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub type DivResult = Ready<Result<i64, PlainError>>;
pub type DivFn = Box<dyn Fn((i64, i64)) -> DivResult + Send + Sync>;
pub type DivFixture = Fixture<(i64, i64), i64, PlainError, DivFn, SerdeCodec>;

/// Integer division that fails on a zero divisor, counting real calls.
pub fn counting_div(counter: &CallCounter) -> DivFn {
    let counter = counter.clone();
    Box::new(move |(a, b)| {
        counter.bump();
        if b == 0 {
            ready(Err(PlainError::new("division by zero")))
        } else {
            ready(Ok(a / b))
        }
    })
}

/// A `div` fixture builder over `store`, driven by `mode`.
pub fn div_builder(
    store: Arc<dyn RecordStore>,
    mode: &SharedMode,
    counter: &CallCounter,
) -> FixtureBuilder<(i64, i64), i64, PlainError, DivFn, SerdeCodec> {
    Fixture::builder("div", counting_div(counter))
        .store(store)
        .mode(mode.clone())
        .allow_only_one_update_per_test(false)
}
