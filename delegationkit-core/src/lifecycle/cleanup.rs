//! Registry of teardown callbacks owned by one scope.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

type Teardown = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// A teardown that failed during [`CleanupRegistry::cleanup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Registration order of the failing teardown.
    pub index: usize,
    /// Error message, or panic payload when the teardown panicked.
    pub message: String,
}

/// What a [`CleanupRegistry::cleanup`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of teardowns invoked.
    pub ran: usize,
    /// Teardowns that returned an error or panicked.
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Whether every teardown succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
struct Inner {
    closed: bool,
    teardowns: Vec<Teardown>,
}

/// A set of zero-argument teardown callbacks.
///
/// Every registered teardown runs exactly once, independently of the others,
/// no later than when the registry is dropped. Registrations made after
/// cleanup has begun are ignored.
#[derive(Default)]
pub struct CleanupRegistry {
    inner: Mutex<Inner>,
}

impl fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CleanupRegistry")
            .field("closed", &inner.closed)
            .field("pending", &inner.teardowns.len())
            .finish()
    }
}

impl CleanupRegistry {
    /// Creates an empty, open registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `teardown`. Returns `false` (and drops it unrun) once cleanup
    /// has begun.
    pub fn add<F, E>(&self, teardown: F) -> bool
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return false;
        }
        inner
            .teardowns
            .push(Box::new(move || teardown().map_err(|e| e.to_string())));
        true
    }

    /// Whether cleanup has begun.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    /// Number of teardowns waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .teardowns
            .len()
    }

    /// Returns `true` if no teardown is waiting to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the registry and runs every registered teardown.
    ///
    /// Failures (errors and panics) are collected into the report and logged,
    /// never raised. Calling this again is a no-op returning an empty report.
    pub fn cleanup(&self) -> CleanupReport {
        let teardowns = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.closed = true;
            std::mem::take(&mut inner.teardowns)
        };

        let mut report = CleanupReport::default();
        for (index, teardown) in teardowns.into_iter().enumerate() {
            report.ran += 1;
            let message = match catch_unwind(AssertUnwindSafe(teardown)) {
                Ok(Ok(())) => continue,
                Ok(Err(message)) => message,
                Err(payload) => panic_message(payload.as_ref()),
            };
            log::warn!("cleanup teardown #{index} failed: {message}");
            report.failures.push(CleanupFailure { index, message });
        }
        report
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        let report = self.cleanup();
        if report.ran > 0 {
            log::debug!("cleanup registry dropped; ran {} teardowns", report.ran);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "teardown panicked".to_string())
}
