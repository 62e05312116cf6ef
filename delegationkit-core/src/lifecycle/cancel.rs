//! Cooperative cancellation of one asynchronous unit of work.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::DelegationKitError;

const RUNNING: u8 = 0;
const COMPLETED: u8 = 1;
const FAILED: u8 = 2;
const CANCELLED: u8 = 3;

/// Lifecycle state of a [`PendingOperation`].
///
/// `Running` moves to exactly one terminal state; the first transition wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// The wrapped work has not settled and was not cancelled.
    Running,
    /// The wrapped work succeeded and its value was delivered.
    Completed,
    /// The wrapped work failed and its error was delivered.
    Failed,
    /// The operation was cancelled; nothing from the wrapped work is delivered.
    Cancelled,
}

impl OperationState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            RUNNING => Self::Running,
            COMPLETED => Self::Completed,
            FAILED => Self::Failed,
            _ => Self::Cancelled,
        }
    }
}

/// Outcome of a [`PendingOperation`] as seen by its caller.
#[derive(Debug)]
pub enum Settlement<T, E> {
    /// The wrapped work succeeded before any cancellation.
    Completed(T),
    /// The wrapped work failed before any cancellation.
    Failed(E),
    /// The operation was cancelled.
    Cancelled,
}

impl<T, E> Settlement<T, E> {
    /// Whether the operation was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Converts into a `Result`, mapping cancellation to
    /// [`DelegationKitError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns the wrapped error, or `Cancelled`.
    pub fn into_result(self) -> Result<T, DelegationKitError>
    where
        E: Into<DelegationKitError>,
    {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(error) => Err(error.into()),
            Self::Cancelled => Err(DelegationKitError::Cancelled),
        }
    }
}

#[derive(Debug, Default)]
struct SignalInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation signal handed to the wrapped work so it can abort its own
/// sub-operations.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<SignalInner>,
}

impl CancelSignal {
    /// A signal that is never fired by anything but its own clones.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`DelegationKitError::Cancelled`] once cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the signal has fired.
    pub fn check(&self) -> Result<(), DelegationKitError> {
        if self.is_cancelled() {
            Err(DelegationKitError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Drives `future` unless the signal fires first, in which case `future`
    /// is dropped and `Cancelled` is returned.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the signal fired before `future` resolved.
    pub async fn guard<F: Future>(&self, future: F) -> Result<F::Output, DelegationKitError> {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancelled() => Err(DelegationKitError::Cancelled),
            output = future => Ok(output),
        }
    }

    fn fire(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }
}

/// Cloneable handle that cancels a [`PendingOperation`] from elsewhere, for
/// example when the user navigates away.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: Uuid,
    state: Arc<AtomicU8>,
    signal: CancelSignal,
}

impl CancelHandle {
    /// Requests cancellation.
    ///
    /// Returns `true` if this call moved the operation to `Cancelled`, `false`
    /// if it had already settled or been cancelled.
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(RUNNING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            log::debug!("operation {} cancelled", self.id);
            self.signal.fire();
        }
        won
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> OperationState {
        OperationState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Identifier of the operation, for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

/// A cancellation token bound to one asynchronous unit of work.
///
/// Once [`cancel`](CancelHandle::cancel) wins, the cancellation flag is set
/// permanently, the [`CancelSignal`] fires, and any later settlement of the
/// wrapped work is reported to the caller as [`Settlement::Cancelled`].
#[derive(Debug)]
pub struct PendingOperation {
    handle: CancelHandle,
}

impl Default for PendingOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingOperation {
    /// Creates an operation in the `Running` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: CancelHandle {
                id: Uuid::new_v4(),
                state: Arc::new(AtomicU8::new(RUNNING)),
                signal: CancelSignal::new(),
            },
        }
    }

    /// A handle that can cancel this operation.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Requests cancellation. See [`CancelHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> OperationState {
        self.handle.state()
    }

    /// Identifier of the operation, for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.handle.id
    }

    /// Runs `work`, handing it this operation's [`CancelSignal`].
    ///
    /// The caller observes the work's own result only if it settles before any
    /// cancellation. On cancellation the work future is dropped as soon as the
    /// signal fires, without waiting for it to settle.
    pub async fn run<T, E, F, Fut>(self, work: F) -> Settlement<T, E>
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let signal = self.handle.signal.clone();
        if signal.is_cancelled() {
            return Settlement::Cancelled;
        }

        let work = work(signal.clone());
        let result = tokio::select! {
            biased;
            () = signal.cancelled() => return Settlement::Cancelled,
            result = work => result,
        };

        let terminal = if result.is_ok() { COMPLETED } else { FAILED };
        if self
            .handle
            .state
            .compare_exchange(RUNNING, terminal, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("operation {} settled after cancellation; discarding result", self.id());
            return Settlement::Cancelled;
        }

        match result {
            Ok(value) => Settlement::Completed(value),
            Err(error) => Settlement::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_completed_work_is_delivered() {
        let op = PendingOperation::new();
        let handle = op.cancel_handle();

        let outcome: Settlement<u32, String> = op.run(|_| async { Ok(7) }).await;

        assert!(matches!(outcome, Settlement::Completed(7)));
        assert_eq!(handle.state(), OperationState::Completed);
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn test_failed_work_is_delivered() {
        let op = PendingOperation::new();
        let handle = op.cancel_handle();

        let outcome: Settlement<u32, String> = op.run(|_| async { Err("boom".to_string()) }).await;

        assert!(matches!(outcome, Settlement::Failed(ref e) if e == "boom"));
        assert_eq!(handle.state(), OperationState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_before_settlement_hides_result() {
        let op = PendingOperation::new();
        let handle = op.cancel_handle();
        let (tx, rx) = oneshot::channel::<u32>();

        let task = tokio::spawn(op.run(move |_| async move {
            rx.await.map_err(|e| e.to_string())
        }));

        tokio::task::yield_now().await;
        assert!(handle.cancel());
        let _ = tx.send(42);

        let outcome = task.await.unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(handle.state(), OperationState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_is_one_way_and_first_writer_wins() {
        let op = PendingOperation::new();
        assert!(op.cancel());
        assert!(!op.cancel());
        assert_eq!(op.state(), OperationState::Cancelled);

        let outcome: Settlement<u32, String> = op.run(|_| async { Ok(1) }).await;
        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn test_signal_reaches_cooperating_sub_operation() {
        let op = PendingOperation::new();
        let handle = op.cancel_handle();
        let (seen_tx, seen_rx) = oneshot::channel();

        let task = tokio::spawn(op.run(move |signal| async move {
            let sub = signal.clone();
            tokio::spawn(async move {
                sub.cancelled().await;
                let _ = seen_tx.send(());
            });
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, String>(())
        }));

        tokio::task::yield_now().await;
        handle.cancel();

        assert!(task.await.unwrap().is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), seen_rx)
            .await
            .expect("sub-operation observed cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_guard_aborts_pending_future() {
        let signal = CancelSignal::new();
        let trigger = CancelHandle {
            id: Uuid::new_v4(),
            state: Arc::new(AtomicU8::new(RUNNING)),
            signal: signal.clone(),
        };

        let pending = tokio::spawn({
            let signal = signal.clone();
            async move { signal.guard(std::future::pending::<()>()).await }
        });
        tokio::task::yield_now().await;
        trigger.cancel();

        assert!(matches!(
            pending.await.unwrap(),
            Err(DelegationKitError::Cancelled)
        ));
        assert!(signal.check().is_err());
    }

    #[test]
    fn test_settlement_into_result() {
        let cancelled: Settlement<(), DelegationKitError> = Settlement::Cancelled;
        assert!(matches!(cancelled.into_result(), Err(DelegationKitError::Cancelled)));
        let done: Settlement<u8, DelegationKitError> = Settlement::Completed(3);
        assert_eq!(done.into_result().unwrap(), 3);
    }
}
