//! Single-assignment completion handle.
//!
//! # Responsibilities
//! - Deliver exactly one terminal outcome (response, failure, cancellation)
//! - Make a second settlement loud instead of silently dropping it
//! - Let in-flight stages check cancellation before doing more work
//!
//! # Design Decisions
//! - Backed by a tokio oneshot channel; the sender sits behind a mutex so
//!   whichever producer takes it first wins
//! - An atomic state flag mirrors the outcome for lock-free reads
//! - The receiver does not keep the producer side alive: when every
//!   `Completion` clone is dropped unsettled, the awaiter sees `Cancelled`

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::envelope::error::{EnvelopeError, EnvelopeResult};
use crate::observability::metrics;

/// Terminal outcome delivered through a completion handle.
pub type Outcome<T> = Result<T, EnvelopeError>;

/// Settlement state of a completion handle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending = 0,
    Completed = 1,
    Failed = 2,
    Cancelled = 3,
}

impl From<u8> for CompletionState {
    fn from(val: u8) -> Self {
        match val {
            1 => CompletionState::Completed,
            2 => CompletionState::Failed,
            3 => CompletionState::Cancelled,
            _ => CompletionState::Pending,
        }
    }
}

impl CompletionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionState::Pending => "pending",
            CompletionState::Completed => "completed",
            CompletionState::Failed => "failed",
            CompletionState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CompletionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Shared<T> {
    state: AtomicU8,
    sender: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
}

/// Producer side of a completion handle. Cheap to clone; all clones settle
/// the same underlying handle.
pub struct Completion<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("state", &self.state())
            .finish()
    }
}

/// Consumer side of a completion handle. There is exactly one per handle.
#[derive(Debug)]
pub struct CompletionReceiver<T> {
    rx: Option<oneshot::Receiver<Outcome<T>>>,
}

/// Create a linked producer/consumer pair.
pub fn channel<T>() -> (Completion<T>, CompletionReceiver<T>) {
    let (tx, rx) = oneshot::channel();
    let completion = Completion {
        shared: Arc::new(Shared {
            state: AtomicU8::new(CompletionState::Pending as u8),
            sender: Mutex::new(Some(tx)),
        }),
    };
    (completion, CompletionReceiver { rx: Some(rx) })
}

impl<T> Completion<T> {
    /// Settle with a successful response.
    pub fn complete(&self, response: T) -> EnvelopeResult<()> {
        self.settle(Ok(response), CompletionState::Completed)
    }

    /// Settle with a terminal error.
    pub fn fail(&self, error: EnvelopeError) -> EnvelopeResult<()> {
        let state = if error == EnvelopeError::Cancelled {
            CompletionState::Cancelled
        } else {
            CompletionState::Failed
        };
        self.settle(Err(error), state)
    }

    /// Settle with a cancellation outcome.
    pub fn cancel(&self) -> EnvelopeResult<()> {
        self.settle(Err(EnvelopeError::Cancelled), CompletionState::Cancelled)
    }

    pub fn state(&self) -> CompletionState {
        CompletionState::from(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_settled(&self) -> bool {
        self.state() != CompletionState::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == CompletionState::Cancelled
    }

    /// Whether the consumer has gone away. Settling is still allowed.
    pub fn is_abandoned(&self) -> bool {
        let sender = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sender.as_ref().map(|tx| tx.is_closed()).unwrap_or(false)
    }

    /// True once nobody can use another attempt: the handle is settled
    /// (including cancelled) or the consumer has gone away.
    pub fn should_stop(&self) -> bool {
        self.is_settled() || self.is_abandoned()
    }

    fn settle(&self, outcome: Outcome<T>, state: CompletionState) -> EnvelopeResult<()> {
        let sender = {
            let mut slot = self
                .shared
                .sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let sender = slot.take();
            if sender.is_some() {
                self.shared.state.store(state as u8, Ordering::Release);
            }
            sender
        };

        let Some(sender) = sender else {
            tracing::error!(
                current = %self.state(),
                attempted = %state,
                "Completion settled twice"
            );
            metrics::record_contract_violation();
            return Err(EnvelopeError::AlreadySettled);
        };

        metrics::record_settled(state.as_str());
        if sender.send(outcome).is_err() {
            tracing::debug!(outcome = %state, "Completion settled with no awaiter");
        }
        Ok(())
    }
}

impl<T> CompletionReceiver<T> {
    /// Wait until the handle is settled.
    ///
    /// If every producer is dropped without settling, the outcome is
    /// `Cancelled`.
    pub async fn wait(mut self) -> Outcome<T> {
        match self.rx.take() {
            Some(rx) => rx.await.unwrap_or(Err(EnvelopeError::Cancelled)),
            None => Err(EnvelopeError::AlreadySettled),
        }
    }

    /// Wait for at most `timeout`.
    ///
    /// On timeout the handle stays pending and this receiver can wait
    /// again; a later settlement is delivered normally. Once an outcome has
    /// been returned, further calls yield `AlreadySettled`.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Outcome<T> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(EnvelopeError::AlreadySettled);
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(received) => {
                self.rx = None;
                received.unwrap_or(Err(EnvelopeError::Cancelled))
            }
            Err(_) => Err(EnvelopeError::WaitTimedOut(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_delivers_response() {
        let (completion, receiver) = channel::<&'static str>();
        completion.complete("ok").unwrap();
        assert_eq!(completion.state(), CompletionState::Completed);
        assert_eq!(receiver.wait().await, Ok("ok"));
    }

    #[tokio::test]
    async fn test_second_settlement_is_rejected() {
        let (completion, receiver) = channel::<u32>();
        completion.complete(1).unwrap();

        assert_eq!(completion.complete(2), Err(EnvelopeError::AlreadySettled));
        assert_eq!(
            completion.fail(EnvelopeError::Upstream("boom".into())),
            Err(EnvelopeError::AlreadySettled)
        );
        assert_eq!(completion.cancel(), Err(EnvelopeError::AlreadySettled));
        assert_eq!(completion.state(), CompletionState::Completed);
        assert_eq!(receiver.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn test_fail_then_complete_is_rejected() {
        let (completion, receiver) = channel::<u32>();
        completion.fail(EnvelopeError::RetriesExhausted { attempts: 3 }).unwrap();
        assert_eq!(completion.complete(7), Err(EnvelopeError::AlreadySettled));
        assert_eq!(
            receiver.wait().await,
            Err(EnvelopeError::RetriesExhausted { attempts: 3 })
        );
    }

    #[tokio::test]
    async fn test_concurrent_completions_settle_once() {
        let (completion, receiver) = channel::<&'static str>();

        let c1 = completion.clone();
        let c2 = completion.clone();
        let t1 = tokio::spawn(async move { ("r1", c1.complete("r1")) });
        let t2 = tokio::spawn(async move { ("r2", c2.complete("r2")) });
        let results = [t1.await.unwrap(), t2.await.unwrap()];

        let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
        assert_eq!(winners.len(), 1);
        let losers: Vec<_> = results
            .iter()
            .filter(|(_, r)| *r == Err(EnvelopeError::AlreadySettled))
            .collect();
        assert_eq!(losers.len(), 1);

        assert_eq!(receiver.wait().await, Ok(winners[0].0));
    }

    #[tokio::test]
    async fn test_cancel_is_observable() {
        let (completion, receiver) = channel::<()>();
        assert!(!completion.is_cancelled());
        completion.cancel().unwrap();
        assert!(completion.is_cancelled());
        assert!(completion.is_settled());
        assert_eq!(receiver.wait().await, Err(EnvelopeError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_producers_read_as_cancelled() {
        let (completion, receiver) = channel::<()>();
        drop(completion);
        assert_eq!(receiver.wait().await, Err(EnvelopeError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_leaves_handle_pending() {
        let (completion, mut receiver) = channel::<u32>();

        let waited = receiver.wait_timeout(Duration::from_secs(1)).await;
        assert_eq!(waited, Err(EnvelopeError::WaitTimedOut(Duration::from_secs(1))));
        assert!(!completion.is_settled());

        // Late settlement is still valid
        completion.complete(42).unwrap();
        assert_eq!(receiver.wait_timeout(Duration::from_secs(1)).await, Ok(42));
        assert_eq!(
            receiver.wait_timeout(Duration::from_secs(1)).await,
            Err(EnvelopeError::AlreadySettled)
        );
    }

    #[tokio::test]
    async fn test_settle_without_awaiter_succeeds() {
        let (completion, receiver) = channel::<u32>();
        drop(receiver);
        assert!(completion.is_abandoned());
        assert!(completion.complete(1).is_ok());
        assert_eq!(completion.complete(2), Err(EnvelopeError::AlreadySettled));
    }

    #[tokio::test]
    async fn test_should_stop_when_consumer_leaves() {
        let (completion, receiver) = channel::<u32>();
        assert!(!completion.should_stop());

        drop(receiver);
        assert_eq!(completion.state(), CompletionState::Pending);
        assert!(!completion.is_cancelled());
        assert!(completion.should_stop());
    }

    #[tokio::test]
    async fn test_should_stop_once_settled() {
        let (completion, _receiver) = channel::<u32>();
        completion.complete(7).unwrap();
        assert!(completion.should_stop());

        let (completion, _receiver) = channel::<u32>();
        completion.cancel().unwrap();
        assert!(completion.should_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_awaiter_does_not_stop_work() {
        let (completion, mut receiver) = channel::<u32>();
        assert!(receiver.wait_timeout(Duration::from_millis(5)).await.is_err());
        assert!(!completion.should_stop());
    }
}
