use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Cooperative cancellation shared by the executor, the poll loop and the
/// query adapter.
///
/// Children are cancelled with their parent but can also be cancelled on
/// their own, which is how a blocking phase stops its siblings without
/// touching the rest of the graph.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel with a reason. Only the first reason is kept.
    pub fn trigger(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Reason given to this signal, or "cancelled" when the cancellation
    /// came from a parent.
    pub fn reason(&self) -> Option<String> {
        if !self.is_triggered() {
            return None;
        }
        Some(
            self.reason
                .lock()
                .clone()
                .unwrap_or_else(|| "cancelled".to_string()),
        )
    }

    pub fn child(&self) -> CancelSignal {
        CancelSignal {
            token: self.token.child_token(),
            reason: Arc::new(Mutex::new(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let signal = CancelSignal::new();
        assert!(signal.reason().is_none());
        signal.trigger("deadline");
        signal.trigger("caller");
        assert!(signal.is_triggered());
        assert_eq!(signal.reason().as_deref(), Some("deadline"));
    }

    #[test]
    fn test_child_follows_parent_only() {
        let parent = CancelSignal::new();
        let child = parent.child();
        child.trigger("sibling failed");
        assert!(!parent.is_triggered());

        let other = parent.child();
        parent.trigger("caller");
        assert!(other.is_triggered());
        assert_eq!(other.reason().as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        signal.trigger("stop");
        handle.await.unwrap();
    }
}
