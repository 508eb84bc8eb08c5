use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::ready;
use pin_project_lite::pin_project;
use tokio::sync::oneshot;

use crate::error::ExchangeResult;

/// Creates a connected completion signal and the future observing it.
pub fn create_completion() -> (CompletionSignal, Completion) {
    let (tx, rx) = oneshot::channel();
    let signal = CompletionSignal {
        resolved: AtomicBool::new(false),
        tx: Mutex::new(Some(tx)),
    };

    (signal, Completion { rx })
}

/// Producer side of a single-resolution completion.
///
/// The first call to [`CompletionSignal::resolve`] delivers its result; every later call is a
/// no-op reporting `false`.
#[derive(Debug)]
pub struct CompletionSignal {
    resolved: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<ExchangeResult<()>>>>,
}

impl CompletionSignal {
    /// Resolves the completion with `result`.
    ///
    /// Returns `true` if this call resolved the completion.
    pub fn resolve(&self, result: ExchangeResult<()>) -> bool {
        if self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Only the winner of the exchange above reaches the sender, so the lock is uncontended.
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = tx {
            // The caller may have dropped its completion future; the operation is still over.
            let _ = tx.send(result);
        }

        true
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

pin_project! {
    /// Future resolving with the outcome of a distribution operation.
    ///
    /// Resolves with an [`crate::error::ErrorKind::InvalidState`] error if the operation was torn
    /// down without ever resolving.
    #[must_use = "futures do nothing unless polled"]
    #[derive(Debug)]
    pub struct Completion {
        #[pin]
        rx: oneshot::Receiver<ExchangeResult<()>>,
    }
}

impl Future for Completion {
    type Output = ExchangeResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(err) => Poll::Ready(Err(err.into())),
        }
    }
}
