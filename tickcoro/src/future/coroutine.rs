use crate::task::Coroutine;
use crate::task::completion::CompletionState;
use parking_lot::Mutex;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Future completing once the observed coroutine has completed.
///
/// Completion is observed through a continuation, so the awaiting coroutine
/// is woken on the completing thread. An attached frame-tracked coroutine
/// resumes on the next tick.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct CoroutineAwaiter {
    completion: Arc<CompletionState>,
    waker: Option<Arc<Mutex<Option<Waker>>>>,
}

impl IntoFuture for Coroutine {
    type Output = ();
    type IntoFuture = CoroutineAwaiter;

    fn into_future(self) -> CoroutineAwaiter {
        CoroutineAwaiter {
            completion: Arc::clone(self.completion()),
            waker: None,
        }
    }
}

impl Future for CoroutineAwaiter {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.completion.is_complete() {
            return Poll::Ready(());
        }

        match &self.waker {
            Some(slot) => {
                let mut slot = slot.lock();
                match slot.as_ref() {
                    Some(curr) if curr.will_wake(cx.waker()) => {}
                    _ => *slot = Some(cx.waker().clone()),
                }
            }
            None => {
                let slot = Arc::new(Mutex::new(Some(cx.waker().clone())));
                self.waker = Some(Arc::clone(&slot));
                self.completion.register_continuation(Box::new(move || {
                    let waker = slot.lock().take();
                    if let Some(waker) = waker {
                        waker.wake();
                    }
                }));
            }
        }

        // The continuation runs inline when completion raced registration.
        if self.completion.is_complete() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for CoroutineAwaiter {
    fn drop(&mut self) {
        if let Some(slot) = &self.waker {
            slot.lock().take();
        }
    }
}

impl fmt::Debug for CoroutineAwaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineAwaiter")
            .field("id", &self.completion.id())
            .field("done", &self.completion.is_complete())
            .finish()
    }
}
