use crate::context;
use crate::task::completion::PromiseKind;
use crate::task::promise::{BoxFuture, Promise};
use crate::task::FrameHandle;
use std::fmt;
use std::sync::Arc;
use std::task::{Poll, Wake, Waker};

/// Promise of a free-threaded coroutine.
///
/// The frame runs wherever it is resumed: the initial poll happens on the
/// spawning thread and every wake polls inline on the waking thread. There is
/// no tick registration and no thread restriction.
pub(crate) struct AsyncPromise {
    promise: Promise,
}

impl AsyncPromise {
    pub(crate) fn new(body: BoxFuture) -> Arc<Self> {
        Arc::new(AsyncPromise {
            promise: Promise::new(PromiseKind::Async, body),
        })
    }

    pub(crate) fn promise(&self) -> &Promise {
        &self.promise
    }

    pub(crate) fn resume(self: &Arc<Self>) {
        if !self.promise.try_start_running() {
            return;
        }

        let span = tracing::trace_span!("coroutine", id = %self.promise.id(), kind = "Async");
        let _enter = span.enter();

        let waker = Waker::from(Arc::clone(self));
        let frame = context::enter_frame(FrameHandle::Async(Arc::clone(self)));

        loop {
            match self.promise.poll_body(&waker) {
                Poll::Pending => {
                    if self.promise.try_stop_running() {
                        break;
                    }
                }
                Poll::Ready(res) => {
                    if let Err(payload) = res {
                        self.promise.report_panic(&payload);
                    }
                    self.complete();
                    break;
                }
            }
        }

        // Runs the post-suspend actions queued by awaiters during the poll.
        drop(frame);
    }

    fn complete(&self) {
        if !self.promise.mark_complete() {
            return;
        }
        self.promise.drop_body();
        self.promise.completion().signal_completion(None);
    }
}

impl Wake for AsyncPromise {
    fn wake(self: Arc<Self>) {
        self.resume();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.resume();
    }
}

impl fmt::Debug for AsyncPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncPromise")
            .field("promise", &self.promise)
            .finish()
    }
}
