use crate::task::completion::{CompletionState, PromiseKind};
use crate::task::state::{State, TransitionToIdle, TransitionToRunning};
use crate::task::Id;
use crate::utils::{PanicPayload, panic_payload_as_str};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Control block embedded in every coroutine frame.
///
/// Owns the coroutine body and the run-state word, and shares the
/// [`CompletionState`] with observers. Specializations decide when to poll
/// and when to tear down; this type only knows how to do it.
pub(crate) struct Promise {
    state: State,

    /// `None` once the frame has been destroyed.
    body: Mutex<Option<BoxFuture>>,

    completion: Arc<CompletionState>,
}

impl Promise {
    pub(crate) fn new(kind: PromiseKind, body: BoxFuture) -> Self {
        Promise {
            state: State::new(),
            body: Mutex::new(Some(body)),
            completion: CompletionState::new(kind),
        }
    }

    pub(crate) fn id(&self) -> Id {
        self.completion.id()
    }

    pub(crate) fn completion(&self) -> &Arc<CompletionState> {
        &self.completion
    }

    pub(crate) fn try_start_running(&self) -> bool {
        matches!(
            self.state.transition_to_running(),
            TransitionToRunning::Success
        )
    }

    /// Gives up the `RUNNING` bit. Returns false when a resume arrived in the
    /// meantime and the caller has to poll again.
    pub(crate) fn try_stop_running(&self) -> bool {
        !matches!(
            self.state.transition_to_idle(),
            TransitionToIdle::OkNotified
        )
    }

    pub(crate) fn mark_complete(&self) -> bool {
        self.state.transition_to_complete()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Polls the body once. The caller must own the `RUNNING` bit.
    ///
    /// Panics raised by the body are caught here and returned so the frame
    /// can fold them into its completion.
    pub(crate) fn poll_body(&self, waker: &Waker) -> Poll<Result<(), PanicPayload>> {
        let mut body = self.body.lock();
        let Some(fut) = body.as_mut() else {
            return Poll::Ready(Ok(()));
        };

        let mut cx = Context::from_waker(waker);
        match panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(())) => Poll::Ready(Ok(())),
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }

    /// Drops the body and everything it holds across suspension points.
    pub(crate) fn drop_body(&self) {
        let body = self.body.lock().take();

        let Some(body) = body else {
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || drop(body))) {
            tracing::error!(
                id = %self.id(),
                "panic while destroying coroutine: {}",
                panic_payload_as_str(&payload)
            );
        }
    }

    pub(crate) fn report_panic(&self, payload: &PanicPayload) {
        tracing::error!(
            id = %self.id(),
            kind = self.completion.kind().as_str(),
            name = self.completion.debug_name().as_deref().unwrap_or(""),
            "unhandled panic in coroutine: {}",
            panic_payload_as_str(payload)
        );
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state)
            .field("completion", &self.completion)
            .finish()
    }
}
