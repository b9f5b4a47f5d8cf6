use crate::task::{ExitReason, Id};
use crate::utils::panic_payload_as_str;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) type Continuation = Box<dyn FnOnce() + Send + 'static>;

// Most coroutines are observed by at most one or two parties.
const INLINE_CONTINUATIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromiseKind {
    Async,
    Latent,
}

impl PromiseKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            PromiseKind::Async => "Async",
            PromiseKind::Latent => "Latent",
        }
    }
}

/// Completion record that outlives the coroutine frame.
///
/// Shared between the frame and every [`Coroutine`](crate::Coroutine) handle.
/// Once the frame signals completion, continuations registered earlier fire
/// exactly once in registration order, and anything registered later runs
/// inline on the registering thread.
pub(crate) struct CompletionState {
    id: Id,
    kind: PromiseKind,
    inner: Mutex<Inner>,
    completed: Condvar,
}

struct Inner {
    alive: bool,
    continuations: SmallVec<[Continuation; INLINE_CONTINUATIONS]>,
    exit_reason: Option<ExitReason>,
    debug_name: Option<String>,
}

impl CompletionState {
    pub(crate) fn new(kind: PromiseKind) -> Arc<Self> {
        Arc::new(CompletionState {
            id: Id::next(),
            kind,
            inner: Mutex::new(Inner {
                alive: true,
                continuations: SmallVec::new(),
                exit_reason: None,
                debug_name: None,
            }),
            completed: Condvar::new(),
        })
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn kind(&self) -> PromiseKind {
        self.kind
    }

    pub(crate) fn is_complete(&self) -> bool {
        !self.inner.lock().alive
    }

    pub(crate) fn exit_reason(&self) -> Option<ExitReason> {
        self.inner.lock().exit_reason
    }

    pub(crate) fn debug_name(&self) -> Option<String> {
        self.inner.lock().debug_name.clone()
    }

    pub(crate) fn set_debug_name(&self, name: String) {
        self.inner.lock().debug_name = Some(name);
    }

    pub(crate) fn register_continuation(&self, f: Continuation) {
        {
            let mut inner = self.inner.lock();
            if inner.alive {
                inner.continuations.push(f);
                return;
            }
        }

        // Already complete: run on the caller's thread, outside the lock.
        f();
    }

    /// Marks the coroutine complete and fires its continuations on the calling
    /// thread. Must be called exactly once per frame.
    pub(crate) fn signal_completion(&self, exit_reason: Option<ExitReason>) {
        let continuations = {
            let mut inner = self.inner.lock();
            assert!(
                inner.alive,
                "Internal error: coroutine {} completed twice",
                self.id
            );
            inner.alive = false;
            inner.exit_reason = exit_reason;
            mem::take(&mut inner.continuations)
        };

        self.completed.notify_all();

        tracing::trace!(
            id = %self.id,
            kind = self.kind.as_str(),
            ?exit_reason,
            continuations = continuations.len(),
            "coroutine completed"
        );

        for continuation in continuations {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(continuation)) {
                tracing::error!(
                    id = %self.id,
                    "completion callback panicked: {}",
                    panic_payload_as_str(&payload)
                );
            }
        }
    }

    /// Blocks the calling thread until completion or until `timeout` elapses.
    /// Returns whether the coroutine completed.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut inner = self.inner.lock();
        match timeout {
            None => {
                while inner.alive {
                    self.completed.wait(&mut inner);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while inner.alive {
                    if self.completed.wait_until(&mut inner, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        !inner.alive
    }
}

impl fmt::Debug for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CompletionState")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &inner.debug_name)
            .field("alive", &inner.alive)
            .field("exit_reason", &inner.exit_reason)
            .finish()
    }
}
