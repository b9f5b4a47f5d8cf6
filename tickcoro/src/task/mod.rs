//! Coroutine frames and the handle used to observe them.

use crate::context;
use crate::latent::LatentPromise;
use crate::task::async_promise::AsyncPromise;
use crate::task::completion::CompletionState;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

pub(crate) mod async_promise;

pub(crate) mod completion;

pub mod id;
pub use self::id::Id;

pub(crate) mod promise;

pub(crate) mod state;


/// Why a frame-tracked coroutine finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExitReason {
    /// The body ran to completion, or stopped after an unhandled panic.
    #[default]
    Normal,

    /// The coroutine was canceled, or refused before its first poll.
    Canceled,

    /// The host aborted the latent action driving the coroutine.
    ActionAborted,

    /// The object owning the latent action was destroyed.
    ObjectDestroyed,
}

/// Spawns a free-threaded coroutine.
///
/// The body starts running immediately on the calling thread and runs until
/// its first suspension point before `spawn` returns. After that it resumes
/// on whichever thread wakes it.
///
/// ```ignore
/// let coro = tickcoro::spawn(async {
///     tickcoro::move_to_worker().await;
///     expensive_work();
/// });
/// coro.wait();
/// ```
pub fn spawn<F>(future: F) -> Coroutine
where
    F: Future<Output = ()> + Send + 'static,
{
    let promise = AsyncPromise::new(Box::pin(future));
    let coroutine = Coroutine::from_async(&promise);
    promise.resume();
    coroutine
}

/// Strong reference to a frame, used as the resumption target of awaiters
/// and as the entry of the per-thread resume stack.
#[derive(Clone)]
pub(crate) enum FrameHandle {
    Async(Arc<AsyncPromise>),
    Latent(Arc<LatentPromise>),
}

impl FrameHandle {
    pub(crate) fn completion(&self) -> &Arc<CompletionState> {
        match self {
            FrameHandle::Async(p) => p.promise().completion(),
            FrameHandle::Latent(p) => p.promise().completion(),
        }
    }

    pub(crate) fn resume(&self) {
        match self {
            FrameHandle::Async(p) => p.resume(),
            FrameHandle::Latent(p) => p.resume(false),
        }
    }

    /// Lets a frame-tracked coroutine leave the main thread. No-op for
    /// free-threaded ones.
    pub(crate) fn detach_from_main(&self) {
        if let FrameHandle::Latent(p) = self {
            p.detach_from_main();
        }
    }
}

impl fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FrameHandle")
            .field(&self.completion().id())
            .finish()
    }
}

#[derive(Clone)]
enum WeakFrame {
    Async(Weak<AsyncPromise>),
    Latent(Weak<LatentPromise>),
}

/// Handle to a running or finished coroutine.
///
/// Handles are cheap to clone and never keep the coroutine running: dropping
/// every handle does not cancel anything. A handle can be awaited from another
/// coroutine, blocked on, or used to register completion callbacks.
#[derive(Clone)]
pub struct Coroutine {
    completion: Arc<CompletionState>,
    frame: WeakFrame,
}

impl Coroutine {
    pub(crate) fn from_async(promise: &Arc<AsyncPromise>) -> Self {
        Coroutine {
            completion: Arc::clone(promise.promise().completion()),
            frame: WeakFrame::Async(Arc::downgrade(promise)),
        }
    }

    pub(crate) fn from_latent(promise: &Arc<LatentPromise>) -> Self {
        Coroutine {
            completion: Arc::clone(promise.promise().completion()),
            frame: WeakFrame::Latent(Arc::downgrade(promise)),
        }
    }

    pub(crate) fn completion(&self) -> &Arc<CompletionState> {
        &self.completion
    }

    pub fn id(&self) -> Id {
        self.completion.id()
    }

    pub fn debug_name(&self) -> Option<String> {
        self.completion.debug_name()
    }

    pub fn is_done(&self) -> bool {
        self.completion.is_complete()
    }

    /// Exit reason of a finished frame-tracked coroutine. `None` while it is
    /// still running, and always `None` for free-threaded coroutines.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.completion.exit_reason()
    }

    /// Registers `f` to run once the coroutine completes, on the completing
    /// thread. Runs `f` inline if it already has.
    pub fn on_completion<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.completion.register_continuation(Box::new(f));
    }

    /// Blocks the calling thread until the coroutine completes.
    ///
    /// Blocking the main thread on a coroutine that needs the main thread to
    /// make progress deadlocks.
    pub fn wait(&self) {
        self.completion.wait(None);
    }

    /// Blocks the calling thread until the coroutine completes or `timeout`
    /// elapses. Returns whether it completed.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.completion.wait(Some(timeout))
    }

    /// Requests cancellation of a frame-tracked coroutine. Must be called on
    /// the main thread.
    ///
    /// An attached coroutine is destroyed on the next tick. A coroutine that
    /// is currently detached keeps running until it comes back to the main
    /// thread. Free-threaded coroutines ignore cancellation.
    pub fn cancel(&self) {
        if let WeakFrame::Latent(frame) = &self.frame {
            if let Some(promise) = frame.upgrade() {
                promise.cancel();
            }
        }
    }

    /// Sets the debug name of the coroutine currently running on this thread.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a coroutine.
    #[track_caller]
    pub fn set_debug_name(name: impl Into<String>) {
        let Some(frame) = context::current_frame() else {
            panic!("Coroutine::set_debug_name called outside of a coroutine");
        };
        frame.completion().set_debug_name(name.into());
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.completion.id())
            .field("kind", &self.completion.kind())
            .field("name", &self.completion.debug_name())
            .field("done", &self.completion.is_complete())
            .finish()
    }
}
