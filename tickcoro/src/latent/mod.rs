//! Frame-tracked ("latent") coroutines.
//!
//! A latent coroutine belongs to the main thread. It is registered as a
//! latent action of a [`Target`](crate::runtime::Target) and driven by the
//! world's tick loop. It can be aborted or have its owner destroyed, and
//! reports why it ended through its [`ExitReason`].
//!
//! It may leave the main thread with [`move_to_worker`](crate::move_to_worker)
//! and friends. While away it is *detached*: cancellation is held until the
//! next time it runs on the main thread.

use crate::context;
use crate::runtime::Handle;
use crate::task::{Coroutine, ExitReason};
use std::future::Future;

mod awaiter;
pub(crate) use awaiter::LatentCondition;
pub use awaiter::{LatentAwaiter, delay, next_tick, seconds, ticks, until};

mod pending;

mod promise;
pub(crate) use promise::LatentPromise;


/// Starts a frame-tracked coroutine owned by the current world.
///
/// # Panics
///
/// Panics when not called on the main thread of a world.
#[track_caller]
pub fn spawn<F>(future: F) -> Coroutine
where
    F: Future<Output = ()> + Send + 'static,
{
    Handle::current().spawn_latent(future)
}

/// Why the frame-tracked coroutine being destroyed on this thread is going
/// away.
///
/// Only meaningful while the coroutine's body is being dropped, e.g. from the
/// `Drop` impl of a value it held. Returns `None` anywhere else.
pub fn exit_reason() -> Option<ExitReason> {
    context::exit_reason()
}
