//! Coroutine engine for a host with a single main thread ticking once per
//! frame and any number of worker threads.
//!
//! Two kinds of coroutines are provided:
//!
//! * free-threaded ones ([`spawn`]), resumed on whatever thread wakes them;
//! * frame-tracked ones ([`latent::spawn`], [`Handle::spawn_latent_with`]),
//!   owned by the main thread, registered as latent actions with the host
//!   and able to be canceled, aborted or orphaned by their owner.
//!
//! Both report completion through a [`Coroutine`] handle, and both can hop
//! between threads ([`move_to_main`], [`move_to_worker`]) and fan in over
//! other awaitables ([`when_any`], [`when_all`]).
//!
//! ```ignore
//! let world = tickcoro::runtime::Builder::new().try_build()?;
//! let coro = world.spawn_latent(async {
//!     tickcoro::move_to_worker().await;
//!     let data = crunch();
//!     tickcoro::move_to_main().await;
//!     tickcoro::latent::next_tick().await;
//!     publish(data);
//! });
//! world.run_until(|| coro.is_done());
//! ```

#[doc(inline)]
pub use tickcoro_macros::main;

#[doc(inline)]
pub use tickcoro_macros::test;

mod context;

pub mod future;
pub use future::{move_to_main, move_to_worker, when_all, when_any, yield_now};

pub mod latent;

pub mod runtime;
pub use runtime::{Builder, Handle, World};

pub mod task;
pub use task::{Coroutine, ExitReason, spawn};

mod utils;

#[cfg(test)]
mod test_utils;
