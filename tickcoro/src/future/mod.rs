//! Awaitables shared by both kinds of coroutines: thread hops, awaiting other
//! coroutines and fan-in over several awaitables.

pub mod aggregate;
pub use aggregate::{AggregateAwaiter, AllAwaiter, AnyAwaiter, when_all, when_any};

mod catch_unwind;
pub(crate) use catch_unwind::CatchUnwind;

pub mod coroutine;
pub use coroutine::CoroutineAwaiter;

pub mod thread;
pub use thread::{MoveToThread, move_to_main, move_to_worker, yield_now};

#[cfg(test)]
mod tests;
