//! Reference host: a main-thread tick loop, worker dispatch, and the latent
//! action manager frame-tracked coroutines register with.

pub mod action;
pub use action::{LatentAction, LatentInfo, LatentLink, LatentResponse};

pub(crate) mod action_manager;

pub mod builder;
pub use builder::Builder;

pub mod target;
pub use target::{Target, TargetId};

pub mod world;
pub use world::{Handle, World};

#[cfg(test)]
mod tests;

/// Unit of work dispatched to the main thread or to a worker.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;
