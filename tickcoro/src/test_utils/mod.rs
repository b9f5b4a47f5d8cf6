use crate::runtime::World;
use std::time::{Duration, Instant};

// Exports
mod context;
pub(crate) use context::{init_world, init_world_with};

pub(crate) mod future;
pub(crate) use future::*;

pub(crate) mod mocks;
pub(crate) use mocks::{DropProbe, WakeCounter, mock_waker};

/// Upper bound for anything a test waits on.
pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Ticks `world` until `done` returns true. Fails the test on timeout instead
/// of hanging.
pub(crate) fn tick_until(world: &World, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out ticking the world");
        world.tick();
        std::thread::yield_now();
    }
}

/// Whether the latent coroutine running on this thread is detached. False
/// outside of latent coroutines.
pub(crate) fn current_is_detached() -> bool {
    match crate::context::current_frame() {
        Some(crate::task::FrameHandle::Latent(promise)) => promise.is_detached(),
        _ => false,
    }
}
