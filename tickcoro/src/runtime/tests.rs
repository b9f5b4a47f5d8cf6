use super::*;
use crate as tickcoro;
use crate::latent;
use crate::task::ExitReason;
use crate::test_utils::*;
use anyhow::Result;
use static_assertions::{assert_impl_all, assert_not_impl_any};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

assert_impl_all!(Handle: Send, Sync, Clone);
assert_impl_all!(Target: Send, Sync, Clone);
assert_not_impl_any!(World: Send, Sync);

#[test]
fn test_second_world_on_same_thread_fails() -> Result<()> {
    let world = init_world()?;
    assert!(init_world().is_err());

    drop(world);
    let again = init_world()?;
    assert!(again.is_main_thread());
    Ok(())
}

#[test]
fn test_world_installs_and_removes_context() -> Result<()> {
    assert!(Handle::try_current().is_none());

    let world = init_world()?;
    let handle = Handle::current();
    assert_eq!(handle.main_thread_id(), thread::current().id());
    assert!(!handle.is_closed());

    drop(world);
    assert!(Handle::try_current().is_none());
    assert!(handle.is_closed());
    Ok(())
}

#[test]
#[should_panic(expected = "no tickcoro World is active on this thread")]
fn test_current_without_world_panics() {
    let _ = Handle::current();
}

#[test]
fn test_tick_count() -> Result<()> {
    let world = init_world()?;
    assert_eq!(world.tick_count(), 0);

    world.tick();
    world.run_ticks(4);
    assert_eq!(world.tick_count(), 5);

    let mut remaining = 3;
    world.run_until(|| {
        remaining -= 1;
        remaining == 0
    });
    assert_eq!(world.tick_count(), 7);
    Ok(())
}

#[test]
fn test_run_on_main_runs_on_next_tick() -> Result<()> {
    let world = init_world()?;
    let ran_on = Arc::new(parking_lot::Mutex::new(None));

    let handle = world.handle().clone();
    let queued = Arc::new(AtomicBool::new(false));
    world.run_on_worker({
        let ran_on = Arc::clone(&ran_on);
        let queued = Arc::clone(&queued);
        move || {
            handle.run_on_main(move || *ran_on.lock() = Some(thread::current().id()));
            queued.store(true, Ordering::Release);
        }
    });

    tick_until(&world, || queued.load(Ordering::Acquire));
    world.tick();
    assert_eq!(*ran_on.lock(), Some(world.main_thread_id()));
    Ok(())
}

#[test]
fn test_jobs_queued_by_jobs_wait_for_next_tick() -> Result<()> {
    let world = init_world()?;
    let count = Arc::new(AtomicUsize::new(0));

    let handle = world.handle().clone();
    world.run_on_main({
        let count = Arc::clone(&count);
        move || {
            count.fetch_add(1, Ordering::Relaxed);
            handle.run_on_main(move || {
                count.fetch_add(1, Ordering::Relaxed);
            });
        }
    });

    world.tick();
    assert_eq!(count.load(Ordering::Relaxed), 1);
    world.tick();
    assert_eq!(count.load(Ordering::Relaxed), 2);
    Ok(())
}

#[test]
fn test_run_on_main_blocking_from_worker() -> Result<()> {
    let world = init_world()?;
    let done = Arc::new(AtomicBool::new(false));
    let value = Arc::new(AtomicUsize::new(0));

    let handle = world.handle().clone();
    world.run_on_worker({
        let done = Arc::clone(&done);
        let value = Arc::clone(&value);
        move || {
            let main = handle.main_thread_id();
            let seen = Arc::clone(&value);
            handle.run_on_main_blocking(move || {
                assert_eq!(thread::current().id(), main);
                seen.store(42, Ordering::Release);
            });

            // Already ran by the time we get here.
            assert_eq!(value.load(Ordering::Acquire), 42);
            done.store(true, Ordering::Release);
        }
    });

    tick_until(&world, || done.load(Ordering::Acquire));
    Ok(())
}

#[test]
fn test_run_on_main_blocking_inline_on_main() -> Result<()> {
    let world = init_world()?;
    let ran = Arc::new(AtomicBool::new(false));

    world.run_on_main_blocking({
        let ran = Arc::clone(&ran);
        move || ran.store(true, Ordering::Relaxed)
    });
    assert!(ran.load(Ordering::Relaxed));
    assert_eq!(world.tick_count(), 0);
    Ok(())
}

#[test]
fn test_shutdown_cancels_pending_latent_coroutines() -> Result<()> {
    let world = init_world()?;
    let probe = DropProbe::new();

    let coro = world.spawn_latent({
        let armed = probe.arm();
        async move {
            let _armed = armed;
            latent::ticks(1_000).await;
        }
    });
    world.run_ticks(2);
    assert!(!coro.is_done());

    world.shutdown();
    assert!(coro.is_done());
    assert_eq!(coro.exit_reason(), Some(ExitReason::Canceled));
    assert_eq!(probe.seen(), Some(Some(ExitReason::Canceled)));
    Ok(())
}

#[test]
fn test_run_on_main_after_close_is_dropped() -> Result<()> {
    let world = init_world()?;
    let handle = world.handle().clone();
    drop(world);

    let ran = Arc::new(AtomicBool::new(false));
    handle.run_on_main({
        let ran = Arc::clone(&ran);
        move || ran.store(true, Ordering::Relaxed)
    });
    assert!(!ran.load(Ordering::Relaxed));
    Ok(())
}

#[test]
fn test_make_latent_info_uses_fresh_uuids() -> Result<()> {
    let world = init_world()?;
    let a = world.make_latent_info();
    let b = world.make_latent_info();

    assert_eq!(a.target, b.target);
    assert_ne!(a.uuid, b.uuid);
    assert!(a.link.is_none());
    Ok(())
}

#[test]
fn test_block_on_returns_output() -> Result<()> {
    let world = init_world()?;
    let out = world.block_on(async {
        tickcoro::move_to_worker().await;
        tickcoro::move_to_main().await;
        21 * 2
    });
    assert_eq!(out, 42);
    Ok(())
}

#[test]
#[should_panic(expected = "boom")]
fn test_block_on_propagates_panic() {
    let world = init_world().unwrap();
    world.block_on(async {
        tickcoro::move_to_worker().await;
        panic!("boom");
    });
}

#[test]
fn test_worker_thread_name() -> Result<()> {
    let world = init_world_with(Builder::new().thread_name("tc-test-worker"))?;
    let name = world.block_on(async {
        tickcoro::move_to_worker().await;
        thread::current().name().map(ToOwned::to_owned)
    });
    assert_eq!(name.as_deref(), Some("tc-test-worker"));
    Ok(())
}

#[tickcoro::test(tick_interval_ms = 0)]
async fn test_macro_root_runs_on_main() -> Result<()> {
    let world = Handle::current();
    assert!(world.is_main_thread());

    latent::next_tick().await;
    assert!(world.tick_count() >= 1);
    Ok(())
}
