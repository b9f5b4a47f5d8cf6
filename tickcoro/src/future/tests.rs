use crate as tickcoro;
use crate::future::*;
use crate::latent;
use crate::runtime::Handle;
use crate::task::{Coroutine, ExitReason};
use crate::test_utils::*;
use anyhow::Result;
use parking_lot::Mutex;
use rstest::rstest;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

#[rstest]
#[case::empty(0)]
#[case::single(1)]
#[case::few(3)]
#[case::many(8)]
fn test_when_all_over_finished_tasks_does_not_suspend(#[case] n: usize) -> Result<()> {
    let tasks: Vec<Coroutine> = (0..n).map(|_| tickcoro::spawn(async {})).collect();
    assert!(tasks.iter().all(Coroutine::is_done));

    let (waker, counter) = mock_waker();
    let mut cx = Context::from_waker(&waker);

    let mut all = Box::pin(when_all(tasks));
    assert!(all.is_done());
    assert!(matches!(all.as_mut().poll(&mut cx), Poll::Ready(())));
    assert_eq!(counter.count(), 0);
    Ok(())
}

#[test]
fn test_when_any_empty_is_ready_with_none() -> Result<()> {
    let (waker, _) = mock_waker();
    let mut cx = Context::from_waker(&waker);

    let mut any = Box::pin(when_any(Vec::<Coroutine>::new()));
    assert!(matches!(any.as_mut().poll(&mut cx), Poll::Ready(None)));
    Ok(())
}

#[test]
fn test_when_any_resumes_once_with_first_finisher() -> Result<()> {
    let world = init_world()?;

    let tasks: Vec<Coroutine> = [7u64, 5, 9]
        .into_iter()
        .map(|n| world.spawn_latent(async move { latent::ticks(n).await }))
        .collect();

    let resumed = Arc::new(Mutex::new(Vec::new()));
    let parent = world.spawn_latent({
        let tasks = tasks.clone();
        let resumed = Arc::clone(&resumed);
        async move {
            let winner = when_any(tasks).await;
            resumed.lock().push((winner, Handle::current().tick_count()));
        }
    });

    tick_until(&world, || parent.is_done());
    assert_eq!(*resumed.lock(), vec![(Some(1), 5)]);
    assert!(!tasks[0].is_done());
    assert!(!tasks[2].is_done());

    tick_until(&world, || tasks.iter().all(Coroutine::is_done));
    assert_eq!(resumed.lock().len(), 1);
    assert_eq!(parent.exit_reason(), Some(ExitReason::Normal));
    Ok(())
}

#[test]
fn test_when_all_with_latent_awaiters_in_latent_parent() -> Result<()> {
    let world = init_world()?;
    let resumed_at = Arc::new(AtomicUsize::new(0));

    let parent = world.spawn_latent({
        let resumed_at = Arc::clone(&resumed_at);
        async move {
            when_all([latent::ticks(2), latent::ticks(4)]).await;
            let world = Handle::current();
            assert!(world.is_main_thread());
            assert!(!current_is_detached());
            resumed_at.store(world.tick_count() as usize, Ordering::Relaxed);
        }
    });

    tick_until(&world, || parent.is_done());
    assert_eq!(resumed_at.load(Ordering::Relaxed), 4);
    Ok(())
}

#[rstest]
#[case::any(true)]
#[case::all(false)]
fn test_simultaneous_completions_resume_parent_once(#[case] any: bool) -> Result<()> {
    const ROUNDS: usize = 20;
    const FAN_OUT: usize = 8;

    let world = init_world()?;
    for _ in 0..ROUNDS {
        let arrivals = Arc::new(AtomicUsize::new(0));
        let resumes = Arc::new(AtomicUsize::new(0));

        let awaitables: Vec<_> = (0..FAN_OUT)
            .map(|_| {
                let arrivals = Arc::clone(&arrivals);
                async move {
                    move_to_worker().await;
                    arrivals.fetch_add(1, Ordering::AcqRel);
                }
            })
            .collect();

        let winner = world.block_on({
            let resumes = Arc::clone(&resumes);
            async move {
                let winner = if any {
                    when_any(awaitables).await
                } else {
                    when_all(awaitables).await;
                    None
                };
                resumes.fetch_add(1, Ordering::AcqRel);
                winner
            }
        });

        assert_eq!(resumes.load(Ordering::Acquire), 1);
        if any {
            assert!(matches!(winner, Some(i) if i < FAN_OUT));
        } else {
            assert_eq!(arrivals.load(Ordering::Acquire), FAN_OUT);
        }
    }
    Ok(())
}

#[tickcoro::test]
async fn test_when_any_macro_mixes_awaitables() {
    let worker = tickcoro::spawn(async {
        move_to_worker().await;
    });

    let winner = tickcoro::when_any!(latent::ticks(1_000), worker.clone()).await;
    assert_eq!(winner, Some(1));
    assert!(worker.is_done());
}

#[tickcoro::test]
async fn test_when_all_macro_waits_for_everything() {
    let done = Arc::new(AtomicUsize::new(0));
    let child = tickcoro::spawn({
        let done = Arc::clone(&done);
        async move {
            move_to_worker().await;
            done.fetch_add(1, Ordering::Relaxed);
        }
    });

    tickcoro::when_all!(latent::next_tick(), child, yield_now()).await;
    assert_eq!(done.load(Ordering::Relaxed), 1);
}

#[tickcoro::test]
async fn test_move_between_threads() {
    let world = Handle::current();
    assert!(world.is_main_thread());

    move_to_main().await;
    assert!(world.is_main_thread());

    move_to_worker().await;
    assert!(!world.is_main_thread());

    // Already on a worker.
    let thread = std::thread::current().id();
    move_to_worker().await;
    assert_eq!(std::thread::current().id(), thread);

    move_to_main().await;
    assert!(world.is_main_thread());
}

#[tickcoro::test]
async fn test_yield_now_on_main_waits_for_next_tick() {
    let world = Handle::current();
    let before = world.tick_count();

    yield_now().await;
    assert!(world.is_main_thread());
    assert_eq!(world.tick_count(), before + 1);
}

#[tickcoro::test]
async fn test_yield_now_on_worker_stays_on_worker() {
    let world = Handle::current();
    move_to_worker().await;

    yield_now().await;
    assert!(!world.is_main_thread());
}

#[tickcoro::test]
async fn test_awaiting_finished_coroutine_is_immediate() {
    let world = Handle::current();
    let coro = tickcoro::spawn(async {});
    let before = world.tick_count();

    coro.await;
    assert_eq!(world.tick_count(), before);
}

#[tickcoro::test]
async fn test_awaiting_coroutine_resumes_on_completing_thread() {
    let world = Handle::current();
    let gate = Gate::new();
    let coro = tickcoro::spawn({
        let gate = gate.clone();
        async move { gate.wait().await }
    });

    world.run_on_worker(move || gate.open());
    coro.await;
    assert!(!world.is_main_thread());
}
