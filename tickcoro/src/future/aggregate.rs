use crate::context;
use crate::task::FrameHandle;
use parking_lot::Mutex;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Type-erased awaitable accepted by [`when_any`] and [`when_all`].
pub type ErasedAwaitable = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[doc(hidden)]
pub fn erase<F>(awaitable: F) -> ErasedAwaitable
where
    F: IntoFuture,
    F::IntoFuture: Send + 'static,
{
    let fut = awaitable.into_future();
    Box::pin(async move {
        fut.await;
    })
}

/// Whoever has to be resumed once the quorum is reached.
enum Parent {
    Frame(FrameHandle),

    /// Polled outside of any coroutine.
    Waker(Waker),
}

impl Parent {
    fn resume(self) {
        match self {
            Parent::Frame(frame) => frame.resume(),
            Parent::Waker(waker) => waker.wake(),
        }
    }
}

struct FanInState {
    remaining: usize,

    /// Observer that brought `remaining` to zero.
    index: Option<usize>,

    parent: Option<Parent>,
}

/// State shared by the observers and the awaiter.
struct FanIn {
    state: Mutex<FanInState>,
}

impl FanIn {
    fn new(remaining: usize) -> Arc<Self> {
        Arc::new(FanIn {
            state: Mutex::new(FanInState {
                remaining,
                index: None,
                parent: None,
            }),
        })
    }

    fn arrive(&self, index: usize) {
        let mut state = self.state.lock();

        // Late arrivals after the quorum.
        if state.remaining == 0 {
            return;
        }

        state.remaining -= 1;
        if state.remaining != 0 {
            return;
        }

        state.index = Some(index);
        let parent = state.parent.take();
        drop(state);

        if let Some(parent) = parent {
            tracing::trace!(index, "aggregate awaiter resuming parent");
            parent.resume();
        }
    }
}

/// Future resuming the awaiting coroutine once a quorum of awaitables
/// finished.
///
/// Each awaitable is awaited by its own free-threaded coroutine, started when
/// the awaiter is created. Exactly one of them resumes the awaiting coroutine,
/// on whatever thread it finishes.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct AggregateAwaiter {
    fan_in: Arc<FanIn>,
}

impl AggregateAwaiter {
    fn new<I>(awaitables: I, any: bool) -> Self
    where
        I: IntoIterator<Item = ErasedAwaitable>,
    {
        let awaitables: Vec<_> = awaitables.into_iter().collect();
        let count = awaitables.len();
        let remaining = if any { count.min(1) } else { count };
        let fan_in = FanIn::new(remaining);

        for (index, awaitable) in awaitables.into_iter().enumerate() {
            let fan_in = Arc::clone(&fan_in);
            crate::spawn(async move {
                awaitable.await;
                fan_in.arrive(index);
            });
        }

        AggregateAwaiter { fan_in }
    }

    /// True once the quorum has been reached.
    pub fn is_done(&self) -> bool {
        self.fan_in.state.lock().remaining == 0
    }

    fn poll_done(&self, cx: &mut Context<'_>) -> Poll<Option<usize>> {
        let mut state = self.fan_in.state.lock();
        if state.remaining == 0 {
            return Poll::Ready(state.index);
        }

        match context::current_frame() {
            Some(frame) => {
                // Whichever observer reaches the quorum may run anywhere.
                frame.detach_from_main();
                if state.parent.is_none() {
                    state.parent = Some(Parent::Frame(frame));
                }
            }
            None => state.parent = Some(Parent::Waker(cx.waker().clone())),
        }

        Poll::Pending
    }
}

impl Drop for AggregateAwaiter {
    fn drop(&mut self) {
        // Never resume a parent that stopped waiting.
        let parent = self.fan_in.state.lock().parent.take();
        drop(parent);
    }
}

impl fmt::Debug for AggregateAwaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.fan_in.state.lock();
        f.debug_struct("AggregateAwaiter")
            .field("remaining", &state.remaining)
            .field("index", &state.index)
            .finish()
    }
}

/// Completes with the index of the first awaitable to finish.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct AnyAwaiter(AggregateAwaiter);

impl AnyAwaiter {
    pub fn is_done(&self) -> bool {
        self.0.is_done()
    }
}

impl Future for AnyAwaiter {
    /// `None` only when there was nothing to wait for.
    type Output = Option<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<usize>> {
        self.0.poll_done(cx)
    }
}

/// Completes once every awaitable finished.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct AllAwaiter(AggregateAwaiter);

impl AllAwaiter {
    pub fn is_done(&self) -> bool {
        self.0.is_done()
    }
}

impl Future for AllAwaiter {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_done(cx).map(|_| ())
    }
}

/// Waits for the first of `awaitables` to finish. The others keep running.
///
/// Use [`when_any!`](crate::when_any) to mix awaitables of different types.
pub fn when_any<I, F>(awaitables: I) -> AnyAwaiter
where
    I: IntoIterator<Item = F>,
    F: IntoFuture,
    F::IntoFuture: Send + 'static,
{
    AnyAwaiter(AggregateAwaiter::new(
        awaitables.into_iter().map(erase),
        true,
    ))
}

/// Waits for all of `awaitables` to finish.
///
/// Use [`when_all!`](crate::when_all) to mix awaitables of different types.
pub fn when_all<I, F>(awaitables: I) -> AllAwaiter
where
    I: IntoIterator<Item = F>,
    F: IntoFuture,
    F::IntoFuture: Send + 'static,
{
    AllAwaiter(AggregateAwaiter::new(
        awaitables.into_iter().map(erase),
        false,
    ))
}

/// [`when_any`] over awaitables of different types.
///
/// ```ignore
/// let winner = tickcoro::when_any!(tickcoro::latent::ticks(3), coro).await;
/// ```
#[macro_export]
macro_rules! when_any {
    ($($awaitable:expr),* $(,)?) => {{
        let awaitables: ::std::vec::Vec<$crate::future::aggregate::ErasedAwaitable> =
            ::std::vec![$($crate::future::aggregate::erase($awaitable)),*];
        $crate::future::when_any(awaitables)
    }};
}

/// [`when_all`] over awaitables of different types.
#[macro_export]
macro_rules! when_all {
    ($($awaitable:expr),* $(,)?) => {{
        let awaitables: ::std::vec::Vec<$crate::future::aggregate::ErasedAwaitable> =
            ::std::vec![$($crate::future::aggregate::erase($awaitable)),*];
        $crate::future::when_all(awaitables)
    }};
}
