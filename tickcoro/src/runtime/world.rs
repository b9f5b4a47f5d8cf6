use crate::context;
use crate::future::CatchUnwind;
use crate::latent::{LatentCondition, LatentPromise};
use crate::runtime::action_manager::ActionManager;
use crate::runtime::builder::{WorldConfig, release_world_slot};
use crate::runtime::{Job, LatentInfo, Target};
use crate::task::Coroutine;
use crate::utils::Event;
use crossbeam_deque::{Injector, Steal};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Deref;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// How often a thread blocked on the main thread re-checks that the world is
/// still alive.
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Host environment for coroutines: one main thread running a tick loop plus
/// worker threads spawned on demand.
///
/// The thread that builds the world becomes its main thread. Each
/// [`tick`](World::tick) runs the jobs queued for the main thread, polls every
/// latent action once, then polls the latent awaiters of free-threaded
/// coroutines.
///
/// Dropping the world drops every pending latent action, which destroys the
/// coroutines that are still attached to the main thread.
pub struct World {
    handle: Handle,
    shut_down: bool,

    // Must stay on the thread that built it.
    _not_send: PhantomData<*const ()>,
}

/// Cheap, thread-safe reference to a [`World`].
#[derive(Clone)]
pub struct Handle {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    main_thread: ThreadId,
    cfg: WorldConfig,
    tick: AtomicU64,
    closed: AtomicBool,

    actions: ActionManager,
    main_queue: Injector<Job>,

    /// Latent awaiters used outside of frame-tracked coroutines.
    latent_waiters: Mutex<Vec<Arc<LatentCondition>>>,

    /// Owner of latent actions started without explicit latent info.
    default_target: Target,
    next_uuid: AtomicI32,
}

impl World {
    pub(crate) fn new(cfg: WorldConfig) -> World {
        let handle = Handle {
            shared: Arc::new(Shared {
                main_thread: thread::current().id(),
                cfg,
                tick: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                actions: ActionManager::new(),
                main_queue: Injector::new(),
                latent_waiters: Mutex::new(Vec::new()),
                default_target: Target::new("world"),
                next_uuid: AtomicI32::new(0),
            }),
        };

        context::set_world(Some(handle.clone()));
        tracing::debug!(main_thread = ?handle.shared.main_thread, "world created");

        World {
            handle,
            shut_down: false,
            _not_send: PhantomData,
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs one frame of the main loop.
    pub fn tick(&self) {
        let shared = &self.handle.shared;
        let tick = shared.tick.fetch_add(1, Ordering::AcqRel) + 1;

        let span = tracing::trace_span!("tick", tick);
        let _enter = span.enter();

        self.run_main_jobs();
        shared.actions.process_actions();
        self.poll_latent_waiters();
    }

    /// Ticks until `done` returns true, checking it before every tick.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) {
        let interval = self.handle.shared.cfg.tick_interval;
        while !done() {
            self.tick();
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
    }

    pub fn run_ticks(&self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Runs `future` as a free-threaded coroutine and ticks the world until it
    /// finishes. A panic in `future` is resumed on the calling thread.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let output = Arc::new(Mutex::new(None));
        let root = crate::spawn({
            let output = Arc::clone(&output);
            async move {
                let res = CatchUnwind::new(future).await;
                *output.lock() = Some(res);
            }
        });

        self.run_until(|| root.is_done());

        let res = output.lock().take();
        match res {
            Some(Ok(output)) => output,
            Some(Err(payload)) => panic::resume_unwind(payload),
            None => panic!("root coroutine finished without producing its output"),
        }
    }

    /// Shuts the world down. Same as dropping it.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let shared = &self.handle.shared;
        tracing::debug!(
            actions = shared.actions.len(),
            tick = shared.tick.load(Ordering::Acquire),
            "world shutting down"
        );

        self.run_main_jobs();
        shared.actions.shutdown();
        self.run_main_jobs();

        shared.closed.store(true, Ordering::Release);
        let waiters = std::mem::take(&mut *shared.latent_waiters.lock());
        for waiter in waiters {
            waiter.abandon();
        }

        // Whatever was queued after this point can no longer run.
        loop {
            match shared.main_queue.steal() {
                Steal::Success(job) => drop(job),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }

        context::set_world(None);
        release_world_slot();
    }

    fn run_main_jobs(&self) {
        let queue = &self.handle.shared.main_queue;

        // Jobs queued by these jobs wait for the next tick.
        let mut budget = queue.len();
        while budget > 0 {
            match queue.steal() {
                Steal::Success(job) => {
                    budget -= 1;
                    job();
                }
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
    }

    fn poll_latent_waiters(&self) {
        let shared = &self.handle.shared;
        let waiters = std::mem::take(&mut *shared.latent_waiters.lock());

        let mut pending = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            if waiter.is_abandoned() {
                continue;
            }

            if waiter.should_resume() {
                waiter.wake();
            } else {
                pending.push(waiter);
            }
        }

        // Keep registration order: survivors first, then whatever was added
        // while waking.
        let mut waiters = shared.latent_waiters.lock();
        pending.append(&mut waiters);
        *waiters = pending;
    }
}

impl Deref for World {
    type Target = Handle;

    fn deref(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World").field("handle", &self.handle).finish()
    }
}

impl Handle {
    /// Returns the world the current thread belongs to.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread that is neither a world's main thread
    /// nor one of its workers.
    #[track_caller]
    pub fn current() -> Handle {
        match context::try_world() {
            Some(handle) => handle,
            None => panic!("no tickcoro World is active on this thread"),
        }
    }

    pub fn try_current() -> Option<Handle> {
        context::try_world()
    }

    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.shared.main_thread
    }

    pub fn main_thread_id(&self) -> ThreadId {
        self.shared.main_thread
    }

    /// Number of ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.shared.tick.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Queues `f` to run on the main thread at the start of the next tick,
    /// even when called from the main thread.
    pub fn run_on_main<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_closed() {
            tracing::warn!("world is closed, dropping main thread job");
            return;
        }
        self.shared.main_queue.push(Box::new(f));
    }

    /// Runs `f` on the main thread and blocks until it ran. Runs inline when
    /// already on the main thread.
    ///
    /// Gives up without running `f` if the world shuts down first.
    pub fn run_on_main_blocking<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_main_thread() {
            f();
            return;
        }

        let done = Arc::new(Event::new());
        self.run_on_main({
            let done = Arc::clone(&done);
            move || {
                f();
                done.set();
            }
        });

        while !done.wait(Some(BLOCKING_POLL_INTERVAL)) {
            if self.is_closed() {
                tracing::warn!("world closed while blocked on the main thread");
                return;
            }
        }
    }

    /// Runs `f` on a new worker thread that belongs to this world.
    ///
    /// Every call spawns its own OS thread, named by the builder, and there is
    /// no pool. Thread hops are rare compared to ticks, and a job is free to
    /// block, e.g. on [`run_on_main_blocking`](Handle::run_on_main_blocking),
    /// without starving other detached coroutines. Hosts with heavy worker
    /// traffic should dispatch to their own pool instead.
    pub fn run_on_worker<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let cfg = &self.shared.cfg;
        let mut builder = thread::Builder::new().name(cfg.worker_namer.next_name());
        if let Some(size) = cfg.worker_stack {
            builder = builder.stack_size(size);
        }

        let handle = self.clone();
        let res = builder.spawn(move || {
            context::set_world(Some(handle));
            f();
        });

        if let Err(e) = res {
            panic!("FATAL: failed to spawn worker thread: {e}");
        }
    }

    /// Latent info owned by the world itself, with a fresh uuid and no link.
    pub fn make_latent_info(&self) -> LatentInfo {
        let uuid = self.shared.next_uuid.fetch_add(1, Ordering::Relaxed);
        LatentInfo::new(self.shared.default_target.clone(), uuid)
    }

    /// Starts a frame-tracked coroutine owned by the world itself.
    ///
    /// # Panics
    ///
    /// Panics when not called on the main thread.
    #[track_caller]
    pub fn spawn_latent<F>(&self, future: F) -> Coroutine
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_latent_with(self.make_latent_info(), future)
    }

    /// Starts a frame-tracked coroutine registered as the latent action
    /// `info.uuid` of `info.target`.
    ///
    /// The body runs immediately until its first suspension point. If the
    /// target is invalid or already has an action with that uuid, the
    /// coroutine is destroyed without ever running and completes with
    /// [`ExitReason::Canceled`](crate::ExitReason::Canceled).
    ///
    /// # Panics
    ///
    /// Panics when not called on the main thread.
    #[track_caller]
    pub fn spawn_latent_with<F>(&self, info: LatentInfo, future: F) -> Coroutine
    where
        F: Future<Output = ()> + Send + 'static,
    {
        LatentPromise::start(self.clone(), info, Box::pin(future))
    }

    /// Marks `target` destroyed. Its latent actions are notified and removed
    /// on the next tick.
    pub fn destroy_target(&self, target: &Target) {
        tracing::debug!(target_id = %target.id(), target_name = target.name(), "destroying target");
        target.invalidate();
    }

    /// Aborts the latent action `uuid` of `target` on the next tick.
    pub fn abort_action(&self, target: &Target, uuid: i32) {
        self.shared.actions.abort_action(target, uuid);
    }

    pub fn has_pending_action(&self, target: &Target, uuid: i32) -> bool {
        self.shared.actions.find_existing_action(target, uuid)
    }

    pub fn pending_actions(&self) -> usize {
        self.shared.actions.len()
    }

    pub(crate) fn actions(&self) -> &ActionManager {
        &self.shared.actions
    }

    pub(crate) fn register_latent_waiter(&self, waiter: Arc<LatentCondition>) {
        self.shared.latent_waiters.lock().push(waiter);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("main_thread", &self.shared.main_thread)
            .field("tick", &self.tick_count())
            .field("closed", &self.is_closed())
            .field("actions", &self.shared.actions)
            .finish()
    }
}
