use crate::context;
use crate::latent::awaiter::LatentCondition;
use crate::latent::pending::{PendingLatentAction, PromiseLink};
use crate::runtime::{Handle, LatentInfo, LatentResponse};
use crate::task::completion::PromiseKind;
use crate::task::promise::{BoxFuture, Promise};
use crate::task::{Coroutine, ExitReason, FrameHandle};
use crate::utils::{MainThreadCell, PanicPayload};
use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::task::{Poll, Wake, Waker};

/// Coarse lifecycle of a frame-tracked coroutine.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LatentState {
    /// Attached to the main thread and polled by its pending action.
    MainRunning = 0,
    /// Detached, running wherever it was last resumed.
    WorkerRunning = 1,
    /// Cancellation requested. Held while detached.
    Canceled = 2,
    /// Destroyed.
    Done = 3,
}

impl LatentState {
    fn from_u8(val: u8) -> Self {
        match val {
            0 => LatentState::MainRunning,
            1 => LatentState::WorkerRunning,
            2 => LatentState::Canceled,
            3 => LatentState::Done,
            _ => unreachable!("invalid latent state {val}"),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct LatentFlags: u8 {
        /// Left the main thread. The pending action must not report the
        /// coroutine finished nor destroy it.
        const DETACHED = 1;

        /// The body returned. Overwrites every other flag.
        const IN_FINAL_SUSPEND = 1 << 1;
    }
}

fn exit_reason_from_u8(val: u8) -> ExitReason {
    match val {
        0 => ExitReason::Normal,
        1 => ExitReason::Canceled,
        2 => ExitReason::ActionAborted,
        3 => ExitReason::ObjectDestroyed,
        _ => unreachable!("invalid exit reason {val}"),
    }
}

fn exit_reason_to_u8(reason: ExitReason) -> u8 {
    match reason {
        ExitReason::Normal => 0,
        ExitReason::Canceled => 1,
        ExitReason::ActionAborted => 2,
        ExitReason::ObjectDestroyed => 3,
    }
}

/// Promise of a frame-tracked ("latent") coroutine.
///
/// The coroutine is registered as a latent action with the world's action
/// manager through a [`PendingLatentAction`], and is polled by it once per
/// tick while attached to the main thread. It may detach to run on worker
/// threads and is re-attached the next time it runs on the main thread.
///
/// Destruction always happens exactly once and, except after an unhandled
/// panic, on the main thread.
pub(crate) struct LatentPromise {
    promise: Promise,
    world: Handle,

    state: AtomicU8,
    flags: AtomicU8,

    /// A plain waker fired while attached. Picked up by the next tick.
    woken: AtomicBool,

    /// Set by whoever destroys the frame.
    destroyed: AtomicBool,

    /// Written on the main thread only.
    exit_reason: AtomicU8,

    /// Link shared with the pending action. `None` once forgotten.
    link: MainThreadCell<Option<Arc<PromiseLink>>>,
}

impl LatentPromise {
    /// Creates the frame, registers its latent action and runs the body until
    /// its first suspension point.
    #[track_caller]
    pub(crate) fn start(world: Handle, info: LatentInfo, body: BoxFuture) -> Coroutine {
        assert!(
            world.is_main_thread(),
            "Latent coroutines may only be started on the main thread"
        );

        let main_thread = world.main_thread_id();
        let promise = Arc::new(LatentPromise {
            promise: Promise::new(PromiseKind::Latent, body),
            world,
            state: AtomicU8::new(LatentState::MainRunning as u8),
            flags: AtomicU8::new(0),
            woken: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            exit_reason: AtomicU8::new(exit_reason_to_u8(ExitReason::Normal)),
            link: MainThreadCell::new(main_thread, None),
        });
        let coroutine = Coroutine::from_latent(&promise);

        let link = PromiseLink::new(main_thread, Arc::clone(&promise));
        *promise.link.borrow_mut() = Some(Arc::clone(&link));
        let pending = PendingLatentAction::new(link, info.clone());

        let actions = promise.world.actions();
        if actions.find_existing_action(&info.target, info.uuid) {
            tracing::debug!(
                id = %promise.promise.id(),
                target_id = %info.target.id(),
                uuid = info.uuid,
                "not starting latent coroutine: action already registered"
            );
            promise.reject(pending);
            return coroutine;
        }

        if !info.target.is_valid() {
            tracing::warn!(
                id = %promise.promise.id(),
                target_id = %info.target.id(),
                uuid = info.uuid,
                "not starting latent coroutine: invalid target"
            );
            promise.reject(pending);
            return coroutine;
        }

        actions.add_new_action(&info.target, info.uuid, Box::new(pending));

        // First poll happens right away on the calling thread.
        promise.resume(false);
        coroutine
    }

    /// Destroys a frame that was never resumed.
    fn reject(self: &Arc<Self>, pending: PendingLatentAction) {
        // Unlinked first, so dropping the action does not cancel and resume us.
        pending.unlink();
        drop(pending);

        self.cancel();
        self.destroy();
    }

    pub(crate) fn promise(&self) -> &Promise {
        &self.promise
    }

    pub(crate) fn state(&self) -> LatentState {
        LatentState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn flags(&self) -> LatentFlags {
        LatentFlags::from_bits_retain(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.flags().contains(LatentFlags::DETACHED)
    }

    pub(crate) fn take_woken(&self) -> bool {
        self.woken.swap(false, Ordering::AcqRel)
    }

    /// Resumes the coroutine on the calling thread.
    ///
    /// `bypass_holds` is only used by the pending action while it is being
    /// dropped on the main thread, after canceling: it lets the coroutine react
    /// to the cancellation unless it is detached, in which case the
    /// cancellation is held until it comes back.
    pub(crate) fn resume(self: &Arc<Self>, bypass_holds: bool) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }

        let flags = self.flags();
        if bypass_holds {
            assert!(
                self.world.is_main_thread() && self.state() == LatentState::Canceled,
                "Internal error: wrong state for bypass request"
            );
            if flags.contains(LatentFlags::IN_FINAL_SUSPEND) {
                self.destroy();
                return;
            }
            if flags.contains(LatentFlags::DETACHED) {
                return;
            }
        } else if flags.contains(LatentFlags::IN_FINAL_SUSPEND) {
            // Nothing left to run, the pending action takes it from here.
            return;
        }

        if !self.promise.try_start_running() {
            return;
        }

        let span = tracing::trace_span!("coroutine", id = %self.promise.id(), kind = "Latent");
        let _enter = span.enter();

        let waker = Waker::from(Arc::clone(self));
        let frame = context::enter_frame(FrameHandle::Latent(Arc::clone(self)));

        loop {
            if self.world.is_main_thread() {
                self.attach_to_main();
            } else {
                assert!(
                    self.is_detached(),
                    "Internal error: attached latent coroutine resumed off the main thread"
                );
            }

            if self.state() == LatentState::Canceled && !self.is_detached() {
                self.destroy();
                break;
            }

            match self.promise.poll_body(&waker) {
                Poll::Pending => {
                    if self.promise.try_stop_running() {
                        break;
                    }
                }
                Poll::Ready(Ok(())) => {
                    self.final_suspend();
                    break;
                }
                Poll::Ready(Err(payload)) => {
                    self.unhandled_panic(payload);
                    break;
                }
            }
        }

        drop(frame);
    }

    /// Called from awaiters that are about to let the coroutine continue on
    /// another thread.
    pub(crate) fn detach_from_main(&self) {
        if !self.world.is_main_thread() {
            assert!(
                self.is_detached(),
                "Internal error: attached latent coroutine running off the main thread"
            );
            return;
        }

        let prev = LatentFlags::from_bits_retain(
            self.flags
                .fetch_or(LatentFlags::DETACHED.bits(), Ordering::AcqRel),
        );
        assert!(
            !prev.intersects(LatentFlags::DETACHED | LatentFlags::IN_FINAL_SUSPEND),
            "Internal error: unexpected latent coroutine state {prev:?} while detaching"
        );

        let _ = self.state.compare_exchange(
            LatentState::MainRunning as u8,
            LatentState::WorkerRunning as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        tracing::trace!(id = %self.promise.id(), "latent coroutine detached");
    }

    fn attach_to_main(&self) {
        let prev = LatentFlags::from_bits_retain(
            self.flags
                .fetch_and(!LatentFlags::DETACHED.bits(), Ordering::AcqRel),
        );
        if !prev.contains(LatentFlags::DETACHED) {
            return;
        }

        // A held cancellation stays `Canceled`.
        let _ = self.state.compare_exchange(
            LatentState::WorkerRunning as u8,
            LatentState::MainRunning as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        tracing::trace!(id = %self.promise.id(), "latent coroutine attached");
    }

    #[track_caller]
    pub(crate) fn cancel(&self) {
        assert!(
            self.world.is_main_thread(),
            "Latent coroutines may only be canceled on the main thread"
        );

        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |curr| {
                (curr != LatentState::Done as u8).then_some(LatentState::Canceled as u8)
            });
    }

    #[track_caller]
    pub(crate) fn set_exit_reason(&self, reason: ExitReason) {
        assert!(
            self.world.is_main_thread(),
            "Internal error: exit reason set off the main thread"
        );

        let prev = exit_reason_from_u8(self.exit_reason.load(Ordering::Acquire));
        assert!(
            prev == ExitReason::Normal || prev == reason,
            "Internal error: conflicting exit reasons {prev:?} and {reason:?}"
        );
        self.exit_reason
            .store(exit_reason_to_u8(reason), Ordering::Release);
    }

    pub(crate) fn set_current_awaiter(&self, awaiter: Arc<LatentCondition>) {
        assert!(
            self.world.is_main_thread(),
            "Latent awaiters may only be used on the main thread"
        );

        if let Some(link) = self.link.borrow().as_ref() {
            link.set_current_awaiter(awaiter);
        }
    }

    /// Answers a poll of the pending action.
    pub(crate) fn respond(&self, response: &mut LatentResponse, info: &LatentInfo) {
        assert!(
            !self.promise.completion().is_complete(),
            "Internal error: polling a completed latent coroutine"
        );

        let flags = self.flags();
        let canceled = self.state() == LatentState::Canceled;
        let finished = flags.contains(LatentFlags::IN_FINAL_SUSPEND);

        response.done_if((canceled && !flags.contains(LatentFlags::DETACHED)) || finished);
        if finished {
            if let Some(link) = &info.link {
                response.trigger_link(link, &info.target);
            }
        }
    }

    fn final_suspend(self: &Arc<Self>) {
        self.flags
            .store(LatentFlags::IN_FINAL_SUSPEND.bits(), Ordering::Release);

        // From here on the pending action, or a cancellation that raced this
        // store, may destroy the frame on the main thread at any moment. The
        // Arc keeps it allocated, but nothing below may assume it is still
        // undestroyed.
        if self.state() == LatentState::Canceled {
            self.thread_safe_destroy();
        }
    }

    fn thread_safe_destroy(self: &Arc<Self>) {
        if self.world.is_main_thread() {
            self.destroy();
        } else {
            let this = Arc::clone(self);
            self.world.run_on_main(move || this.destroy());
        }
    }

    fn destroy(self: &Arc<Self>) {
        assert!(
            self.world.is_main_thread(),
            "Internal error: latent coroutine destroyed off the main thread"
        );
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.forget_pending();
        self.finish_destroy();
    }

    /// Tears the frame down on the current thread after an unhandled panic.
    fn unhandled_panic(self: &Arc<Self>, payload: PanicPayload) {
        self.promise.report_panic(&payload);
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        // The pending action must stop referring to us before the frame goes
        // away, so it never tries to destroy it a second time.
        if self.world.is_main_thread() {
            self.forget_pending();
        } else {
            let this = Arc::clone(self);
            self.world.run_on_main_blocking(move || this.forget_pending());
        }

        self.finish_destroy();
    }

    fn forget_pending(&self) {
        if let Some(link) = self.link.take() {
            link.forget();
        }
    }

    fn finish_destroy(&self) {
        let reason = self.resolve_exit_reason();

        self.state.store(LatentState::Done as u8, Ordering::Release);
        self.promise.mark_complete();

        context::with_exit_reason(reason, || self.promise.drop_body());

        tracing::trace!(id = %self.promise.id(), ?reason, "latent coroutine destroyed");
        self.promise.completion().signal_completion(Some(reason));
    }

    fn resolve_exit_reason(&self) -> ExitReason {
        let explicit = exit_reason_from_u8(self.exit_reason.load(Ordering::Acquire));
        if explicit != ExitReason::Normal {
            return explicit;
        }

        let finished = self.flags().contains(LatentFlags::IN_FINAL_SUSPEND);
        if !finished && self.state() == LatentState::Canceled {
            ExitReason::Canceled
        } else {
            ExitReason::Normal
        }
    }
}

impl Wake for LatentPromise {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }

        let flags = self.flags();
        if flags.contains(LatentFlags::IN_FINAL_SUSPEND) {
            return;
        }

        if flags.contains(LatentFlags::DETACHED) {
            self.resume(false);
        } else {
            self.woken.store(true, Ordering::Release);
        }
    }
}

impl fmt::Debug for LatentPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatentPromise")
            .field("promise", &self.promise)
            .field("state", &self.state())
            .field("flags", &self.flags())
            .field(
                "exit_reason",
                &exit_reason_from_u8(self.exit_reason.load(Ordering::Acquire)),
            )
            .finish()
    }
}
