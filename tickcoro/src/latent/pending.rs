use crate::latent::awaiter::LatentCondition;
use crate::latent::promise::LatentPromise;
use crate::runtime::{LatentAction, LatentInfo, LatentResponse};
use crate::task::ExitReason;
use crate::utils::MainThreadCell;
use std::sync::Arc;
use std::thread::ThreadId;

/// State shared between a latent coroutine and its pending action.
///
/// Both sides hold the link rather than each other, so neither keeps the other
/// alive. Clearing `promise` is how either side tells the other it is gone.
#[derive(Debug)]
pub(crate) struct PromiseLink {
    promise: MainThreadCell<Option<Arc<LatentPromise>>>,
    current_awaiter: MainThreadCell<Option<Arc<LatentCondition>>>,
}

impl PromiseLink {
    pub(crate) fn new(main_thread: ThreadId, promise: Arc<LatentPromise>) -> Arc<Self> {
        Arc::new(PromiseLink {
            promise: MainThreadCell::new(main_thread, Some(promise)),
            current_awaiter: MainThreadCell::new(main_thread, None),
        })
    }

    pub(crate) fn promise(&self) -> Option<Arc<LatentPromise>> {
        self.promise.get()
    }

    pub(crate) fn set_current_awaiter(&self, awaiter: Arc<LatentCondition>) {
        self.current_awaiter.replace(Some(awaiter));
    }

    /// Takes the awaiter if its condition holds. Abandoned awaiters are
    /// discarded.
    fn take_ready_awaiter(&self) -> bool {
        let Some(awaiter) = self.current_awaiter.get() else {
            return false;
        };

        // Evaluated without holding the cell, the check runs user code.
        let ready = !awaiter.is_abandoned() && awaiter.should_resume();
        if ready || awaiter.is_abandoned() {
            self.current_awaiter.take();
        }
        ready
    }

    /// Severs the link from either side.
    pub(crate) fn forget(&self) -> Option<Arc<LatentPromise>> {
        self.current_awaiter.take();
        self.promise.take()
    }
}

/// Latent action driving a frame-tracked coroutine from the tick loop.
pub(crate) struct PendingLatentAction {
    link: Arc<PromiseLink>,
    info: LatentInfo,
}

impl PendingLatentAction {
    pub(crate) fn new(link: Arc<PromiseLink>, info: LatentInfo) -> Self {
        PendingLatentAction { link, info }
    }

    pub(crate) fn unlink(&self) {
        self.link.forget();
    }
}

impl LatentAction for PendingLatentAction {
    fn update_operation(&mut self, response: &mut LatentResponse) {
        let Some(promise) = self.link.promise() else {
            response.done_if(true);
            return;
        };

        let ready = self.link.take_ready_awaiter();
        let woken = promise.take_woken();
        if ready || woken {
            promise.resume(false);
        }

        // Resuming may have destroyed it.
        match self.link.promise() {
            Some(promise) => promise.respond(response, &self.info),
            None => {
                response.done_if(true);
            }
        }
    }

    fn notify_action_aborted(&mut self) {
        if let Some(promise) = self.link.promise() {
            promise.set_exit_reason(ExitReason::ActionAborted);
        }
    }

    fn notify_object_destroyed(&mut self) {
        if let Some(promise) = self.link.promise() {
            promise.set_exit_reason(ExitReason::ObjectDestroyed);
        }
    }

    fn description(&self) -> String {
        match self.link.promise() {
            Some(promise) => format!("latent coroutine {}", promise.promise().id()),
            None => "latent coroutine (finished)".to_owned(),
        }
    }
}

impl Drop for PendingLatentAction {
    fn drop(&mut self) {
        let Some(promise) = self.link.forget() else {
            return;
        };

        // The action manager is done with us: cancel, then let the coroutine
        // react unless it is detached.
        promise.cancel();
        promise.resume(true);
    }
}
