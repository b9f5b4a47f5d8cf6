use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{AcqRel, Acquire};

/// Run-state word shared by every coroutine frame.
///
/// Only the thread that moved the word to `RUNNING` may poll the frame's body.
/// A resume request that finds the frame already running sets `NOTIFIED`, and
/// the running thread polls once more before it lets go of the frame.
pub(crate) struct State {
    val: AtomicUsize,
}

/// The frame is being polled by some thread.
const RUNNING: usize = 0b0001;

/// A resume request arrived while the frame was running.
const NOTIFIED: usize = 0b0010;

/// The frame is finished and its body is gone. Terminal.
const COMPLETE: usize = 0b0100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToRunning {
    Success,
    /// Another thread is polling; it will poll again on our behalf.
    Notified,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToIdle {
    Ok,
    /// A resume request arrived during the poll. The caller still owns the
    /// frame and must poll again.
    OkNotified,
    Complete,
}

impl State {
    pub(crate) fn new() -> Self {
        State {
            val: AtomicUsize::new(0),
        }
    }

    pub(crate) fn transition_to_running(&self) -> TransitionToRunning {
        let mut action = TransitionToRunning::Success;
        let _ = self.val.fetch_update(AcqRel, Acquire, |curr| {
            if curr & COMPLETE != 0 {
                action = TransitionToRunning::Complete;
                None
            } else if curr & RUNNING != 0 {
                action = TransitionToRunning::Notified;
                Some(curr | NOTIFIED)
            } else {
                action = TransitionToRunning::Success;
                Some((curr | RUNNING) & !NOTIFIED)
            }
        });
        action
    }

    pub(crate) fn transition_to_idle(&self) -> TransitionToIdle {
        let mut action = TransitionToIdle::Ok;
        let _ = self.val.fetch_update(AcqRel, Acquire, |curr| {
            assert!(
                curr & (RUNNING | COMPLETE) != 0,
                "Internal error: frame went idle without running"
            );
            if curr & COMPLETE != 0 {
                action = TransitionToIdle::Complete;
                None
            } else if curr & NOTIFIED != 0 {
                action = TransitionToIdle::OkNotified;
                Some(curr & !NOTIFIED)
            } else {
                action = TransitionToIdle::Ok;
                Some(curr & !RUNNING)
            }
        });
        action
    }

    /// Marks the frame complete. Returns false if it already was.
    pub(crate) fn transition_to_complete(&self) -> bool {
        let prev = self.val.swap(COMPLETE, AcqRel);
        prev & COMPLETE == 0
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.val.load(Acquire) & COMPLETE != 0
    }

    pub(crate) fn is_running(&self) -> bool {
        self.val.load(Acquire) & RUNNING != 0
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = self.val.load(Acquire);
        f.debug_struct("State")
            .field("running", &(val & RUNNING != 0))
            .field("notified", &(val & NOTIFIED != 0))
            .field("complete", &(val & COMPLETE != 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_then_idle() {
        let state = State::new();
        assert_eq!(state.transition_to_running(), TransitionToRunning::Success);
        assert!(state.is_running());
        assert_eq!(state.transition_to_idle(), TransitionToIdle::Ok);
        assert!(!state.is_running());
    }

    #[test]
    fn test_resume_while_running_notifies() {
        let state = State::new();
        assert_eq!(state.transition_to_running(), TransitionToRunning::Success);
        assert_eq!(state.transition_to_running(), TransitionToRunning::Notified);
        assert_eq!(state.transition_to_running(), TransitionToRunning::Notified);

        // A single extra poll covers any number of notifications.
        assert_eq!(state.transition_to_idle(), TransitionToIdle::OkNotified);
        assert!(state.is_running());
        assert_eq!(state.transition_to_idle(), TransitionToIdle::Ok);
    }

    #[test]
    fn test_complete_is_terminal() {
        let state = State::new();
        assert_eq!(state.transition_to_running(), TransitionToRunning::Success);
        assert!(state.transition_to_complete());
        assert!(!state.transition_to_complete());

        assert_eq!(state.transition_to_idle(), TransitionToIdle::Complete);
        assert_eq!(state.transition_to_running(), TransitionToRunning::Complete);
        assert!(state.is_complete());
    }
}
