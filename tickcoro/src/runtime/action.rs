//! Contract between latent coroutines and the host's per-tick action manager.

use crate::runtime::Target;
use smallvec::SmallVec;

/// Continuation in the host call graph, triggered when a latent action
/// finishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LatentLink {
    pub execution_function: String,
    pub linkage: i32,
}

impl LatentLink {
    pub fn new(execution_function: impl Into<String>, linkage: i32) -> Self {
        LatentLink {
            execution_function: execution_function.into(),
            linkage,
        }
    }
}

/// Identity and continuation of a latent action: the owning target, a uuid
/// unique per target, and an optional link to trigger on completion.
#[derive(Debug, Clone)]
pub struct LatentInfo {
    pub target: Target,
    pub uuid: i32,
    pub link: Option<LatentLink>,
}

impl LatentInfo {
    pub fn new(target: Target, uuid: i32) -> Self {
        LatentInfo {
            target,
            uuid,
            link: None,
        }
    }

    pub fn with_link(mut self, execution_function: impl Into<String>, linkage: i32) -> Self {
        self.link = Some(LatentLink::new(execution_function, linkage));
        self
    }
}

/// Filled in by a [`LatentAction`] every time it is polled.
#[derive(Debug, Default)]
pub struct LatentResponse {
    done: bool,
    triggered: SmallVec<[(LatentLink, Target); 1]>,
}

impl LatentResponse {
    /// Asks the manager to remove the action once this poll returns.
    pub fn done_if(&mut self, condition: bool) -> &mut Self {
        self.done |= condition;
        self
    }

    pub fn trigger_link(&mut self, link: &LatentLink, target: &Target) -> &mut Self {
        self.triggered.push((link.clone(), target.clone()));
        self
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn into_parts(self) -> (bool, SmallVec<[(LatentLink, Target); 1]>) {
        (self.done, self.triggered)
    }
}

/// Action polled once per tick on the main thread until it reports done.
///
/// The manager owns the action and drops it on the main thread after the
/// poll that reported done, after a notification, or on shutdown.
pub trait LatentAction: Send + Sync {
    fn update_operation(&mut self, response: &mut LatentResponse);

    /// The action is about to be removed because the host aborted it.
    fn notify_action_aborted(&mut self) {}

    /// The action is about to be removed because its target was destroyed.
    fn notify_object_destroyed(&mut self) {}

    fn description(&self) -> String {
        String::from("latent action")
    }
}
