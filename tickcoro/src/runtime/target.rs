use crate::runtime::action::LatentLink;
use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TargetId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Host object that owns latent actions.
///
/// A target stays valid until [`Handle::destroy_target`] is called on it. The
/// latent actions it owns are then notified and removed on the next tick.
/// Links triggered by finished actions are recorded on the target they name.
///
/// [`Handle::destroy_target`]: crate::runtime::Handle::destroy_target
#[derive(Clone)]
pub struct Target(Arc<Inner>);

struct Inner {
    id: TargetId,
    name: String,
    valid: AtomicBool,
    triggered: Mutex<Vec<LatentLink>>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Target(Arc::new(Inner {
            id: TargetId::next(),
            name: name.into(),
            valid: AtomicBool::new(true),
            triggered: Mutex::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    /// Links triggered on this target so far, oldest first.
    pub fn triggered_links(&self) -> Vec<LatentLink> {
        self.0.triggered.lock().clone()
    }

    pub(crate) fn invalidate(&self) {
        self.0.valid.store(false, Ordering::Release);
    }

    pub(crate) fn record_link(&self, link: LatentLink) {
        tracing::debug!(
            target_id = %self.0.id,
            target_name = %self.0.name,
            function = %link.execution_function,
            linkage = link.linkage,
            "latent link triggered"
        );
        self.0.triggered.lock().push(link);
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Target: Send, Sync, Clone);

    #[test]
    fn test_target_lifecycle() {
        let target = Target::new("actor");
        let other = Target::new("actor");
        assert_ne!(target, other);
        assert_eq!(target.clone(), target);

        assert!(target.is_valid());
        target.record_link(LatentLink::new("OnDone", 3));
        assert_eq!(target.triggered_links(), vec![LatentLink::new("OnDone", 3)]);

        target.invalidate();
        assert!(!target.is_valid());
    }
}
