use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::thread::{self, ThreadId};

/// Interior-mutable slot that may only be touched from a single owning
/// thread, the world's main thread.
///
/// Frame-tracked coroutines keep a few pieces of state (the link to their
/// pending latent action, the current latent awaiter, the exit reason) that are
/// only ever read and written on the main thread. Those accesses happen from
/// code that is reachable from any thread, so the containers need to be
/// `Sync`, but taking a lock would hide protocol bugs instead of exposing them.
/// Every access asserts it runs on the owner thread.
pub(crate) struct MainThreadCell<T> {
    owner: ThreadId,
    value: RefCell<T>,
}

impl<T> MainThreadCell<T> {
    pub(crate) fn new(owner: ThreadId, value: T) -> Self {
        Self {
            owner,
            value: RefCell::new(value),
        }
    }

    #[track_caller]
    fn assert_owner(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "main-thread state accessed from another thread"
        );
    }

    #[track_caller]
    pub(crate) fn borrow(&self) -> Ref<'_, T> {
        self.assert_owner();
        self.value.borrow()
    }

    #[track_caller]
    pub(crate) fn borrow_mut(&self) -> RefMut<'_, T> {
        self.assert_owner();
        self.value.borrow_mut()
    }

    #[track_caller]
    pub(crate) fn replace(&self, value: T) -> T {
        self.assert_owner();
        self.value.replace(value)
    }
}

impl<T: Default> MainThreadCell<T> {
    #[track_caller]
    pub(crate) fn take(&self) -> T {
        self.replace(T::default())
    }
}

impl<T: Clone> MainThreadCell<T> {
    #[track_caller]
    pub(crate) fn get(&self) -> T {
        self.borrow().clone()
    }
}

impl<T> fmt::Debug for MainThreadCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainThreadCell")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

// Safety: every access goes through `assert_owner`, so the inner `RefCell` is
// only ever touched from one thread. Values may still be dropped elsewhere
// when the last owner of the cell lives on another thread, hence `T: Send`.
unsafe impl<T: Send> Send for MainThreadCell<T> {}
unsafe impl<T: Send> Sync for MainThreadCell<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use static_assertions::assert_impl_all;
    use std::sync::Arc;

    assert_impl_all!(MainThreadCell<Option<Arc<u32>>>: Send, Sync);

    #[test]
    fn test_owner_thread_access() -> Result<()> {
        let cell = MainThreadCell::new(thread::current().id(), Some(7));

        assert_eq!(cell.get(), Some(7));
        assert_eq!(cell.take(), Some(7));
        assert_eq!(cell.get(), None);

        *cell.borrow_mut() = Some(3);
        assert_eq!(cell.replace(None), Some(3));
        Ok(())
    }

    #[test]
    fn test_foreign_thread_access_panics() {
        let cell = Arc::new(MainThreadCell::new(thread::current().id(), 1u32));
        let res = thread::spawn({
            let cell = Arc::clone(&cell);
            move || {
                let _ = cell.get();
            }
        })
        .join();

        assert!(res.is_err());
    }
}
