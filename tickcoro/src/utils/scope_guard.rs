/// A guard that runs a closure when it goes out of scope, including during
/// unwinding, unless it was disarmed first.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // `Option` so the closure runs at most once, whichever of `drop` or
    // `disarm` comes first.
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.closure.take();
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_guard_runs_on_drop() {
        let ran = Cell::new(false);
        {
            let _guard = ScopeGuard::new(|| ran.set(true));
            assert!(!ran.get());
        }
        assert!(ran.get());
    }

    #[test]
    fn test_disarmed_guard_does_nothing() {
        let ran = Cell::new(false);
        {
            let mut guard = ScopeGuard::new(|| ran.set(true));
            guard.disarm();
        }
        assert!(!ran.get());
    }
}
