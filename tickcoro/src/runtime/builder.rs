use crate::runtime::World;
use anyhow::{Result, anyhow, ensure};
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Sleep between two ticks when the world drives itself (`block_on`,
/// `run_until`).
const TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Smallest stack we accept for worker threads.
const MIN_WORKER_STACK: usize = 64 * 1024;

/// Produces the name of each new worker thread.
#[derive(Clone)]
pub(crate) struct WorkerNamer(Arc<dyn Fn() -> String + Send + Sync + 'static>);

impl WorkerNamer {
    fn numbered(prefix: &'static str) -> Self {
        let spawned = AtomicUsize::new(0);
        WorkerNamer(Arc::new(move || {
            format!("{prefix}-{}", spawned.fetch_add(1, Ordering::Relaxed))
        }))
    }

    fn fixed(name: String) -> Self {
        WorkerNamer(Arc::new(move || name.clone()))
    }

    pub(crate) fn next_name(&self) -> String {
        (self.0)()
    }
}

impl Default for WorkerNamer {
    fn default() -> Self {
        WorkerNamer::numbered("tickcoro-worker")
    }
}

impl fmt::Debug for WorkerNamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorkerNamer(..)")
    }
}

/// Builds a [`World`] bound to the calling thread, which becomes its main
/// thread.
///
/// ```ignore
/// let world = Builder::new()
///     .thread_name("physics")
///     .tick_interval(Duration::ZERO)
///     .try_build()?;
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    cfg: WorldConfig,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Gives every worker thread the same name. Workers are called
    /// "tickcoro-worker-{N}" otherwise.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.worker_namer = WorkerNamer::fixed(name.into());
        self
    }

    /// Names worker threads with the result of `f`, called once per worker.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.cfg.worker_namer = WorkerNamer(Arc::new(f));
        self
    }

    /// Stack size of worker threads, in bytes. The platform may round it up.
    #[track_caller]
    pub fn thread_stack_size(mut self, bytes: usize) -> Self {
        assert!(
            bytes.is_power_of_two(),
            "worker stack size must be a power of two, got {bytes}"
        );
        self.cfg.worker_stack = Some(bytes);
        self
    }

    /// Sets how long the world sleeps between two ticks when it drives
    /// itself. Zero spins.
    pub fn tick_interval(mut self, val: Duration) -> Self {
        self.cfg.tick_interval = val;
        self
    }

    /// Creates the configured `World` on the calling thread.
    ///
    /// Fails if another world is already active on this thread.
    pub fn try_build(self) -> Result<World> {
        self.cfg.validate()?;
        claim_world_slot()?;
        Ok(World::new(self.cfg))
    }
}

thread_local! {
    // At most one world per thread.
    static WORLD_SLOT_TAKEN: Cell<bool> = const { Cell::new(false) };
}

fn claim_world_slot() -> Result<()> {
    WORLD_SLOT_TAKEN.with(|taken| {
        if taken.replace(true) {
            return Err(anyhow!(
                "Cannot create a new World: a world is already active on this thread."
            ));
        }
        Ok(())
    })
}

pub(crate) fn release_world_slot() {
    WORLD_SLOT_TAKEN.with(|taken| taken.set(false));
}

#[derive(Debug, Clone)]
pub(crate) struct WorldConfig {
    pub(crate) worker_namer: WorkerNamer,
    pub(crate) worker_stack: Option<usize>,
    pub(crate) tick_interval: Duration,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            worker_namer: WorkerNamer::default(),
            worker_stack: None,
            tick_interval: TICK_INTERVAL,
        }
    }
}

impl WorldConfig {
    fn validate(&self) -> Result<()> {
        if let Some(bytes) = self.worker_stack {
            ensure!(
                bytes >= MIN_WORKER_STACK,
                "worker stack of {bytes} bytes is below the minimum of {MIN_WORKER_STACK} bytes"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    // Worker threads receive a clone of the config.
    assert_impl_all!(WorldConfig: Send, Sync, Clone);

    #[test]
    fn test_default_worker_names_increase() {
        let cfg = WorldConfig::default();
        assert_eq!(cfg.worker_namer.next_name(), "tickcoro-worker-0");
        assert_eq!(cfg.worker_namer.next_name(), "tickcoro-worker-1");
    }

    #[test]
    fn test_fixed_worker_name() {
        let builder = Builder::new().thread_name("render");
        assert_eq!(builder.cfg.worker_namer.next_name(), "render");
        assert_eq!(builder.cfg.worker_namer.next_name(), "render");
    }

    #[test]
    fn test_stack_size_too_small() {
        let builder = Builder::new().thread_stack_size(4096);
        assert!(builder.cfg.validate().is_err());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_stack_size_power_of_two() {
        let _ = Builder::new().thread_stack_size(100_000);
    }
}
