use crate::runtime::{Builder, World};
use anyhow::Result;
use std::time::Duration;

/// World with no pause between ticks.
pub(crate) fn init_world() -> Result<World> {
    init_world_with(Builder::new())
}

pub(crate) fn init_world_with(builder: Builder) -> Result<World> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    builder.tick_interval(Duration::ZERO).try_build()
}
