pub(crate) mod event;
pub(crate) use event::Event;

pub(crate) mod main_thread;
pub(crate) use main_thread::MainThreadCell;

pub(crate) mod panic;
pub(crate) use panic::{PanicPayload, panic_payload_as_str};

pub(crate) mod scope_guard;
pub(crate) use scope_guard::ScopeGuard;
