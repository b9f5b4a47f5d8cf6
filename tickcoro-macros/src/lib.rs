#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

//! Entry-point macros for tickcoro.

mod entry;
mod parse;

/// Runs an async `main` as the root coroutine of a new `World`.
///
/// The calling thread becomes the world's main thread and keeps ticking until
/// the body finishes. A panic in the body is resumed on the main thread.
///
/// # Options
///
/// * `tick_interval_ms = N`: pause between ticks, 1ms by default.
/// * `thread_name = "name"`: name of the worker threads.
///
/// ```ignore
/// #[tickcoro::main(tick_interval_ms = 16)]
/// async fn main() {
///     tickcoro::move_to_worker().await;
///     println!("hello from a worker");
/// }
/// ```
///
/// Equivalent code without the macro:
///
/// ```ignore
/// fn main() {
///     tickcoro::runtime::Builder::new()
///         .tick_interval(std::time::Duration::from_millis(16))
///         .try_build()
///         .unwrap()
///         .block_on(async {
///             tickcoro::move_to_worker().await;
///             println!("hello from a worker");
///         })
/// }
/// ```
#[proc_macro_attribute]
pub fn main(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::main(args.into(), item.into()).into()
}

/// Runs an async test as the root coroutine of its own `World`.
///
/// Same options as [`macro@main`], except the tick interval defaults to zero.
/// The body must be `Send` and `'static`, since it may hop threads.
///
/// ```ignore
/// #[tickcoro::test]
/// async fn hops() -> anyhow::Result<()> {
///     tickcoro::move_to_worker().await;
///     assert!(!tickcoro::Handle::current().is_main_thread());
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn test(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    entry::test(args.into(), item.into()).into()
}
