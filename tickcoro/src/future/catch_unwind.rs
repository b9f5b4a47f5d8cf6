use crate::utils::PanicPayload;
use pin_project::pin_project;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Turns a panic raised while polling `inner` into an `Err`.
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub(crate) struct CatchUnwind<F> {
    #[pin]
    inner: F,
}

impl<F: Future> CatchUnwind<F> {
    pub(crate) fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = Result<F::Output, PanicPayload>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.project().inner;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crate::utils::panic_payload_as_str;
    use anyhow::Result;

    #[test]
    fn test_catch_unwind_passes_output_through() -> Result<()> {
        let (waker, _) = mock_waker();
        let mut cx = Context::from_waker(&waker);

        let mut fut = Box::pin(CatchUnwind::new(async { 7 }));
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(7))));
        Ok(())
    }

    #[test]
    fn test_catch_unwind_captures_panic() -> Result<()> {
        let (waker, _) = mock_waker();
        let mut cx = Context::from_waker(&waker);

        let mut fut = Box::pin(CatchUnwind::new(async {
            panic!("boom");
        }));

        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(Err(payload)) => assert_eq!(panic_payload_as_str(&payload), "boom"),
            _ => panic!("expected captured panic"),
        }
        Ok(())
    }
}
