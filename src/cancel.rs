//! Racing a blocking operation against an external cancellation signal.
//!
//! A signal is any future: a oneshot receiver, a timer, a shutdown
//! notification. When it resolves before the operation does, the operation
//! future is dropped, which withdraws it from whatever wait queue it sat in.

use futures_util::future::poll_fn;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

/// Error returned when a wait was aborted by its cancellation signal.
///
/// See [`WaitGroup::wait_until`](crate::wait_group::WaitGroup::wait_until).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled(pub(crate) ());

impl fmt::Display for Cancelled {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Polls `fut` until it completes or `signal` resolves, whichever comes
/// first. `fut` is always polled before `signal`, so an operation that is
/// ready wins a tie.
pub(crate) async fn until<F, S>(mut fut: F, signal: S) -> Result<F::Output, Cancelled>
where
    F: Future + Unpin,
    S: Future,
{
    futures_util::pin_mut!(signal);
    poll_fn(|cx| {
        if let Poll::Ready(out) = Pin::new(&mut fut).poll(cx) {
            return Poll::Ready(Ok(out));
        }
        if signal.as_mut().poll(cx).is_ready() {
            log::debug!("operation cancelled by signal");
            return Poll::Ready(Err(Cancelled(())));
        }
        Poll::Pending
    })
    .await
}
