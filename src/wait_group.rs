//! A counting barrier for local tasks.
//!
//! A [`WaitGroup`] waits for a known number of tasks to finish. The
//! initiator calls [`add`] with the number of tasks it is about to spawn,
//! each task calls [`done`] once when it finishes, and [`wait`] resolves once
//! the counter is back at zero.
//!
//! Call `add` before spawning the tasks it accounts for. Otherwise `wait` may
//! observe a zero counter before the tasks had a chance to register.
//!
//! # Examples
//!
//! ```
//! use local_rendezvous::WaitGroup;
//!
//! #[monoio::main]
//! async fn main() {
//!     let wg = WaitGroup::new();
//!
//!     wg.add(2);
//!     for _ in 0..2 {
//!         let wg = wg.clone();
//!         monoio::spawn(async move {
//!             wg.done().unwrap();
//!         });
//!     }
//!
//!     wg.wait().await;
//!     assert_eq!(wg.count(), 0);
//! }
//! ```
//!
//! [`add`]: WaitGroup::add
//! [`done`]: WaitGroup::done
//! [`wait`]: WaitGroup::wait

use crate::cancel::{self, Cancelled};
use crate::wake_list::WakeList;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Error returned by [`WaitGroup::done`] when the counter is already zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegativeCounterError(());

impl fmt::Display for NegativeCounterError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "wait group counter would become negative")
    }
}

impl std::error::Error for NegativeCounterError {}

/// Counts outstanding tasks and lets other tasks wait for the count to reach
/// zero. Clones share the same counter.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Rc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: Cell<usize>,
    /// Bumped every time `count` drops to zero.
    generation: Cell<u64>,
    waiters: RefCell<Vec<Rc<Waiter>>>,
}

/// A parked [`Wait`], owned jointly by the future and the wait list.
struct Waiter {
    waker: Cell<Option<Waker>>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to the counter.
    ///
    /// # Panics
    ///
    /// Panics if the counter would overflow.
    pub fn add(&self, n: usize) {
        let count = self.inner.count.get();
        assert!(
            n <= usize::MAX - count,
            "wait group counter overflow ({} + {})",
            count,
            n
        );
        self.inner.count.set(count + n);
        log::trace!("wait group add {}, count {}", n, count + n);
    }

    /// Marks one task as finished.
    ///
    /// Fails with [`NegativeCounterError`] if there is no outstanding task
    /// left to account for. When the counter reaches zero every waiter is
    /// released.
    pub fn done(&self) -> Result<(), NegativeCounterError> {
        let count = self.inner.count.get();
        if count == 0 {
            log::debug!("wait group done called with a zero counter");
            return Err(NegativeCounterError(()));
        }
        self.inner.count.set(count - 1);
        if count == 1 {
            self.inner.generation.set(self.inner.generation.get().wrapping_add(1));
            let mut wakers = WakeList::new();
            wakers.extend(
                self.inner
                    .waiters
                    .borrow_mut()
                    .drain(..)
                    .filter_map(|waiter| waiter.waker.take()),
            );
            log::trace!("wait group drained, releasing {} waiters", wakers.len());
            wakers.wake_all();
        }
        Ok(())
    }

    /// Returns the current counter value.
    pub fn count(&self) -> usize {
        self.inner.count.get()
    }

    /// Waits until the counter is zero. Resolves immediately if it already
    /// is.
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            inner: &self.inner,
            generation: None,
            node: None,
        }
    }

    /// Waits until the counter is zero unless `signal` resolves first.
    pub async fn wait_until<S>(&self, signal: S) -> Result<(), Cancelled>
    where
        S: Future,
    {
        cancel::until(self.wait(), signal).await
    }
}

impl fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitGroup")
            .field("count", &self.count())
            .finish()
    }
}

/// Future returned by [`WaitGroup::wait`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Wait<'a> {
    inner: &'a Inner,
    /// Generation seen on first poll. A later generation means the counter
    /// hit zero while this waiter was parked.
    generation: Option<u64>,
    /// Entry in the wait list while parked.
    node: Option<Rc<Waiter>>,
}

impl Wait<'_> {
    fn unlink(&mut self) {
        if let Some(node) = self.node.take() {
            self.inner
                .waiters
                .borrow_mut()
                .retain(|w| !Rc::ptr_eq(w, &node));
        }
    }
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let inner = self.inner;
        let seen = *self.generation.get_or_insert(inner.generation.get());
        if inner.count.get() == 0 || inner.generation.get() != seen {
            self.unlink();
            return Poll::Ready(());
        }

        if let Some(node) = &self.node {
            node.waker.set(Some(cx.waker().clone()));
            return Poll::Pending;
        }
        let node = Rc::new(Waiter {
            waker: Cell::new(Some(cx.waker().clone())),
        });
        inner.waiters.borrow_mut().push(node.clone());
        self.node = Some(node);
        Poll::Pending
    }
}

impl Drop for Wait<'_> {
    fn drop(&mut self) {
        // A dropped wait must not keep its task's waker in the list.
        self.unlink();
    }
}
