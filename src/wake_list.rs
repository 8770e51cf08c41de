use std::task::Waker;

/// Wakers collected while shared state is borrowed, woken after the borrow
/// is released.
///
/// A waker that polls inline must never observe a live `RefCell` borrow.
pub(crate) struct WakeList {
    inner: Vec<Waker>,
}

impl WakeList {
    pub(crate) fn new() -> Self {
        Self { inner: Vec::new() }
    }

    pub(crate) fn push(&mut self, val: Waker) {
        self.inner.push(val);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn wake_all(&mut self) {
        for waker in self.inner.drain(..) {
            waker.wake();
        }
    }
}

impl Extend<Waker> for WakeList {
    fn extend<I: IntoIterator<Item = Waker>>(&mut self, iter: I) {
        self.inner.extend(iter);
    }
}

impl Drop for WakeList {
    fn drop(&mut self) {
        self.wake_all();
    }
}
