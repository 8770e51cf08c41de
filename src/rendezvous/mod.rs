//! An unbuffered, multi-producer, multi-consumer rendezvous channel.
//!
//! A rendezvous channel holds no buffer. A [`Sender::send`] parks the sending
//! task until some [`Receiver::recv`] takes the value, and a `recv` parks the
//! receiving task until some `send` offers one. The two operations complete
//! together: once `recv` has returned the value, the matching `send` resolves
//! with `Ok(())` and no other task can observe the value in between.
//!
//! Both halves are cloneable and all clones share one channel. Each value is
//! delivered to exactly one receiver. Pending sends queue up in the order
//! they were issued, so a second `send` never overwrites a value that is
//! still waiting for a taker.
//!
//! [`Sender`] and [`Receiver`] are non-thread-safe and must stay on the
//! thread that created them.
//!
//! # Closing
//!
//! The channel closes when [`Sender::close`] or [`Receiver::close`] is
//! called, when every `Sender` is dropped, or when every `Receiver` is
//! dropped. Parked senders then resolve with [`SendError::Closed`], which
//! carries the value back to the caller, and parked receivers resolve with
//! [`RecvError::Closed`].
//!
//! # Cancellation
//!
//! Dropping a pending `send` or `recv` future withdraws it from the channel.
//! [`Sender::send_until`] and [`Receiver::recv_until`] race the operation
//! against a signal future and report [`SendError::Cancelled`] or
//! [`RecvError::Cancelled`] when the signal wins.
//!
//! # Examples
//!
//! ```
//! use local_rendezvous::rendezvous;
//!
//! #[monoio::main]
//! async fn main() {
//!     let (tx, rx) = rendezvous::channel();
//!
//!     let consumer = monoio::spawn(async move { rx.recv().await.unwrap() });
//!     tx.send(42).await.unwrap();
//!
//!     assert_eq!(consumer.await, 42);
//! }
//! ```

mod chan;
pub mod error;

use chan::{Chan, RecvState, SendState};
use futures_core::{ready, Stream};
use futures_sink::Sink;
use futures_util::future::poll_fn;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

pub use error::{RecvError, SendError, TryRecvError};

/// Creates a rendezvous channel, returning the sending and receiving halves.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let chan = Rc::new(Chan::new());
    (Sender::new(chan.clone()), Receiver::new(chan))
}

/// Sending half of a rendezvous channel.
pub struct Sender<T> {
    chan: Rc<Chan<T>>,
    /// Value in flight through the [`Sink`] impl.
    sink: SendState<T>,
    /// Set once `poll_close` gave up this handle's place in the sender count.
    released: bool,
}

/// Receiving half of a rendezvous channel.
pub struct Receiver<T> {
    chan: Rc<Chan<T>>,
    /// Receive in flight through [`Receiver::poll_recv`].
    stream: RecvState,
}

// Values are moved in and out of the channel, never pinned.
impl<T> Unpin for Sender<T> {}

impl<T> Sender<T> {
    fn new(chan: Rc<Chan<T>>) -> Self {
        chan.inc_tx();
        Self {
            chan,
            sink: SendState::Idle,
            released: false,
        }
    }

    /// Sends `value`, waiting until a receiver takes it.
    ///
    /// Returns `Err(SendError::Closed(value))` if the channel is closed
    /// before the value was taken.
    ///
    /// # Examples
    ///
    /// ```
    /// use local_rendezvous::rendezvous;
    ///
    /// #[monoio::main]
    /// async fn main() {
    ///     let (tx, rx) = rendezvous::channel();
    ///
    ///     monoio::spawn(async move {
    ///         tx.send("first").await.unwrap();
    ///         tx.send("second").await.unwrap();
    ///     });
    ///
    ///     assert_eq!(rx.recv().await, Ok("first"));
    ///     assert_eq!(rx.recv().await, Ok("second"));
    /// }
    /// ```
    pub fn send(&self, value: T) -> SendFuture<'_, T> {
        SendFuture {
            chan: &self.chan,
            state: SendState::Start(value),
        }
    }

    /// Sends `value` unless `signal` resolves first.
    ///
    /// When the signal wins, the value is withdrawn from the channel and
    /// returned as `Err(SendError::Cancelled(value))`. If a receiver took the
    /// value in the same poll, the send counts as complete.
    pub async fn send_until<S>(&self, value: T, signal: S) -> Result<(), SendError<T>>
    where
        S: Future,
    {
        let mut send = self.send(value);
        futures_util::pin_mut!(signal);
        poll_fn(|cx| {
            if let Poll::Ready(res) = Pin::new(&mut send).poll(cx) {
                return Poll::Ready(res);
            }
            if signal.as_mut().poll(cx).is_ready() {
                log::debug!("send cancelled by signal");
                return Poll::Ready(match send.withdraw() {
                    Some(value) => Err(SendError::Cancelled(value)),
                    None => Ok(()),
                });
            }
            Poll::Pending
        })
        .await
    }

    /// Closes the channel for every sender and receiver.
    pub fn close(&self) {
        self.chan.close();
    }

    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Returns `true` if both senders belong to the same channel.
    pub fn same_channel(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.chan, &other.chan)
    }

    pub fn sender_count(&self) -> usize {
        self.chan.tx_count()
    }

    pub fn receiver_count(&self) -> usize {
        self.chan.rx_count()
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self::new(self.chan.clone())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        drop(self.chan.withdraw_send(&mut self.sink));
        if !self.released {
            self.chan.dec_tx();
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Sends through the channel one value at a time.
///
/// `poll_flush` resolves once a receiver took the value passed to
/// `start_send`. A value that was started but not flushed when the `Sender`
/// is dropped is discarded with it.
///
/// `poll_close` flushes and then releases this handle only. Other senders
/// keep working, and the channel closes once the last one is released or
/// dropped. `start_send` after `poll_close` fails with
/// [`SendError::Closed`].
impl<T> Sink<T> for Sender<T> {
    type Error = SendError<T>;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        match this.sink {
            SendState::Idle => Poll::Ready(Ok(())),
            _ => this.chan.poll_send(&mut this.sink, cx),
        }
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        let this = self.get_mut();
        assert!(
            matches!(this.sink, SendState::Idle),
            "start_send called without poll_ready"
        );
        if this.released || this.chan.is_closed() {
            return Err(SendError::Closed(item));
        }
        this.sink = SendState::Start(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.poll_ready(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        ready!(self.as_mut().poll_flush(cx))?;
        let this = self.get_mut();
        if !this.released {
            this.released = true;
            this.chan.dec_tx();
        }
        Poll::Ready(Ok(()))
    }
}

impl<T> Receiver<T> {
    fn new(chan: Rc<Chan<T>>) -> Self {
        chan.inc_rx();
        Self {
            chan,
            stream: RecvState::Idle,
        }
    }

    /// Receives a value, waiting until a sender offers one.
    ///
    /// Returns `Err(RecvError::Closed)` once the channel is closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use local_rendezvous::rendezvous::{self, RecvError};
    ///
    /// #[monoio::main]
    /// async fn main() {
    ///     let (tx, rx) = rendezvous::channel::<u32>();
    ///     drop(tx);
    ///
    ///     assert_eq!(rx.recv().await, Err(RecvError::Closed));
    /// }
    /// ```
    pub fn recv(&self) -> RecvFuture<'_, T> {
        RecvFuture {
            chan: &self.chan,
            state: RecvState::Start,
        }
    }

    /// Receives a value unless `signal` resolves first, in which case
    /// `Err(RecvError::Cancelled)` is returned and no value is consumed.
    pub async fn recv_until<S>(&self, signal: S) -> Result<T, RecvError>
    where
        S: Future,
    {
        crate::cancel::until(self.recv(), signal).await?
    }

    /// Takes a value from a sender that is already waiting, without parking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.chan.try_recv()
    }

    /// Polls for a value, keeping the wait registered on this handle between
    /// calls.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Result<T, RecvError>> {
        self.chan.poll_recv(&mut self.stream, cx)
    }

    /// Closes the channel for every sender and receiver.
    pub fn close(&self) {
        self.chan.close();
    }

    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Returns `true` if both receivers belong to the same channel.
    pub fn same_channel(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.chan, &other.chan)
    }

    pub fn sender_count(&self) -> usize {
        self.chan.tx_count()
    }

    pub fn receiver_count(&self) -> usize {
        self.chan.rx_count()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self::new(self.chan.clone())
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.chan.withdraw_recv(&mut self.stream);
        self.chan.dec_rx();
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> Stream for Receiver<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match ready!(self.poll_recv(cx)) {
            Ok(value) => Poll::Ready(Some(value)),
            Err(_) => Poll::Ready(None),
        }
    }
}

/// Future returned by [`Sender::send`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SendFuture<'a, T> {
    chan: &'a Chan<T>,
    state: SendState<T>,
}

impl<T> Unpin for SendFuture<'_, T> {}

impl<T> SendFuture<'_, T> {
    /// Withdraws the value, returning it if no receiver has taken it.
    fn withdraw(&mut self) -> Option<T> {
        self.chan.withdraw_send(&mut self.state)
    }
}

impl<T> Future for SendFuture<'_, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.chan.poll_send(&mut this.state, cx)
    }
}

impl<T> Drop for SendFuture<'_, T> {
    fn drop(&mut self) {
        drop(self.withdraw());
    }
}

/// Future returned by [`Receiver::recv`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct RecvFuture<'a, T> {
    chan: &'a Chan<T>,
    state: RecvState,
}

impl<T> Future for RecvFuture<'_, T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.chan.poll_recv(&mut this.state, cx)
    }
}

impl<T> Drop for RecvFuture<'_, T> {
    fn drop(&mut self) {
        self.chan.withdraw_recv(&mut self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::{channel, RecvError, SendError, TryRecvError};
    use futures_util::future::{pending, ready};
    use futures_util::task::noop_waker_ref;
    use futures_util::{FutureExt, SinkExt, StreamExt};
    use std::cell::Cell;
    use std::future::Future;
    use std::pin::Pin;
    use std::rc::Rc;
    use std::task::{Context, Poll};

    #[monoio::test]
    async fn receiver_observes_sent_value() {
        let (tx, rx) = channel();
        let sender = monoio::spawn(async move { tx.send(42).await });
        let receiver = monoio::spawn(async move { rx.recv().await });

        assert_eq!(receiver.await, Ok(42));
        assert_eq!(sender.await, Ok(()));
    }

    #[monoio::test]
    async fn issue_order_does_not_matter() {
        // receiver first
        let (tx, rx) = channel();
        let receiver = monoio::spawn(async move { rx.recv().await });
        tx.send("late sender").await.unwrap();
        assert_eq!(receiver.await, Ok("late sender"));

        // sender first
        let (tx, rx) = channel();
        let sender = monoio::spawn(async move { tx.send("early sender").await });
        assert_eq!(rx.recv().await, Ok("early sender"));
        assert_eq!(sender.await, Ok(()));
    }

    #[test]
    fn send_blocks_until_received() {
        let (tx, rx) = channel();
        let mut cx = Context::from_waker(noop_waker_ref());

        let mut send = tx.send(7);
        assert!(Pin::new(&mut send).poll(&mut cx).is_pending());
        assert!(Pin::new(&mut send).poll(&mut cx).is_pending());

        assert_eq!(rx.try_recv(), Ok(7));
        assert_eq!(Pin::new(&mut send).poll(&mut cx), Poll::Ready(Ok(())));
    }

    #[test]
    fn recv_blocks_until_sent() {
        let (tx, rx) = channel();
        let mut cx = Context::from_waker(noop_waker_ref());

        let mut recv = rx.recv();
        assert!(Pin::new(&mut recv).poll(&mut cx).is_pending());

        let mut send = tx.send(3);
        assert!(Pin::new(&mut send).poll(&mut cx).is_pending());
        assert_eq!(Pin::new(&mut recv).poll(&mut cx), Poll::Ready(Ok(3)));
        assert_eq!(Pin::new(&mut send).poll(&mut cx), Poll::Ready(Ok(())));
    }

    #[monoio::test]
    async fn each_value_delivered_once() {
        let (tx, rx) = channel();
        let seen = Rc::new(Cell::new(0));

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let rx = rx.clone();
            let seen = seen.clone();
            receivers.push(monoio::spawn(async move {
                if let Ok(value) = rx.recv().await {
                    assert_eq!(value, 1);
                    seen.set(seen.get() + 1);
                }
            }));
        }

        tx.send(1).await.unwrap();
        drop(tx);
        for handle in receivers {
            handle.await;
        }
        assert_eq!(seen.get(), 1);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[monoio::test]
    async fn second_send_does_not_overwrite_first() {
        let (tx, rx) = channel();
        let tx2 = tx.clone();
        let first = monoio::spawn(async move { tx.send(1).await });
        let second = monoio::spawn(async move { tx2.send(2).await });

        assert_eq!(rx.recv().await, Ok(1));
        assert_eq!(rx.recv().await, Ok(2));
        assert_eq!(first.await, Ok(()));
        assert_eq!(second.await, Ok(()));
    }

    #[monoio::test]
    async fn close_hands_value_back() {
        let (tx, rx) = channel();
        let tx2 = tx.clone();
        let sender = monoio::spawn(async move { tx2.send(String::from("kept")).await });

        // let the sender park
        monoio::spawn(async {}).await;
        rx.close();

        assert_eq!(sender.await, Err(SendError::Closed(String::from("kept"))));
        assert!(tx.is_closed());
        assert_eq!(
            tx.send(String::from("late")).await,
            Err(SendError::Closed(String::from("late")))
        );
        assert_eq!(rx.recv().await, Err(RecvError::Closed));
    }

    #[monoio::test]
    async fn dropping_all_receivers_closes() {
        let (tx, rx) = channel::<u8>();
        assert_eq!(tx.receiver_count(), 1);
        drop(rx);
        assert_eq!(tx.receiver_count(), 0);
        assert_eq!(tx.send(1).await, Err(SendError::Closed(1)));
    }

    #[test]
    fn dropped_send_is_withdrawn() {
        let (tx, rx) = channel();
        let mut cx = Context::from_waker(noop_waker_ref());

        let mut send = tx.send(11);
        assert!(Pin::new(&mut send).poll(&mut cx).is_pending());
        drop(send);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[monoio::test]
    async fn send_until_returns_value_on_cancel() {
        let (tx, rx) = channel();
        assert_eq!(
            tx.send_until(5, ready(())).await,
            Err(SendError::Cancelled(5))
        );
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[monoio::test]
    async fn recv_until_cancels_and_completes() {
        let (tx, rx) = channel::<u8>();
        assert_eq!(rx.recv_until(ready(())).await, Err(RecvError::Cancelled));

        let sender = monoio::spawn(async move { tx.send(8).await });
        assert_eq!(rx.recv_until(pending::<()>()).await, Ok(8));
        assert_eq!(sender.await, Ok(()));
    }

    #[monoio::test]
    async fn sink_and_stream() {
        let (mut tx, mut rx) = channel();
        let producer = monoio::spawn(async move {
            for i in 0..3 {
                SinkExt::send(&mut tx, i).await.unwrap();
            }
            SinkExt::close(&mut tx).await.unwrap();
        });

        let mut got = Vec::new();
        while let Some(value) = rx.next().await {
            got.push(value);
        }
        producer.await;
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[monoio::test]
    async fn sink_close_releases_only_its_handle() {
        let (mut tx, rx) = channel();
        let sibling = tx.clone();
        assert_eq!(tx.sender_count(), 2);

        SinkExt::close(&mut tx).await.unwrap();
        assert_eq!(sibling.sender_count(), 1);
        assert!(!sibling.is_closed());
        assert_eq!(
            SinkExt::send(&mut tx, 1).await,
            Err(SendError::Closed(1))
        );

        let sender = monoio::spawn(async move { sibling.send(2).await });
        assert_eq!(rx.recv().await, Ok(2));
        assert_eq!(sender.await, Ok(()));

        // the released handle does not count twice on drop
        drop(tx);
        assert_eq!(rx.sender_count(), 0);
        assert_eq!(rx.recv().await, Err(RecvError::Closed));
    }

    #[test]
    fn try_recv_on_empty_channel() {
        let (tx, rx) = channel::<()>();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert!(tx.send(()).now_or_never().is_none());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn handles_share_one_channel() {
        let (tx, rx) = channel::<()>();
        let tx2 = tx.clone();
        let rx2 = rx.clone();
        assert!(tx.same_channel(&tx2));
        assert!(rx.same_channel(&rx2));
        assert_eq!(tx.sender_count(), 2);
        assert_eq!(rx.receiver_count(), 2);

        let (other, _rx) = channel::<()>();
        assert!(!tx.same_channel(&other));
    }
}
