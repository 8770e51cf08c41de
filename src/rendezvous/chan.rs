use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    mem,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use super::error::{RecvError, SendError, TryRecvError};
use crate::wake_list::WakeList;

/// State shared by every handle of one rendezvous channel.
pub(crate) struct Chan<T> {
    state: RefCell<State<T>>,
}

struct State<T> {
    /// Senders parked with a value, served FIFO.
    offers: VecDeque<Rc<Offer<T>>>,
    /// Receivers parked with no sender to pair with.
    parked: VecDeque<Rc<Parked>>,
    closed: bool,
    tx_count: usize,
    rx_count: usize,
}

/// A value a sender has put up for hand-off.
///
/// The value leaves the offer only inside the receive that returns it, or
/// when the sender withdraws it.
pub(crate) struct Offer<T> {
    value: RefCell<Option<T>>,
    waker: Cell<Option<Waker>>,
}

/// A receiver waiting for a sender.
pub(crate) struct Parked {
    waker: Cell<Option<Waker>>,
    /// Set when a sender dequeued this receiver to hand it a value.
    notified: Cell<bool>,
}

/// Progress of one send operation.
pub(crate) enum SendState<T> {
    /// The value has not been offered yet.
    Start(T),
    /// The value sits in the offer queue.
    Offered(Rc<Offer<T>>),
    /// Nothing in flight.
    Idle,
}

/// Progress of one receive operation.
pub(crate) enum RecvState {
    Start,
    Parked(Rc<Parked>),
    Idle,
}

impl<T> Offer<T> {
    fn is_taken(&self) -> bool {
        self.value.borrow().is_none()
    }
}

impl<T> State<T> {
    fn is_closed(&self) -> bool {
        self.closed || self.tx_count == 0 || self.rx_count == 0
    }

    fn remove_offer(&mut self, offer: &Rc<Offer<T>>) {
        self.offers.retain(|o| !Rc::ptr_eq(o, offer));
    }

    fn remove_parked(&mut self, parked: &Rc<Parked>) {
        self.parked.retain(|p| !Rc::ptr_eq(p, parked));
    }

    /// Dequeues the oldest parked receiver and returns its waker.
    fn notify_one(&mut self) -> Option<Waker> {
        let parked = self.parked.pop_front()?;
        parked.notified.set(true);
        parked.waker.take()
    }

    /// Collects every parked waker on both sides.
    fn drain_wakers(&mut self, wakers: &mut WakeList) {
        wakers.extend(self.offers.iter().filter_map(|o| o.waker.take()));
        for parked in self.parked.drain(..) {
            parked.notified.set(true);
            if let Some(waker) = parked.waker.take() {
                wakers.push(waker);
            }
        }
    }
}

impl<T> Chan<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: RefCell::new(State {
                offers: VecDeque::new(),
                parked: VecDeque::new(),
                closed: false,
                tx_count: 0,
                rx_count: 0,
            }),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.borrow().is_closed()
    }

    pub(crate) fn tx_count(&self) -> usize {
        self.state.borrow().tx_count
    }

    pub(crate) fn rx_count(&self) -> usize {
        self.state.borrow().rx_count
    }

    pub(crate) fn inc_tx(&self) {
        self.state.borrow_mut().tx_count += 1;
    }

    pub(crate) fn inc_rx(&self) {
        self.state.borrow_mut().rx_count += 1;
    }

    pub(crate) fn dec_tx(&self) {
        let last = {
            let mut state = self.state.borrow_mut();
            state.tx_count -= 1;
            state.tx_count == 0
        };
        if last {
            log::debug!("last sender dropped, closing rendezvous channel");
            self.wake_all();
        }
    }

    pub(crate) fn dec_rx(&self) {
        let last = {
            let mut state = self.state.borrow_mut();
            state.rx_count -= 1;
            state.rx_count == 0
        };
        if last {
            log::debug!("last receiver dropped, closing rendezvous channel");
            self.wake_all();
        }
    }

    /// Closes the channel and wakes every parked task.
    pub(crate) fn close(&self) {
        let already = mem::replace(&mut self.state.borrow_mut().closed, true);
        if !already {
            log::debug!("rendezvous channel closed");
        }
        self.wake_all();
    }

    fn wake_all(&self) {
        let mut wakers = WakeList::new();
        self.state.borrow_mut().drain_wakers(&mut wakers);
        log::trace!("waking {} parked tasks", wakers.len());
        wakers.wake_all();
    }

    pub(crate) fn poll_send(
        &self,
        send: &mut SendState<T>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), SendError<T>>> {
        match mem::replace(send, SendState::Idle) {
            SendState::Start(value) => {
                let mut state = self.state.borrow_mut();
                if state.is_closed() {
                    return Poll::Ready(Err(SendError::Closed(value)));
                }
                let offer = Rc::new(Offer {
                    value: RefCell::new(Some(value)),
                    waker: Cell::new(Some(cx.waker().clone())),
                });
                state.offers.push_back(offer.clone());
                let receiver = state.notify_one();
                drop(state);

                log::trace!("value offered, waiting for a receiver");
                if let Some(waker) = receiver {
                    waker.wake();
                }
                *send = SendState::Offered(offer);
                Poll::Pending
            }
            SendState::Offered(offer) => {
                if offer.is_taken() {
                    return Poll::Ready(Ok(()));
                }
                let mut state = self.state.borrow_mut();
                if state.is_closed() {
                    state.remove_offer(&offer);
                    drop(state);
                    let value = offer.value.borrow_mut().take();
                    return Poll::Ready(match value {
                        Some(value) => Err(SendError::Closed(value)),
                        None => Ok(()),
                    });
                }
                offer.waker.set(Some(cx.waker().clone()));
                *send = SendState::Offered(offer);
                Poll::Pending
            }
            SendState::Idle => panic!("send polled after completion"),
        }
    }

    /// Pulls a send out of the channel, returning its value if no receiver
    /// has taken it yet.
    pub(crate) fn withdraw_send(&self, send: &mut SendState<T>) -> Option<T> {
        match mem::replace(send, SendState::Idle) {
            SendState::Start(value) => Some(value),
            SendState::Offered(offer) => {
                if offer.is_taken() {
                    return None;
                }
                self.state.borrow_mut().remove_offer(&offer);
                let value = offer.value.borrow_mut().take();
                value
            }
            SendState::Idle => None,
        }
    }

    /// Takes the oldest offer along with its sender's waker.
    fn take_offer(state: &mut State<T>) -> Option<(T, Option<Waker>)> {
        let offer = state.offers.pop_front()?;
        let value = offer
            .value
            .borrow_mut()
            .take()
            .expect("queued offer without a value");
        Some((value, offer.waker.take()))
    }

    pub(crate) fn poll_recv(
        &self,
        recv: &mut RecvState,
        cx: &mut Context<'_>,
    ) -> Poll<Result<T, RecvError>> {
        let mut state = self.state.borrow_mut();
        let current = mem::replace(recv, RecvState::Idle);

        if state.is_closed() {
            if let RecvState::Parked(parked) = &current {
                state.remove_parked(parked);
            }
            return Poll::Ready(Err(RecvError::Closed));
        }

        if let Some((value, sender)) = Self::take_offer(&mut state) {
            if let RecvState::Parked(parked) = &current {
                if !parked.notified.get() {
                    state.remove_parked(parked);
                }
            }
            drop(state);

            log::trace!("rendezvous complete");
            if let Some(waker) = sender {
                waker.wake();
            }
            return Poll::Ready(Ok(value));
        }

        match current {
            RecvState::Parked(parked) if !parked.notified.get() => {
                parked.waker.set(Some(cx.waker().clone()));
                *recv = RecvState::Parked(parked);
            }
            RecvState::Parked(parked) => {
                // Notified, but another receiver got to the offer first.
                parked.notified.set(false);
                parked.waker.set(Some(cx.waker().clone()));
                state.parked.push_front(parked.clone());
                *recv = RecvState::Parked(parked);
            }
            RecvState::Start | RecvState::Idle => {
                let parked = Rc::new(Parked {
                    waker: Cell::new(Some(cx.waker().clone())),
                    notified: Cell::new(false),
                });
                state.parked.push_back(parked.clone());
                log::trace!("receiver parked, {} waiting", state.parked.len());
                *recv = RecvState::Parked(parked);
            }
        }
        Poll::Pending
    }

    /// Removes an unfinished receive from the channel.
    ///
    /// A receiver that was notified but never took its value passes the
    /// notification on, so the offer that woke it still finds a taker.
    pub(crate) fn withdraw_recv(&self, recv: &mut RecvState) {
        if let RecvState::Parked(parked) = mem::replace(recv, RecvState::Idle) {
            let mut state = self.state.borrow_mut();
            if !parked.notified.get() {
                state.remove_parked(&parked);
                return;
            }
            let next = if state.offers.is_empty() {
                None
            } else {
                state.notify_one()
            };
            drop(state);
            if let Some(waker) = next {
                waker.wake();
            }
        }
    }

    pub(crate) fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.state.borrow_mut();
        if state.is_closed() {
            return Err(TryRecvError::Closed);
        }
        let (value, sender) = Self::take_offer(&mut state).ok_or(TryRecvError::Empty)?;
        drop(state);
        if let Some(waker) = sender {
            waker.wake();
        }
        Ok(value)
    }
}
