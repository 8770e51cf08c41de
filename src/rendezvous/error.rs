//! Rendezvous channel error types.

use crate::cancel::Cancelled;
use std::fmt;

/// Error returned by [`send`] and [`send_until`].
///
/// A send fails only if the value could never be delivered. The value is
/// always handed back, so nothing sent on the channel is silently dropped.
///
/// [`send`]: crate::rendezvous::Sender::send
/// [`send_until`]: crate::rendezvous::Sender::send_until
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SendError<T> {
    /// The channel was closed, explicitly or because every [`Receiver`] was
    /// dropped, before a receiver took the value.
    ///
    /// [`Receiver`]: crate::rendezvous::Receiver
    Closed(T),
    /// The cancellation signal fired before a receiver took the value.
    Cancelled(T),
}

impl<T> SendError<T> {
    /// Consumes the error, returning the value that was not delivered.
    pub fn into_inner(self) -> T {
        match self {
            SendError::Closed(value) | SendError::Cancelled(value) => value,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SendError::Closed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SendError::Cancelled(_))
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => "sending on a closed channel".fmt(fmt),
            SendError::Cancelled(_) => "send cancelled".fmt(fmt),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

/// Error returned by [`recv`] and [`recv_until`].
///
/// [`recv`]: crate::rendezvous::Receiver::recv
/// [`recv_until`]: crate::rendezvous::Receiver::recv_until
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum RecvError {
    /// The channel was closed, explicitly or because every [`Sender`] was
    /// dropped. No value will ever arrive.
    ///
    /// [`Sender`]: crate::rendezvous::Sender
    Closed,
    /// The cancellation signal fired before a sender showed up.
    Cancelled,
}

impl From<Cancelled> for RecvError {
    fn from(_: Cancelled) -> Self {
        RecvError::Cancelled
    }
}

impl fmt::Display for RecvError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Closed => "receiving on a closed channel".fmt(fmt),
            RecvError::Cancelled => "receive cancelled".fmt(fmt),
        }
    }
}

impl std::error::Error for RecvError {}

/// Error returned by [`try_recv`].
///
/// [`try_recv`]: crate::rendezvous::Receiver::try_recv
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TryRecvError {
    /// No sender is currently parked on the channel, but the channel is still
    /// open, so one may yet arrive.
    Empty,
    /// The channel is closed.
    Closed,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => "no sender waiting on the channel".fmt(fmt),
            TryRecvError::Closed => "receiving on a closed channel".fmt(fmt),
        }
    }
}

impl std::error::Error for TryRecvError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_hands_value_back() {
        let err = SendError::Closed(String::from("payload"));
        assert!(err.is_closed());
        assert!(!err.is_cancelled());
        assert_eq!(err.to_string(), "sending on a closed channel");
        assert_eq!(err.into_inner(), "payload");

        let err = SendError::Cancelled(3);
        assert!(err.is_cancelled());
        assert_eq!(err.into_inner(), 3);
    }

    #[test]
    fn cancelled_converts_to_recv_error() {
        assert_eq!(RecvError::from(Cancelled(())), RecvError::Cancelled);
    }
}
