//! Non-threadsafe synchronization primitives for tasks sharing one thread.

// shared basic data structure
mod wake_list;
mod cancel;
pub use cancel::Cancelled;

// unbuffered hand-off channel
pub mod rendezvous;

// wait group
pub mod wait_group;
pub use wait_group::{NegativeCounterError, WaitGroup};
