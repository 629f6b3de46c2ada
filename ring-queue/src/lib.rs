//! A thread-safe FIFO queue backed by a circular buffer which grows and
//! shrinks with its load.
//!
//! ```
//! use ring_queue::{EmptyQueue, RingQueue};
//!
//! let queue = RingQueue::new();
//! queue.enqueue("ping");
//! queue.enqueue("pong");
//! assert_eq!(queue.peek(), Ok("ping"));
//! assert_eq!(queue.dequeue(), Ok("ping"));
//! assert_eq!(queue.dequeue(), Ok("pong"));
//! assert_eq!(queue.dequeue(), Err(EmptyQueue));
//! ```

mod error;
pub use error::EmptyQueue;

mod queue;
pub use queue::{MIN_CAPACITY, RingQueue};
