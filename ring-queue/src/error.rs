use std::fmt;

/// Returned by [`RingQueue::dequeue`](crate::RingQueue::dequeue) and the peek
/// family when the queue holds no elements.
///
/// The queue stays usable after this error, so callers are expected to back
/// off and poll again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EmptyQueue;

impl fmt::Display for EmptyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("empty queue")
    }
}

impl std::error::Error for EmptyQueue {}
