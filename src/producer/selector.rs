//! Queue selection for orderly sends.
//!
//! A selector maps `(queue count, message, argument)` to a queue index in
//! `[0, queue count)`. Messages that must stay in order are sent with the
//! same argument (an order id, an account id) and a selector that maps equal
//! arguments to the same queue.
//!
//! Selectors run on the calling thread, once per attempt, while the producer
//! holds its send lock. They must not send through the producer themselves.

use crate::message::Message;
use siphasher::sip::SipHasher;
use std::hash::Hasher;
use tracing::debug;

pub trait QueueSelector {
    fn select(&self, queue_count: usize, message: &Message, arg: &[u8]) -> usize;
}

impl<F> QueueSelector for F
where
    F: Fn(usize, &Message, &[u8]) -> usize,
{
    fn select(&self, queue_count: usize, message: &Message, arg: &[u8]) -> usize {
        self(queue_count, message, arg)
    }
}

/// Always picks queue 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstQueueSelector;

impl QueueSelector for FirstQueueSelector {
    fn select(&self, queue_count: usize, message: &Message, arg: &[u8]) -> usize {
        debug!(
            queue_count,
            topic = %message.topic,
            arg_len = arg.len(),
            "Selecting first queue"
        );
        0
    }
}

/// Picks `siphash(arg) % queue_count`, so equal arguments share a queue.
/// With no queues it picks 0, which the producer never forwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashQueueSelector;

impl QueueSelector for HashQueueSelector {
    fn select(&self, queue_count: usize, _message: &Message, arg: &[u8]) -> usize {
        let mut hasher = SipHasher::new();
        hasher.write(arg);
        hasher.finish().checked_rem(queue_count as u64).unwrap_or(0) as usize
    }
}
