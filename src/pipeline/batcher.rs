//! Bounded FIFO queue feeding the sender loop.
//!
//! The queue never grows past `max_queue_size`; callers decide what to do
//! with a rejected message. The flush interval grows with queue load, from
//! `min_batch_interval` when the queue is nearly empty to `max_batch_interval`
//! when it is nearly full.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ClientSettings;
use crate::message::Message;

/// Load (percent of capacity) at or below which the minimum interval is used.
pub const LOW_WATERMARK: f64 = 25.0;
/// Load at or above which the maximum interval is used.
pub const HIGH_WATERMARK: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchLimits {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub min_batch_interval: Duration,
    pub max_batch_interval: Duration,
    pub max_queue_size: usize,
}

impl From<&ClientSettings> for BatchLimits {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            min_batch_size: settings.min_batch_size,
            max_batch_size: settings.max_batch_size,
            min_batch_interval: settings.min_batch_interval,
            max_batch_interval: settings.max_batch_interval,
            max_queue_size: settings.max_queue_size,
        }
    }
}

#[derive(Debug)]
pub struct Batcher {
    limits: BatchLimits,
    queue: Mutex<VecDeque<Message>>,
}

impl Batcher {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(limits.max_queue_size.min(1024))),
            limits,
        }
    }

    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Append `message` if there is room. Returns the message back when the
    /// queue is full so the caller can divert it.
    pub fn enqueue(&self, message: Message) -> Result<(), Message> {
        let mut queue = self.lock();
        if queue.len() >= self.limits.max_queue_size {
            return Err(message);
        }
        queue.push_back(message);
        Ok(())
    }

    /// Remove up to `max_batch_size` messages from the front of the queue.
    pub fn take_batch(&self) -> Vec<Message> {
        let mut queue = self.lock();
        let n = queue.len().min(self.limits.max_batch_size);
        queue.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue fill level in percent.
    pub fn load(&self) -> f64 {
        load_percent(self.len(), self.limits.max_queue_size)
    }

    /// Delay before the next sender tick, derived from the current load.
    pub fn next_interval(&self) -> Duration {
        interval_for_load(&self.limits, self.load())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Message>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn load_percent(len: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        return 100.0;
    }
    100.0 * len as f64 / capacity as f64
}

/// Maps queue load onto a flush interval.
///
/// `min_batch_interval` up to the low watermark, `max_batch_interval` from the
/// high watermark on, and a linear blend of the two in between.
pub fn interval_for_load(limits: &BatchLimits, load: f64) -> Duration {
    let min = limits.min_batch_interval;
    let max = limits.max_batch_interval;

    if load <= LOW_WATERMARK {
        return min;
    }
    if load >= HIGH_WATERMARK {
        return max;
    }

    let span = max.saturating_sub(min).as_secs_f64();
    min + Duration::from_secs_f64(span * load / 100.0)
}
