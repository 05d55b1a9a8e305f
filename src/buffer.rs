//! Per-input FIFO buffering.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::frame::Delivery;

/// A strictly FIFO queue of deliveries for one input port.
///
/// Unbounded: backpressure is applied by the upstream producer's output pool, never here, which
/// is why `input` never fails or blocks.
pub struct InputBuffer<P> {
    queue: Mutex<VecDeque<Delivery<P>>>,
    notify: Box<dyn Fn() + Send + Sync>,
}

impl<P> InputBuffer<P> {
    pub fn new(notify: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Box::new(notify),
        }
    }

    /// Append a delivery and fire the owning component's notify callback.
    pub fn input(&self, delivery: Delivery<P>) {
        self.queue.lock().unwrap().push_back(delivery);
        (self.notify)();
    }

    pub fn available(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Clone of the head delivery, without removing it.
    pub fn peek(&self) -> Option<Delivery<P>> {
        self.queue.lock().unwrap().front().cloned()
    }

    /// Pop and return the head delivery.
    pub fn get(&self) -> Option<Delivery<P>> {
        self.queue.lock().unwrap().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameData;
    use crate::pool::ObjectPool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fifo_order_is_preserved() {
        let pool = ObjectPool::create(|| FrameData::new(0, "Y", 0i32), 4, || {});
        let buf = InputBuffer::new(|| {});
        for n in 0..3 {
            let mut f = pool.get().unwrap();
            Arc::get_mut(&mut f).unwrap().frame_no = n;
            buf.input(Delivery::Frame(f));
        }
        assert_eq!(buf.available(), 3);
        for n in 0..3 {
            assert_eq!(buf.get().unwrap().frame_no(), Some(n));
        }
        assert!(buf.get().is_none());
    }

    #[test]
    fn peek_does_not_remove() {
        let pool = ObjectPool::create(|| FrameData::new(5, "Y", 0i32), 1, || {});
        let buf = InputBuffer::new(|| {});
        buf.input(Delivery::Frame(pool.get().unwrap()));
        assert_eq!(buf.peek().unwrap().frame_no(), Some(5));
        assert_eq!(buf.available(), 1);
    }

    #[test]
    fn input_fires_notify() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let buf: InputBuffer<i32> = InputBuffer::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        buf.input(Delivery::EndOfStream);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
