//! Bounded object pools providing backpressure for component outputs.
//!
//! Rust has no hook that fires on "last strong reference dropped" generically, so instead of
//! chasing that we use a scoped acquisition type ([`Pooled<T>`]) whose own [`Drop`] impl is the
//! release point, reached via a weak back-pointer into the pool so the pool and its outstanding
//! objects never form a reference cycle.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, Weak};

/// A pooled object checked out from an [`ObjectPool`].
///
/// Derefs to `T`. When the last clone of the `Arc` wrapping this value is dropped, the pool that
/// issued it constructs a replacement via its factory and notifies its owning component.
pub struct Pooled<T> {
    value: T,
    pool: Weak<PoolInner<T>>,
}

impl<T> Deref for Pooled<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}
impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}
impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release();
        }
    }
}

struct PoolInner<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    notify: Box<dyn Fn() + Send + Sync>,
    idle: Mutex<VecDeque<Arc<Pooled<T>>>>,
    size: usize,
    self_weak: Weak<PoolInner<T>>,
}

impl<T> PoolInner<T> {
    /// Build one fresh object and push it onto the idle queue, firing `notify` once.
    ///
    /// Called both to seed the pool at creation time and as the release hook a [`Pooled<T>`]
    /// invokes on drop — in both cases the net effect is the same: one more idle object exists
    /// and `notify` has fired once, which is exactly the invariant `idle + outstanding == size`
    /// depends on.
    fn release(&self) {
        let fresh = (self.factory)();
        let pooled = Arc::new(Pooled {
            value: fresh,
            pool: self.self_weak.clone(),
        });
        self.idle.lock().unwrap().push_back(pooled);
        (self.notify)();
    }
}

/// A bounded, reference-tracked supply of reusable output objects (typically [`Frame`]s).
///
/// The pool never blocks: [`get`](Self::get) returns `None` when empty, and starvation is the
/// caller's own backpressure mechanism — an object-producing component simply stops producing
/// until `notify` fires again.
///
/// [`Frame`]: crate::frame::Frame
pub struct ObjectPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + Sync + 'static> ObjectPool<T> {
    /// Pre-allocate `size` fresh objects via `factory()`, queue them, and fire `notify` once per
    /// creation. `size` is clamped to at least 1: a zero-sized pool can never produce a frame and
    /// is never useful.
    pub fn create(
        factory: impl Fn() -> T + Send + Sync + 'static,
        size: usize,
        notify: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let size = size.max(1);
        let inner = Arc::new_cyclic(|self_weak| PoolInner {
            factory: Box::new(factory),
            notify: Box::new(notify),
            idle: Mutex::new(VecDeque::new()),
            size,
            self_weak: self_weak.clone(),
        });
        for _ in 0..size {
            inner.release();
        }
        Self { inner }
    }

    /// Count of idle objects currently available.
    pub fn available(&self) -> usize {
        self.inner.idle.lock().unwrap().len()
    }

    /// The pool's fixed total size (idle + outstanding, always).
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Pop and return one idle object, or `None` if the pool is currently empty.
    pub fn get(&self) -> Option<Arc<Pooled<T>>> {
        self.inner.idle.lock().unwrap().pop_front()
    }
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn pool_pre_allocates_and_bounds_availability() {
        let pool = ObjectPool::create(|| 0i32, 3, || {});
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.size(), 3);
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert_eq!(pool.available(), 1);
        drop(a);
        assert_eq!(pool.available(), 2);
        drop(b);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn pool_empties_and_returns_none() {
        let pool = ObjectPool::create(|| (), 1, || {});
        let held = pool.get();
        assert!(held.is_some());
        assert!(pool.get().is_none());
        assert_eq!(pool.available(), 0);
        drop(held);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn release_fires_notify_once_per_replacement() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let pool = ObjectPool::create(|| (), 2, move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        // two creations at construction time
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let held = pool.get().unwrap();
        drop(held);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn get_mut_succeeds_while_sole_owner() {
        let pool = ObjectPool::create(|| 0i32, 1, || {});
        let mut held = pool.get().unwrap();
        *Arc::get_mut(&mut held).unwrap() = 42;
        assert_eq!(*held, 42);
    }
}
