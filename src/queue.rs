//! Bounded FIFO work queue with reactor-integrated ready notification.
//!
//! [`enqueue`](FixedQueue::enqueue) blocks while the queue is full;
//! [`try_dequeue`](FixedQueue::try_dequeue) never blocks. A queue can be
//! bound to a [`Reactor`] with [`register_dequeue`], after which the
//! reactor's thread invokes the supplied ready handler whenever items are
//! available. [`try_remove`](FixedQueue::try_remove) pulls a specific item
//! out of the middle of the queue, which is what alarm cancellation uses to
//! drain stale dispatches.
//!
//! Occupancy is tracked with a pair of counting semaphores (free slots and
//! ready items) so that blocking enqueue and non-blocking dequeue/removal
//! stay consistent without holding the list lock across a wait.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::reactor::{Reactor, ReadySource};
use crate::semaphore::Semaphore;

struct Registration {
    reactor: Arc<Reactor>,
    source_id: u64,
}

struct Inner<T> {
    items: VecDeque<T>,
    registration: Option<Registration>,
}

/// A bounded multi-producer FIFO queue.
pub struct FixedQueue<T> {
    inner: Mutex<Inner<T>>,
    enqueue_sem: Semaphore,
    dequeue_sem: Semaphore,
    capacity: usize,
}

impl<T: Send + 'static> FixedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Arc::new(Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                registration: None,
            }),
            enqueue_sem: Semaphore::new(capacity),
            dequeue_sem: Semaphore::new(0),
            capacity,
        })
    }

    /// Create a queue with no practical capacity limit.
    #[must_use]
    pub fn unbounded() -> Arc<Self> {
        Self::new(usize::MAX)
    }

    /// Maximum number of items the queue holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an item, blocking while the queue is full, then notify the
    /// bound reactor (if any).
    pub fn enqueue(&self, item: T) {
        self.enqueue_sem.wait();
        let reactor = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.items.push_back(item);
            inner
                .registration
                .as_ref()
                .map(|reg| Arc::clone(&reg.reactor))
        };
        self.dequeue_sem.post();
        if let Some(reactor) = reactor {
            reactor.poke();
        }
    }

    /// Remove and return the front item without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        if !self.dequeue_sem.try_wait() {
            return None;
        }
        let item = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .pop_front();
        match item {
            Some(item) => {
                self.enqueue_sem.post();
                Some(item)
            }
            // A concurrent try_remove won the item and already returned the
            // free slot; the ready credit we consumed was its leftover.
            None => None,
        }
    }

    /// Remove and return the first item matching `pred`, wherever it sits.
    pub fn try_remove<F>(&self, mut pred: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let removed = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .items
                .iter()
                .position(|item| pred(item))
                .and_then(|pos| inner.items.remove(pos))
        };
        if removed.is_some() {
            // Consume the ready credit this item posted (it may already be
            // gone to a concurrent try_dequeue) and free its slot.
            self.dequeue_sem.try_wait();
            self.enqueue_sem.post();
        }
        removed
    }

    /// Drop the reactor binding installed by [`register_dequeue`].
    pub fn unregister_dequeue(&self) {
        let registration = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .registration
            .take();
        if let Some(reg) = registration {
            reg.reactor.unregister(reg.source_id);
        }
    }

    fn ready_len(&self) -> usize {
        self.dequeue_sem.count()
    }
}

/// Bind `queue` to `reactor`: whenever the queue has a ready item, the
/// reactor's thread calls `ready` with the queue.
///
/// The handler must consume the item that made the queue ready (or observe
/// that a racing removal already did). Re-registering replaces any previous
/// binding.
pub fn register_dequeue<T, F>(queue: &Arc<FixedQueue<T>>, reactor: &Arc<Reactor>, ready: F)
where
    T: Send + 'static,
    F: Fn(&Arc<FixedQueue<T>>) + Send + Sync + 'static,
{
    queue.unregister_dequeue();
    let source = Arc::new(QueueSource {
        queue: Arc::downgrade(queue),
        ready: Box::new(ready),
    });
    let source_id = reactor.register(source);
    let mut inner = queue.inner.lock().unwrap_or_else(PoisonError::into_inner);
    inner.registration = Some(Registration {
        reactor: Arc::clone(reactor),
        source_id,
    });
}

struct QueueSource<T> {
    // Weak: the queue holds the reactor through its registration, and the
    // reactor holds this source.
    queue: Weak<FixedQueue<T>>,
    ready: Box<dyn Fn(&Arc<FixedQueue<T>>) + Send + Sync>,
}

impl<T: Send + 'static> ReadySource for QueueSource<T> {
    fn has_pending(&self) -> bool {
        self.queue
            .upgrade()
            .is_some_and(|queue| queue.ready_len() > 0)
    }

    fn dispatch(&self) {
        if let Some(queue) = self.queue.upgrade() {
            (self.ready)(&queue);
        }
    }
}
