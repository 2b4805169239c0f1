//! Worker-thread event loop.
//!
//! A reactor owns a set of ready sources. The hosting thread sits in
//! [`Reactor::run`], dispatching whichever source reports pending work and
//! parking on a condvar otherwise. Producers call [`Reactor::poke`] after
//! making a source ready.
//!
//! Sources must make progress when dispatched (consume at least the item
//! that made them ready, or observe that it is gone); a source that stays
//! ready without progressing would spin the loop.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// A unit of readiness the reactor can poll and dispatch.
pub trait ReadySource: Send + Sync {
    /// Whether the source currently has work available.
    fn has_pending(&self) -> bool;
    /// Process one unit of work. Called with no reactor locks held.
    fn dispatch(&self);
}

struct SourceEntry {
    id: u64,
    source: Arc<dyn ReadySource>,
}

struct ReactorInner {
    sources: Vec<SourceEntry>,
    next_id: u64,
    running: bool,
}

/// Event loop state shared between a worker thread and producers.
pub struct Reactor {
    inner: Mutex<ReactorInner>,
    condvar: Condvar,
}

impl Reactor {
    /// Create a reactor with no sources.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(ReactorInner {
                sources: Vec::new(),
                next_id: 0,
                running: true,
            }),
            condvar: Condvar::new(),
        })
    }

    /// Add a source; returns an id usable with [`Reactor::unregister`].
    pub fn register(&self, source: Arc<dyn ReadySource>) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.sources.push(SourceEntry { id, source });
        drop(inner);
        self.condvar.notify_one();
        id
    }

    /// Remove a source. Returns `false` if the id was not registered.
    pub fn unregister(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.sources.len();
        inner.sources.retain(|entry| entry.id != id);
        inner.sources.len() != before
    }

    /// Wake the loop to re-poll its sources.
    pub fn poke(&self) {
        self.condvar.notify_one();
    }

    /// Ask the loop to exit and wake it.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.running = false;
        drop(inner);
        self.condvar.notify_all();
    }

    /// Run the event loop on the calling thread until [`Reactor::stop`].
    pub fn run(&self) {
        loop {
            let source = {
                let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
                loop {
                    if !inner.running {
                        return;
                    }
                    if let Some(entry) =
                        inner.sources.iter().find(|entry| entry.source.has_pending())
                    {
                        break Arc::clone(&entry.source);
                    }
                    inner = self
                        .condvar
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };
            source.dispatch();
        }
    }
}
