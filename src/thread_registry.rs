//! Maps the calling OS/user thread to a dense 0-based logical index (§4.2).
//!
//! First-time slot allocation is serialized by a single mutex; every
//! subsequent call from that thread is lock-free, served from a thread-local
//! cache of the slot's address. This is the "parallel-threads with shared
//! mutable state guarded by a mutex" back-end from the data model; the
//! single-threaded back-end is `ThreadRegistry::single_threaded`.

use std::cell::Cell;
use std::sync::Mutex;

use crate::engine::ThreadState;
use crate::error::{Error, Result};

/// Owns one thread's [`ThreadState`] behind an `UnsafeCell` so the owning
/// thread can mutate it without going through the registry mutex on every
/// call. Safety depends on two facts held by construction: only the thread
/// that allocated a slot ever calls through its cached pointer, and the
/// registry mutex is taken for every read that crosses threads (report,
/// cross-thread queries), which callers must only do once all threads have
/// stopped their timers.
pub struct ThreadSlot {
    state: std::cell::UnsafeCell<ThreadState>,
}

unsafe impl Sync for ThreadSlot {}

struct Inner {
    slots: Vec<Option<Box<ThreadSlot>>>,
    maxthreads: usize,
    single_threaded: bool,
}

pub struct ThreadRegistry {
    inner: Mutex<Inner>,
}

thread_local! {
    static CACHED: Cell<Option<(usize, *const ThreadSlot)>> = Cell::new(None);
}

impl ThreadRegistry {
    pub fn new(maxthreads: usize, single_threaded: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                maxthreads,
                single_threaded,
            }),
        }
    }

    pub fn reset_for_tests(&self, maxthreads: usize, single_threaded: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots.clear();
        inner.maxthreads = maxthreads;
        inner.single_threaded = single_threaded;
        CACHED.with(|c| c.set(None));
    }

    /// Returns `(slot, logical_index)` for the calling thread, allocating a
    /// new slot and (for multi-threaded back-ends) a new logical index on
    /// first call. `tablesize` is only used the first time, to size the new
    /// thread's region arena.
    pub fn current<F>(&self, make_state: F) -> Result<(*const ThreadSlot, usize)>
    where
        F: FnOnce(usize, usize) -> ThreadState,
    {
        if let Some((idx, ptr)) = CACHED.with(|c| c.get()) {
            return Ok((ptr, idx));
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.single_threaded {
            if inner.slots.is_empty() {
                let os_id = thread_id::get();
                inner.slots.push(Some(Box::new(ThreadSlot {
                    state: std::cell::UnsafeCell::new(make_state(0, os_id)),
                })));
            }
            let ptr: *const ThreadSlot = inner.slots[0].as_deref().unwrap();
            CACHED.with(|c| c.set(Some((0, ptr))));
            return Ok((ptr, 0));
        }

        let index = inner.slots.len();
        if index >= inner.maxthreads {
            return Err(Error::ThreadOverflow);
        }
        let os_id = thread_id::get();
        let slot = Box::new(ThreadSlot {
            state: std::cell::UnsafeCell::new(make_state(index, os_id)),
        });
        let ptr: *const ThreadSlot = &*slot;
        inner.slots.push(Some(slot));
        CACHED.with(|c| c.set(Some((index, ptr))));
        Ok((ptr, index))
    }

    pub fn with_state<R>(&self, ptr: *const ThreadSlot, f: impl FnOnce(&mut ThreadState) -> R) -> R {
        // Only the owning thread ever calls this with a pointer it cached itself.
        let state = unsafe { &mut *(*ptr).state.get() };
        f(state)
    }

    /// Snapshots all currently-registered threads' states for reading. The
    /// caller is responsible for ensuring no thread is concurrently inside
    /// `start`/`stop` (e.g. all worker threads have been joined).
    pub fn with_all<R>(&self, f: impl FnOnce(&[&ThreadState]) -> R) -> R {
        let inner = self.inner.lock().unwrap();
        let refs: Vec<&ThreadState> = inner
            .slots
            .iter()
            .filter_map(|s| s.as_deref())
            .map(|slot| unsafe { &*slot.state.get() })
            .collect();
        f(&refs)
    }

    /// Like [`with_all`](Self::with_all) but mutable, used by `reset`. Same
    /// quiescence requirement on the caller.
    pub fn with_all_mut<R>(&self, f: impl FnOnce(&mut [&mut ThreadState]) -> R) -> R {
        let inner = self.inner.lock().unwrap();
        let mut refs: Vec<&mut ThreadState> = inner
            .slots
            .iter()
            .filter_map(|s| s.as_deref())
            .map(|slot| unsafe { &mut *slot.state.get() })
            .collect();
        f(&mut refs)
    }

    pub fn thread_count(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }
}
