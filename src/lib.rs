//! In-process region timing: nested `start`/`stop` instrumentation, per-thread
//! accumulation of wallclock and CPU statistics, call-tree construction under
//! one of four parent-selection policies, and a hierarchical text report.
//!
//! The library is process-global by necessity (instrumentation call sites
//! live everywhere), but all state is encapsulated in one module-level
//! [`Control`] object with an `init`/`finalize` lifecycle rather than
//! scattered statics. The crate-level functions below operate on a
//! process-wide singleton `Control` reached through [`global`]; `Control`
//! can also be constructed directly, which is how this crate's own tests get
//! an independent instance instead of sharing the production singleton.

mod callstack;
mod cpu;
pub mod cross_rank;
mod engine;
pub mod error;
pub mod options;
mod platform;
pub mod report;
mod region_stats;
mod thread_registry;
mod time_source;
mod tree;

#[cfg(test)]
mod tests;

use std::cell::Cell;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

pub use engine::Handle;
pub use error::{Error, Result};
pub use options::{Opt, Options, PrintMethod};
pub use region_stats::RegionStats;
pub use time_source::TimeSourceId;

use cross_rank::GlobalRegionStats;
use engine::ThreadState;
use thread_registry::ThreadRegistry;
use time_source::TimeSourceState;

/// Resolved, immutable-after-`initialize` state plus the per-thread registry.
struct Runtime {
    options: Options,
    time: TimeSourceState,
    registry: ThreadRegistry,
    per_call_overhead: f64,
}

/// Everything a [`Control`] owns: the configuration staged before
/// `initialize` and, once initialized, the resolved [`Runtime`].
struct Inner {
    pending: Options,
    pending_time_source: TimeSourceId,
    runtime: Option<Runtime>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            pending: Options::default(),
            pending_time_source: TimeSourceId::ClockGettime,
            runtime: None,
        }
    }
}

/// A single timing-library instance; see the module-level docs for why
/// state is encapsulated this way.
pub struct Control {
    inner: Mutex<Inner>,
    enabled: AtomicBool,
    /// Bumped on every `initialize`/`finalize` transition so that threads
    /// caching a raw pointer to the current `Runtime` (see
    /// [`Self::current_runtime`]) can detect staleness without taking the
    /// lock on every hot-path call.
    generation: AtomicU64,
}

thread_local! {
    /// Per-thread cache of `(owner, generation, *const Runtime)`, refreshed
    /// whenever the owning `Control` or its generation no longer match.
    /// Keyed on the owning `Control`'s own address, not generation alone:
    /// `RUNTIME_CACHE` is one process-wide thread-local shared by every
    /// `Control` a thread ever touches, and two independently constructed
    /// `Control`s both reach `generation == 1` after their own first
    /// `initialize()`, so generation alone cannot tell them apart. Mirrors
    /// the lock-once-then-thread-local-cache idiom `ThreadRegistry` uses for
    /// slot lookups (§4.2): `initialize`/`finalize` are guaranteed by the
    /// concurrency model (§5) never to run concurrently with `start`/`stop`,
    /// so a thread that has already validated its cached pointer for this
    /// `Control` and generation never needs to touch the mutex again.
    static RUNTIME_CACHE: Cell<(*const Control, u64, *const Runtime)> = Cell::new((std::ptr::null(), 0, std::ptr::null()));
}

impl Default for Control {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            enabled: AtomicBool::new(true),
            generation: AtomicU64::new(0),
        }
    }
}

impl Control {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().unwrap().runtime.is_some()
    }

    pub fn set_option(&self, opt: Opt) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.runtime.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        inner.pending.apply(opt)
    }

    /// Selects a time source. Unlike the automatic fallback inside
    /// `initialize`, this fails outright if the source's own `init` fails
    /// (§4.8).
    pub fn set_time_source(&self, id: TimeSourceId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.runtime.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        time_source::try_init(id)?;
        inner.pending_time_source = id;
        Ok(())
    }

    pub fn initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.runtime.is_some() {
            return Err(Error::AlreadyInitialized);
        }
        let time = time_source::resolve_with_fallback(inner.pending_time_source);
        let registry = ThreadRegistry::new(inner.pending.maxthreads, false);
        let per_call_overhead = measure_overhead(time);
        let options = inner.pending.clone();
        inner.runtime = Some(Runtime {
            options,
            time,
            registry,
            per_call_overhead,
        });
        drop(inner);
        self.enabled.store(true, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub fn finalize(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.runtime.is_none() {
            return Err(Error::NotInitialized);
        }
        inner.runtime = None;
        inner.pending = Options::default();
        inner.pending_time_source = TimeSourceId::ClockGettime;
        drop(inner);
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub fn enable(&self) -> Result<()> {
        self.enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn disable(&self) -> Result<()> {
        self.enabled.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Drops every region's accumulated statistics but keeps the set of
    /// known names, on every thread (§8 property 6).
    pub fn reset(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        let rt = inner.runtime.as_ref().ok_or(Error::NotInitialized)?;
        rt.registry.with_all_mut(|threads| {
            for t in threads.iter_mut() {
                t.arena.reset();
            }
        });
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Looks up the current `Runtime`, refreshing this thread's cached
    /// pointer if the generation has moved on since the last call.
    ///
    /// Safety: the returned reference is only valid as long as no concurrent
    /// `finalize`/`initialize` call is in flight, which §5's concurrency
    /// model already requires of every caller. `Inner`, and therefore
    /// `Runtime`, never relocates once allocated (it lives inline inside
    /// this `Control`'s `Mutex`, and `Control` itself is never moved after
    /// construction by any caller in this crate), so the raw pointer stays
    /// valid across the lock being dropped.
    fn current_runtime(&self) -> Result<&Runtime> {
        let owner: *const Control = self;
        let gen = self.generation.load(Ordering::Acquire);
        let (cached_owner, cached_gen, ptr) = RUNTIME_CACHE.with(Cell::get);
        if cached_owner == owner && cached_gen == gen && !ptr.is_null() {
            return Ok(unsafe { &*ptr });
        }
        let inner = self.inner.lock().unwrap();
        match inner.runtime.as_ref() {
            Some(rt) => {
                let ptr: *const Runtime = rt;
                RUNTIME_CACHE.with(|c| c.set((owner, gen, ptr)));
                Ok(unsafe { &*ptr })
            }
            None => Err(Error::NotInitialized),
        }
    }

    fn abort_on_error(&self) -> bool {
        self.current_runtime().map(|rt| rt.options.abort_on_error).unwrap_or(false)
    }

    /// Central error routine (§7): logs and aborts the process when
    /// `abort_on_error` is configured, otherwise passes the error through
    /// unchanged.
    fn abortable<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if self.abort_on_error() {
                log::error!("{e}");
                std::process::abort();
            }
        }
        result
    }

    fn with_thread<R>(&self, f: impl FnOnce(&Runtime, &mut ThreadState) -> Result<R>) -> Result<R> {
        let rt = self.current_runtime()?;
        let (ptr, _index) = rt.registry.current(|index, os_id| ThreadState::new(index, os_id, rt.options.tablesize))?;
        let result = rt.registry.with_state(ptr, |ts| f(rt, ts));
        self.abortable(result)
    }

    pub fn start(&self, name: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.with_thread(|rt, ts| engine::start(ts, name, &rt.options, rt.time))
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.with_thread(|rt, ts| engine::stop(ts, name, &rt.options, rt.time))
    }

    pub fn start_handle(&self, name: &str, handle: &Handle) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.with_thread(|rt, ts| engine::start_handle(ts, name, handle, &rt.options, rt.time))
    }

    pub fn stop_handle(&self, handle: &Handle) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.with_thread(|rt, ts| engine::stop_handle(ts, handle, &rt.options, rt.time))
    }

    pub fn start_instr(&self, addr: usize) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.with_thread(|rt, ts| engine::start_instr(ts, addr, &rt.options, rt.time))
    }

    pub fn stop_instr(&self, addr: usize) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.with_thread(|rt, ts| engine::stop_instr(ts, addr, &rt.options, rt.time))
    }

    /// Reads a region's accumulated statistics on a specific logical thread.
    /// Requires that `thread` has stopped all of its timers, per §5's
    /// requirement that cross-thread reads only happen once the owning
    /// thread is quiescent.
    pub fn query(&self, name: &str, thread: usize) -> Result<RegionStats> {
        let rt = self.current_runtime()?;
        rt.registry.with_all(|threads| {
            let t = threads.iter().find(|t| t.index == thread).ok_or(Error::ThreadOverflow)?;
            let id = t.arena.find(name).ok_or_else(|| Error::UnknownTimer(name.to_string()))?;
            let r = &t.arena.regions[id.0];
            Ok(RegionStats {
                name: r.name.clone(),
                count: r.count,
                nrecurse: r.nrecurse,
                accum: r.accum,
                wall_min: r.wall_min,
                wall_max: r.wall_max,
                cpu_user: r.cpu_accum_user,
                cpu_sys: r.cpu_accum_sys,
                nparent: r.nparent(),
                norphan: r.norphan,
                parent_counts: r.parent_count.clone(),
            })
        })
    }

    pub fn get_wallclock(&self, name: &str, thread: usize) -> Result<f64> {
        self.query(name, thread).map(|s| s.accum)
    }

    pub fn get_nregions(&self, thread: usize) -> Result<usize> {
        let rt = self.current_runtime()?;
        rt.registry.with_all(|threads| {
            threads
                .iter()
                .find(|t| t.index == thread)
                .map(|t| t.arena.regions.len() - 1)
                .ok_or(Error::ThreadOverflow)
        })
    }

    pub fn get_regionname(&self, thread: usize, idx: usize) -> Result<String> {
        let rt = self.current_runtime()?;
        rt.registry.with_all(|threads| {
            let t = threads.iter().find(|t| t.index == thread).ok_or(Error::ThreadOverflow)?;
            t.arena
                .regions
                .get(idx + 1)
                .map(|r| r.name.clone())
                .ok_or_else(|| Error::UnknownTimer(format!("thread {thread} region index {idx}")))
        })
    }

    /// Computes [`GlobalRegionStats`] for `name` across every thread this
    /// process has registered (§4.9).
    pub fn get_threadstats(&self, name: &str) -> Result<GlobalRegionStats> {
        let rt = self.current_runtime()?;
        rt.registry.with_all(|threads| cross_rank::get_threadstats(threads, name))
    }

    /// Writes the full text report to `path`. All threads must have stopped
    /// their timers before calling this (§5, §4.7).
    pub fn pr(&self, path: impl AsRef<Path>) -> Result<()> {
        let rt = self.current_runtime()?;
        rt.registry
            .with_all(|threads| report::write_to_path(threads, &rt.options, rt.per_call_overhead, path.as_ref()))
    }

    /// `timing.<id>` convenience naming (§4.7), `0 <= id < 1_000_000`.
    pub fn pr_by_id(&self, id: u32) -> Result<()> {
        let path = report::path_for_id(id)?;
        self.pr(path)
    }

    /// Chrome Trace Event Format export of the same call tree (§4.7
    /// "Supplemental export").
    pub fn to_chrome_trace<W: std::io::Write>(&self, w: &mut W) -> Result<()> {
        let rt = self.current_runtime()?;
        rt.registry
            .with_all(|threads| report::write_chrome_trace(threads, rt.options.print_method, w).map_err(Error::from))
    }
}

/// Samples the resolved time source back-to-back to estimate the per-call
/// overhead used by the reporter's optional `Overhead` column (§4.7:
/// `2 × count × per_call_utr_overhead`).
fn measure_overhead(time: TimeSourceState) -> f64 {
    const SAMPLES: usize = 64;
    let start = time.now();
    for _ in 0..SAMPLES {
        std::hint::black_box(time.now());
    }
    let elapsed = (time.now() - start).max(0.0);
    elapsed / SAMPLES as f64
}

lazy_static::lazy_static! {
    static ref GLOBAL: Control = Control::default();
}

/// The process-wide singleton instance the crate-level functions below
/// operate on.
pub fn global() -> &'static Control {
    &GLOBAL
}

pub fn set_option(opt: Opt) -> Result<()> {
    global().set_option(opt)
}

pub fn set_time_source(id: TimeSourceId) -> Result<()> {
    global().set_time_source(id)
}

pub fn initialize() -> Result<()> {
    global().initialize()
}

pub fn finalize() -> Result<()> {
    global().finalize()
}

pub fn enable() -> Result<()> {
    global().enable()
}

pub fn disable() -> Result<()> {
    global().disable()
}

pub fn reset() -> Result<()> {
    global().reset()
}

pub fn is_initialized() -> bool {
    global().is_initialized()
}

pub fn start(name: &str) -> Result<()> {
    global().start(name)
}

pub fn stop(name: &str) -> Result<()> {
    global().stop(name)
}

pub fn start_handle(name: &str, handle: &Handle) -> Result<()> {
    global().start_handle(name, handle)
}

pub fn stop_handle(handle: &Handle) -> Result<()> {
    global().stop_handle(handle)
}

pub fn start_instr(addr: usize) -> Result<()> {
    global().start_instr(addr)
}

pub fn stop_instr(addr: usize) -> Result<()> {
    global().stop_instr(addr)
}

pub fn query(name: &str, thread: usize) -> Result<RegionStats> {
    global().query(name, thread)
}

pub fn get_wallclock(name: &str, thread: usize) -> Result<f64> {
    global().get_wallclock(name, thread)
}

pub fn get_nregions(thread: usize) -> Result<usize> {
    global().get_nregions(thread)
}

pub fn get_regionname(thread: usize, idx: usize) -> Result<String> {
    global().get_regionname(thread, idx)
}

pub fn get_threadstats(name: &str) -> Result<GlobalRegionStats> {
    global().get_threadstats(name)
}

pub fn pr(path: impl AsRef<Path>) -> Result<()> {
    global().pr(path)
}

pub fn pr_by_id(id: u32) -> Result<()> {
    global().pr_by_id(id)
}

/// Instruments the enclosing scope: calls `start(name)` on construction and
/// `stop(name)` on drop, so call sites don't need to remember to pair
/// `start`/`stop` by hand.
#[macro_export]
macro_rules! region {
    ($name:expr) => {
        $crate::RegionGuard::new($name)
    };
}

/// RAII guard created by the [`region!`] macro.
pub struct RegionGuard {
    name: &'static str,
}

impl RegionGuard {
    pub fn new(name: &'static str) -> Self {
        if let Err(e) = start(name) {
            log::warn!("region!(\"{name}\") start failed: {e}");
        }
        Self { name }
    }
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        if let Err(e) = stop(self.name) {
            log::warn!("region!(\"{}\") stop failed: {e}", self.name);
        }
    }
}
