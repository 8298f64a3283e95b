//! The hot path: region lookup/creation, recursion, parent tracking, and
//! accumulator updates on start/stop (§4.5).

use std::sync::atomic::{AtomicIsize, Ordering};

use log::warn;

use crate::callstack::CallStack;
use crate::cpu;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::region::{RegionArena, RegionId, ROOT};
use crate::time_source::TimeSourceState;

/// All mutable state owned exclusively by one thread: its region arena and
/// its call stack. Never mutated by any other thread while this thread is
/// still calling `start`/`stop`; the reporter and cross-thread queries only
/// read it, and only after the caller has ensured this thread is quiescent
/// (see [`crate::ThreadRegistry`]).
#[derive(Debug)]
pub struct ThreadState {
    pub index: usize,
    pub os_id: usize,
    pub arena: RegionArena,
    pub stack: CallStack,
}

impl ThreadState {
    pub fn new(index: usize, os_id: usize, tablesize: usize) -> Self {
        Self {
            index,
            os_id,
            arena: RegionArena::new(tablesize),
            stack: CallStack::new(),
        }
    }
}

/// A caller-held cache that lets `start_handle`/`stop_handle` skip the hash
/// lookup after the first call. Correctness depends on every thread reaching
/// the call site holding a given handle in the same relative order, so that
/// the cached arena index names the same logical region in each thread's own
/// arena — the same assumption libraries of this shape have always made.
#[derive(Debug)]
pub struct Handle(AtomicIsize);

impl Handle {
    pub const fn new() -> Self {
        Self(AtomicIsize::new(-1))
    }

    fn get(&self) -> Option<RegionId> {
        let v = self.0.load(Ordering::Relaxed);
        if v < 0 {
            None
        } else {
            Some(RegionId(v as usize))
        }
    }

    fn set(&self, id: RegionId) {
        self.0.store(id.0 as isize, Ordering::Relaxed);
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the push and parent-tracking steps common to `start`/`start_handle`
/// once the region id is known (§4.5 steps 5-8).
fn start_with_id(ts: &mut ThreadState, id: RegionId, opts: &Options, time: TimeSourceState) -> Result<()> {
    if ts.arena.regions[id.0].onflg {
        ts.arena.regions[id.0].recurselvl += 1;
        return Ok(());
    }

    let parent = ts.stack.push(id)?;

    {
        let region = &mut ts.arena.regions[id.0];
        if parent == ROOT {
            region.norphan += 1;
        } else if let Some(pos) = region.parent.iter().position(|p| *p == parent) {
            region.parent_count[pos] += 1;
        } else {
            region.parent.push(parent);
            region.parent_count.push(1);
        }
        region.onflg = true;
        if opts.wall {
            region.last_start = time.now();
        }
        if opts.cpu {
            let (user, sys) = cpu::sample();
            region.cpu_last_user = user;
            region.cpu_last_sys = sys;
        }
    }
    Ok(())
}

/// Finalizes stats common to `stop`/`stop_handle` once the region id is known
/// and the pre-lookup samples have already been taken (§4.5 steps 3-6).
fn stop_with_id(
    ts: &mut ThreadState,
    id: RegionId,
    opts: &Options,
    now: Option<f64>,
    cpu_sample: (f64, f64),
) -> Result<()> {
    let region = &mut ts.arena.regions[id.0];
    if !region.onflg {
        return Err(Error::UnbalancedStop(region.name.clone()));
    }
    region.count += 1;
    if region.recurselvl > 0 {
        region.recurselvl -= 1;
        region.nrecurse += 1;
        return Ok(());
    }
    region.onflg = false;
    let popped = ts.stack.pop()?;
    debug_assert_eq!(popped, id, "call stack desynchronized from region onflg state");

    if let Some(now) = now {
        let delta = now - region.last_start;
        if delta < 0.0 {
            warn!("negative wallclock delta ({delta}) observed for region \"{}\"", region.name);
        }
        region.accum += delta;
        if region.count - region.nrecurse == 1 {
            region.wall_min = delta;
            region.wall_max = delta;
        } else {
            region.wall_min = region.wall_min.min(delta);
            region.wall_max = region.wall_max.max(delta);
        }
    }
    if opts.cpu {
        region.cpu_accum_user += cpu_sample.0 - region.cpu_last_user;
        region.cpu_accum_sys += cpu_sample.1 - region.cpu_last_sys;
    }
    Ok(())
}

pub fn start(ts: &mut ThreadState, name: &str, opts: &Options, time: TimeSourceState) -> Result<()> {
    if ts.stack.depth() >= opts.depthlimit {
        ts.stack.suppress();
        return Ok(());
    }
    let id = ts.arena.intern(name);
    start_with_id(ts, id, opts, time)
}

pub fn stop(ts: &mut ThreadState, name: &str, opts: &Options, time: TimeSourceState) -> Result<()> {
    if ts.stack.unsuppress() {
        return Ok(());
    }
    let now = opts.wall.then(|| time.now());
    let cpu_sample = if opts.cpu { cpu::sample() } else { (0.0, 0.0) };

    let id = ts.arena.find(name).ok_or_else(|| Error::UnknownTimer(name.to_string()))?;
    stop_with_id(ts, id, opts, now, cpu_sample)
}

pub fn start_handle(ts: &mut ThreadState, name: &str, handle: &Handle, opts: &Options, time: TimeSourceState) -> Result<()> {
    if ts.stack.depth() >= opts.depthlimit {
        ts.stack.suppress();
        return Ok(());
    }
    let id = match handle.get() {
        Some(id) => id,
        None => {
            let id = ts.arena.intern(name);
            handle.set(id);
            id
        }
    };
    start_with_id(ts, id, opts, time)
}

pub fn stop_handle(ts: &mut ThreadState, handle: &Handle, opts: &Options, time: TimeSourceState) -> Result<()> {
    if ts.stack.unsuppress() {
        return Ok(());
    }
    let now = opts.wall.then(|| time.now());
    let cpu_sample = if opts.cpu { cpu::sample() } else { (0.0, 0.0) };

    let id = handle.get().ok_or_else(|| Error::UnknownTimer("<unset handle>".to_string()))?;
    stop_with_id(ts, id, opts, now, cpu_sample)
}

pub fn start_instr(ts: &mut ThreadState, addr: usize, opts: &Options, time: TimeSourceState) -> Result<()> {
    if ts.stack.depth() >= opts.depthlimit {
        ts.stack.suppress();
        return Ok(());
    }
    let id = ts.arena.intern_addr(addr);
    start_with_id(ts, id, opts, time)
}

pub fn stop_instr(ts: &mut ThreadState, addr: usize, opts: &Options, time: TimeSourceState) -> Result<()> {
    if ts.stack.unsuppress() {
        return Ok(());
    }
    let now = opts.wall.then(|| time.now());
    let cpu_sample = if opts.cpu { cpu::sample() } else { (0.0, 0.0) };

    let id = ts
        .arena
        .find_addr(addr)
        .ok_or_else(|| Error::UnknownTimer(format!("{addr:#x}")))?;
    stop_with_id(ts, id, opts, now, cpu_sample)
}
