//! Reporter (§4.7): per-thread indented call trees, optional cross-thread
//! summary, multiple-parent diagnostics, hash-collision statistics, memory
//! accounting, and a Chrome Trace Event Format export.

use std::io::{self, Write};

use crate::engine::ThreadState;
use crate::options::Options;
use crate::region::RegionId;
use crate::tree;

fn fmt_wall(v: f64) -> String {
    if v.abs() >= 0.01 {
        format!("{v:9.3}")
    } else {
        format!("{v:9.2e}")
    }
}

fn fmt_count(v: u64) -> String {
    if v < 1_000_000 {
        format!("{v:9}")
    } else {
        format!("{:9.1e}", v as f64)
    }
}

/// Writes the full text report (every gated section Options enables) for
/// every currently-registered thread.
pub fn write_text<W: Write>(threads: &[&ThreadState], opts: &Options, per_call_overhead: f64, w: &mut W) -> io::Result<()> {
    // %_of_<first-real-region-on-thread-0>: a single reference value shared
    // by every thread's percent column, per §4.7.
    let top_region_accum = threads
        .iter()
        .find(|t| t.index == 0)
        .and_then(|t| t.arena.regions.get(1))
        .map(|r| r.accum)
        .unwrap_or(0.0);

    for thread in threads {
        write_thread_section(thread, opts, per_call_overhead, top_region_accum, w)?;
        writeln!(w)?;
    }

    if opts.dopr_threadsort {
        write_threadsort(threads, w)?;
    }
    if opts.dopr_multparent {
        write_multparent(threads, w)?;
    }
    if opts.dopr_collision {
        write_collisions(threads, w)?;
    }
    if opts.dopr_memusage {
        write_memusage(threads, w)?;
    }
    write_thread_map(threads, w)?;
    Ok(())
}

fn write_thread_section<W: Write>(
    thread: &ThreadState,
    opts: &Options,
    per_call_overhead: f64,
    top_region_accum: f64,
    w: &mut W,
) -> io::Result<()> {
    if opts.dopr_preamble {
        writeln!(w, "Stats for thread {} ({} regions known):", thread.index, thread.arena.regions.len() - 1)?;
    }

    let name_width = thread.arena.max_name_len().max(4);
    write!(w, "  {:<name_width$} {:>9} {:>9}", "name", "Called", "Recurse")?;
    if opts.cpu {
        write!(w, " {:>9} {:>9} {:>9}", "Usr", "Sys", "Usr+Sys")?;
    }
    if opts.wall {
        write!(w, " {:>9} {:>9} {:>9}", "Wallclock", "max", "min")?;
        if opts.percent {
            write!(w, " {:>9}", "%_of_top")?;
        }
    }
    if opts.overhead && opts.wall {
        write!(w, " {:>9}", "Overhead")?;
    }
    writeln!(w)?;

    let children = tree::build(&thread.arena, opts.print_method);

    for &root_child in &children[0] {
        write_node(thread, &children, root_child, 0, opts, per_call_overhead, name_width, top_region_accum, w)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_node<W: Write>(
    thread: &ThreadState,
    children: &[Vec<RegionId>],
    id: RegionId,
    depth: usize,
    opts: &Options,
    per_call_overhead: f64,
    name_width: usize,
    top_region_accum: f64,
    w: &mut W,
) -> io::Result<()> {
    let region = &thread.arena.regions[id.0];
    let marker = if region.nparent() > 1 { '*' } else { ' ' };
    let indent = "  ".repeat(depth);
    let label = format!("{indent}{}", region.name);
    let recurse = if region.nrecurse == 0 {
        format!("{:>9}", "-")
    } else {
        fmt_count(region.nrecurse)
    };

    write!(w, "{marker}{label:<name_width$} {} {recurse}", fmt_count(region.count))?;
    if opts.cpu {
        write!(
            w,
            " {:>9.3} {:>9.3} {:>9.3}",
            region.cpu_accum_user,
            region.cpu_accum_sys,
            region.cpu_accum_user + region.cpu_accum_sys
        )?;
    }
    if opts.wall {
        write!(w, " {} {} {}", fmt_wall(region.accum), fmt_wall(region.wall_max), fmt_wall(region.wall_min))?;
        if opts.percent && top_region_accum > 0.0 {
            write!(w, " {:9.2}", 100.0 * region.accum / top_region_accum)?;
        }
    }
    if opts.overhead && opts.wall {
        write!(w, " {}", fmt_wall(2.0 * region.count as f64 * per_call_overhead))?;
    }
    writeln!(w)?;

    for &child in &children[id.0] {
        write_node(thread, children, child, depth + 1, opts, per_call_overhead, name_width, top_region_accum, w)?;
    }
    Ok(())
}

/// Cross-thread sort: thread-0's regions, each followed by matching rows
/// from other threads and a `SUM` row. As in the source this crate's design
/// is drawn from, iteration starts from thread 0's arena, so a region that
/// exists only on non-zero threads never appears here (§9 Open Questions,
/// preserved rather than silently fixed).
fn write_threadsort<W: Write>(threads: &[&ThreadState], w: &mut W) -> io::Result<()> {
    let Some(thread0) = threads.iter().find(|t| t.index == 0) else {
        return Ok(());
    };
    writeln!(w, "Same stats sorted by thread:")?;
    for region0 in thread0.arena.regions.iter().skip(1) {
        writeln!(w, "  {}:", region0.name)?;
        let mut sum_count = 0u64;
        let mut sum_accum = 0.0;
        let mut sum_min = f64::MAX;
        let mut sum_max = f64::MIN;
        for thread in threads {
            if let Some(id) = thread.arena.find(&region0.name) {
                let r = &thread.arena.regions[id.0];
                writeln!(w, "    thread {}: {} calls, {} wall", thread.index, fmt_count(r.count), fmt_wall(r.accum))?;
                sum_count += r.count;
                sum_accum += r.accum;
                if r.count > 0 {
                    sum_min = sum_min.min(r.wall_min);
                    sum_max = sum_max.max(r.wall_max);
                }
            }
        }
        if sum_min > sum_max {
            sum_min = 0.0;
            sum_max = 0.0;
        }
        writeln!(
            w,
            "    SUM: {} calls, {} wall, max {}, min {}",
            fmt_count(sum_count),
            fmt_wall(sum_accum),
            fmt_wall(sum_max),
            fmt_wall(sum_min)
        )?;
    }
    Ok(())
}

fn write_multparent<W: Write>(threads: &[&ThreadState], w: &mut W) -> io::Result<()> {
    writeln!(w, "Multiple parent info:")?;
    for thread in threads {
        for region in thread.arena.regions.iter().skip(1) {
            if region.nparent() <= 1 {
                continue;
            }
            writeln!(w, "  thread {} region {}:", thread.index, region.name)?;
            for (parent, count) in region.parent.iter().zip(region.parent_count.iter()) {
                let parent_name = &thread.arena.regions[parent.0].name;
                writeln!(w, "    {parent_name}: {count}")?;
            }
            writeln!(w, "    total: {}", region.count)?;
        }
    }
    Ok(())
}

fn write_collisions<W: Write>(threads: &[&ThreadState], w: &mut W) -> io::Result<()> {
    writeln!(w, "Hash collision stats:")?;
    for thread in threads {
        let (empty, one, two, more) = thread.arena.bucket_histogram();
        writeln!(
            w,
            "  thread {}: tablesize {} | buckets: 0={empty} 1={one} 2={two} >2={more} | collisions={} | max chain={}",
            thread.index,
            thread.arena.tablesize(),
            thread.arena.total_collisions(),
            thread.arena.max_chain_len()
        )?;
        for (bucket, names) in thread.arena.colliding_buckets() {
            writeln!(w, "    bucket {bucket}: {}", names.join(", "))?;
        }
    }
    Ok(())
}

fn write_memusage<W: Write>(threads: &[&ThreadState], w: &mut W) -> io::Result<()> {
    writeln!(w, "Memory usage:")?;
    let mut total = 0usize;
    for thread in threads {
        let bytes = thread.arena.approx_bytes();
        total += bytes;
        writeln!(w, "  thread {}: {:.2} KB", thread.index, bytes as f64 / 1024.0)?;
    }
    writeln!(w, "  total: {:.2} KB", total as f64 / 1024.0)?;
    Ok(())
}

fn write_thread_map<W: Write>(threads: &[&ThreadState], w: &mut W) -> io::Result<()> {
    writeln!(w, "Thread map:")?;
    for thread in threads {
        writeln!(w, "  logical {} -> os thread {}", thread.index, thread.os_id)?;
    }
    Ok(())
}

/// Opens `path` for the textual report, diverting to stderr if the open
/// fails (the caller still receives an `Io` error so it can tell the two
/// cases apart).
pub fn write_to_path(threads: &[&ThreadState], opts: &Options, per_call_overhead: f64, path: &std::path::Path) -> crate::error::Result<()> {
    match std::fs::File::create(path) {
        Ok(mut file) => {
            write_text(threads, opts, per_call_overhead, &mut file)?;
            Ok(())
        }
        Err(e) => {
            let mut stderr = io::stderr();
            let _ = write_text(threads, opts, per_call_overhead, &mut stderr);
            Err(e.into())
        }
    }
}

/// `timing.<id>` convenience file naming, `0 <= id < 1_000_000`.
pub fn path_for_id(id: u32) -> crate::error::Result<std::path::PathBuf> {
    if id >= 1_000_000 {
        return Err(crate::error::Error::BadValue);
    }
    Ok(std::path::PathBuf::from(format!("timing.{id}")))
}

/// Chrome Trace Event Format export of the same call tree: one complete
/// ("X") event per region per thread, nested by tree structure, `ts` fixed
/// at 0 and `dur` the region's cumulative wallclock in microseconds. This is
/// additive visualization tooling; it carries none of its own statistics
/// beyond what [`write_text`] already computed.
pub fn write_chrome_trace<W: Write>(threads: &[&ThreadState], print_method: crate::options::PrintMethod, w: &mut W) -> io::Result<()> {
    let pid = std::process::id();
    write!(w, "[")?;
    let mut first = true;
    for thread in threads {
        let children = tree::build(&thread.arena, print_method);
        for &root_child in &children[0] {
            write_trace_node(thread, &children, root_child, pid, w, &mut first)?;
        }
    }
    write!(w, "]")?;
    Ok(())
}

fn write_trace_node<W: Write>(
    thread: &ThreadState,
    children: &[Vec<RegionId>],
    id: RegionId,
    pid: u32,
    w: &mut W,
    first: &mut bool,
) -> io::Result<()> {
    let region = &thread.arena.regions[id.0];
    let event = json::object! {
        name: region.name.as_str(),
        ph: "X",
        ts: 0.0,
        dur: region.accum * 1_000_000.0,
        pid: pid,
        tid: thread.index,
    };
    if !*first {
        write!(w, ",")?;
    }
    *first = false;
    write!(w, "{}", json::stringify(event))?;
    for &child in &children[id.0] {
        write_trace_node(thread, children, child, pid, w, first)?;
    }
    Ok(())
}
