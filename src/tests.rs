//! Deterministic scenario and boundary tests for the control surface.
//! Each test builds its own [`crate::Control`] instance so tests never
//! contend the process-wide singleton or each other's state, even when
//! `cargo test` runs them on a shared thread pool.

use std::thread;

use serial_test::serial;

use crate::options::{Opt, PrintMethod};
use crate::{Control, Error};

fn fresh() -> Control {
    let c = Control::new();
    c.initialize().unwrap();
    c
}

/// S1 — simple nesting: `outer` contains `inner`, both called once, and the
/// parent's accumulated wallclock is at least the child's.
#[test]
fn s1_simple_nesting() {
    let c = fresh();
    c.start("outer").unwrap();
    c.start("inner").unwrap();
    c.stop("inner").unwrap();
    c.stop("outer").unwrap();

    let outer = c.query("outer", 0).unwrap();
    let inner = c.query("inner", 0).unwrap();
    assert_eq!(outer.count, 1);
    assert_eq!(inner.count, 1);
    assert!(outer.accum >= inner.accum);
}

/// S2 — multiple parents under `FullTree`: `C` is observed under both `A`
/// and `B`, so it ends up with two parents, one call each.
#[test]
fn s2_multiple_parents() {
    let c = Control::new();
    c.set_option(Opt::PrintMethod(PrintMethod::FullTree)).unwrap();
    c.initialize().unwrap();

    c.start("A").unwrap();
    c.start("C").unwrap();
    c.stop("C").unwrap();
    c.stop("A").unwrap();
    c.start("B").unwrap();
    c.start("C").unwrap();
    c.stop("C").unwrap();
    c.stop("B").unwrap();

    let region_c = c.query("C", 0).unwrap();
    assert_eq!(region_c.nparent, 2);
    assert_eq!(region_c.count, 2);
    assert_eq!(region_c.parent_counts, vec![1, 1]);
}

/// S3 — recursion: three nested starts of the same region collapse into one
/// wall measurement spanning only the outermost pair.
#[test]
fn s3_recursion() {
    let c = fresh();
    c.start("R").unwrap();
    c.start("R").unwrap();
    c.start("R").unwrap();
    c.stop("R").unwrap();
    c.stop("R").unwrap();
    c.stop("R").unwrap();

    let r = c.query("R", 0).unwrap();
    assert_eq!(r.count, 3);
    assert_eq!(r.nrecurse, 2);
}

/// S4 — unbalanced stop: stopping a region that was never started is an
/// `unknown_timer` error, and the region that really is open is unaffected.
#[test]
fn s4_unbalanced_stop() {
    let c = fresh();
    c.start("A").unwrap();
    let err = c.stop("B").unwrap_err();
    assert_eq!(err, Error::UnknownTimer("B".to_string()));

    // A is still open; stopping it completes normally.
    c.stop("A").unwrap();
    let a = c.query("A", 0).unwrap();
    assert_eq!(a.count, 1);
}

/// Stopping a region that IS known but not currently on is `unbalanced_stop`.
#[test]
fn stop_while_off_is_unbalanced() {
    let c = fresh();
    c.start("A").unwrap();
    c.stop("A").unwrap();
    let err = c.stop("A").unwrap_err();
    assert_eq!(err, Error::UnbalancedStop("A".to_string()));
}

/// S5 — depthlimit: with `depthlimit = 2`, only the first two nested starts
/// acquire stats; the third is silently suppressed, and all three matching
/// stops still restore the stack to empty.
#[test]
fn s5_depthlimit() {
    let c = Control::new();
    c.set_option(Opt::DepthLimit(2)).unwrap();
    c.initialize().unwrap();

    c.start("A").unwrap();
    c.start("B").unwrap();
    c.start("C").unwrap();
    c.stop("C").unwrap();
    c.stop("B").unwrap();
    c.stop("A").unwrap();

    assert_eq!(c.query("A", 0).unwrap().count, 1);
    assert_eq!(c.query("B", 0).unwrap().count, 1);
    assert!(c.query("C", 0).is_err());
}

/// S6 — threaded isolation: two threads each time "X" once; each thread's
/// region is independent, and the cross-thread summary sees both.
#[test]
fn s6_threaded_isolation() {
    let c = std::sync::Arc::new(fresh());
    let c1 = c.clone();
    let c2 = c.clone();
    let t1 = thread::spawn(move || {
        c1.start("X").unwrap();
        c1.stop("X").unwrap();
    });
    let t2 = thread::spawn(move || {
        c2.start("X").unwrap();
        c2.stop("X").unwrap();
    });
    t1.join().unwrap();
    t2.join().unwrap();

    let summary = c.get_threadstats("X").unwrap();
    assert_eq!(summary.calls, 2);
}

/// `intern` is idempotent: repeated interning of the same name does not grow
/// the insertion-ordered arena (§8 property 4).
#[test]
fn intern_is_idempotent() {
    let c = fresh();
    for _ in 0..10 {
        c.start("A").unwrap();
        c.stop("A").unwrap();
    }
    assert_eq!(c.get_nregions(0).unwrap(), 1);
}

/// Reset leaves every region with zeroed stats but preserves known names
/// (§8 property 6).
#[test]
fn reset_clears_stats_keeps_names() {
    let c = fresh();
    c.start("A").unwrap();
    c.stop("A").unwrap();
    c.reset().unwrap();

    let a = c.query("A", 0).unwrap();
    assert_eq!(a.count, 0);
    assert_eq!(a.accum, 0.0);
    assert_eq!(c.get_nregions(0).unwrap(), 1);
}

/// Handle-based start/stop is observably equivalent to name-based start/stop
/// (§8 property 7).
#[test]
fn handle_equivalent_to_name() {
    use crate::Handle;

    let by_name = fresh();
    by_name.start("A").unwrap();
    by_name.stop("A").unwrap();
    by_name.start("A").unwrap();
    by_name.stop("A").unwrap();

    let by_handle = fresh();
    let handle = Handle::new();
    by_handle.start_handle("A", &handle).unwrap();
    by_handle.stop_handle(&handle).unwrap();
    by_handle.start_handle("A", &handle).unwrap();
    by_handle.stop_handle(&handle).unwrap();

    assert_eq!(by_name.query("A", 0).unwrap().count, by_handle.query("A", 0).unwrap().count);
}

/// Disabling the library suppresses all start/stop effects.
#[test]
fn disable_suppresses_timing() {
    let c = fresh();
    c.disable().unwrap();
    c.start("A").unwrap();
    c.stop("A").unwrap();
    assert!(c.query("A", 0).is_err(), "disabled start/stop must not intern anything");
}

/// A name longer than `MAX_CHARS` is truncated silently, and two names
/// sharing the truncated prefix collide into a single region.
#[test]
fn long_names_truncate_and_collide() {
    let c = fresh();
    let long_a = format!("{}TAIL_A", "x".repeat(70));
    let long_b = format!("{}TAIL_B", "x".repeat(70));
    c.start(&long_a).unwrap();
    c.stop(&long_a).unwrap();
    c.start(&long_b).unwrap();
    c.stop(&long_b).unwrap();

    // Both truncate to the same 63-byte (MAX_CHARS) prefix, so only one
    // region exists.
    assert_eq!(c.get_nregions(0).unwrap(), 1);
    let truncated_name = c.get_regionname(0, 0).unwrap();
    assert_eq!(truncated_name.len(), 63);
}

/// Operating before `initialize` surfaces `not_initialized` rather than
/// panicking.
#[test]
fn not_initialized_is_an_error() {
    let c = Control::new();
    assert_eq!(c.start("A").unwrap_err(), Error::NotInitialized);
    assert!(!c.is_initialized());
}

/// `initialize` twice in a row is rejected.
#[test]
fn double_initialize_is_an_error() {
    let c = fresh();
    assert_eq!(c.initialize().unwrap_err(), Error::AlreadyInitialized);
}

/// `set_option` after `initialize` is rejected; configuration is frozen.
#[test]
fn set_option_after_initialize_is_an_error() {
    let c = fresh();
    assert_eq!(c.set_option(Opt::Wall(false)).unwrap_err(), Error::AlreadyInitialized);
}

/// `FullTree` construction never introduces a cycle even when the same
/// region is observed under mutually recursive parents across many calls;
/// every region stays reachable from the sentinel root once a tree is built.
#[test]
fn full_tree_never_cycles() {
    let c = Control::new();
    c.set_option(Opt::PrintMethod(PrintMethod::FullTree)).unwrap();
    c.initialize().unwrap();

    // A under B, and B under A, across two separate call sequences.
    c.start("A").unwrap();
    c.start("B").unwrap();
    c.stop("B").unwrap();
    c.stop("A").unwrap();
    c.start("B").unwrap();
    c.start("A").unwrap();
    c.stop("A").unwrap();
    c.stop("B").unwrap();

    let mut out = Vec::new();
    c.to_chrome_trace(&mut out).unwrap();
    let trace = std::str::from_utf8(&out).unwrap();
    let parsed = json::parse(trace).unwrap();
    let names: Vec<&str> = parsed.members().map(|ev| ev["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"A"), "A missing from trace, got {names:?}");
    assert!(names.contains(&"B"), "B missing from trace, got {names:?}");
}

/// The crate-level free functions operate on one process-wide singleton
/// (`crate::global()`), so these tests run `#[serial]` rather than each
/// building their own isolated `Control` like the tests above.
#[serial]
#[test]
fn free_functions_mirror_the_global_singleton() {
    if crate::is_initialized() {
        crate::finalize().unwrap();
    }

    crate::initialize().unwrap();
    crate::start("global_region").unwrap();
    crate::stop("global_region").unwrap();

    let stats = crate::query("global_region", 0).unwrap();
    assert_eq!(stats.count, 1);
    assert!(crate::get_wallclock("global_region", 0).unwrap() >= 0.0);

    crate::finalize().unwrap();
    assert!(!crate::is_initialized());
}

#[serial]
#[test]
fn global_singleton_rejects_double_initialize() {
    if crate::is_initialized() {
        crate::finalize().unwrap();
    }
    crate::initialize().unwrap();
    assert_eq!(crate::initialize().unwrap_err(), Error::AlreadyInitialized);
    crate::finalize().unwrap();
}
