//! Property-based checks for the invariants in the data model and §8 of
//! the design this crate implements, run over randomly generated nested
//! `start`/`stop` programs. Each test case gets its own [`perfregion::Control`]
//! so proptest's shrinking never sees cross-case interference.

use perfregion::{Control, Opt, PrintMethod};
use proptest::prelude::*;

/// A region invocation with zero or more nested children, used to generate
/// only well-formed (matched) `start`/`stop` sequences.
#[derive(Debug, Clone)]
struct Node {
    name: &'static str,
    children: Vec<Node>,
}

const NAMES: &[&str] = &["A", "B", "C", "D"];

fn node_strategy(depth: u32) -> BoxedStrategy<Node> {
    let name = prop::sample::select(NAMES);
    if depth == 0 {
        name.prop_map(|name| Node { name, children: Vec::new() }).boxed()
    } else {
        (name, prop::collection::vec(node_strategy(depth - 1), 0..3))
            .prop_map(|(name, children)| Node { name, children })
            .boxed()
    }
}

fn forest_strategy() -> impl Strategy<Value = Vec<Node>> {
    prop::collection::vec(node_strategy(3), 0..4)
}

fn run(c: &Control, nodes: &[Node]) {
    for node in nodes {
        c.start(node.name).unwrap();
        run(c, &node.children);
        c.stop(node.name).unwrap();
    }
}

proptest! {
    /// Property 1 & balanced-sequence sanity: after any balanced forest of
    /// start/stop calls, the call stack is back to empty — observed
    /// indirectly by checking a fresh probe region starts and stops cleanly
    /// with no stack-overflow/unbalanced error, which could only happen if
    /// prior frames were left dangling.
    #[test]
    fn balanced_forest_leaves_stack_empty(forest in forest_strategy()) {
        let c = Control::new();
        c.initialize().unwrap();
        run(&c, &forest);

        prop_assert!(c.start("__PROBE__").is_ok());
        prop_assert!(c.stop("__PROBE__").is_ok());
    }

    /// Property 2: count >= nrecurse, accum >= 0, and min <= max once a
    /// region has completed at least one call.
    #[test]
    fn accumulators_stay_consistent(forest in forest_strategy()) {
        let c = Control::new();
        c.initialize().unwrap();
        run(&c, &forest);

        for name in NAMES {
            if let Ok(stats) = c.query(name, 0) {
                prop_assert!(stats.count >= stats.nrecurse);
                prop_assert!(stats.accum >= 0.0);
                if stats.count > 0 {
                    prop_assert!(stats.wall_min <= stats.wall_max);
                }
            }
        }
    }

    /// Property 3: for every region, the sum of per-parent counts plus the
    /// orphan count equals `count - nrecurse`.
    #[test]
    fn parent_counts_plus_orphans_match_completions(forest in forest_strategy()) {
        let c = Control::new();
        c.initialize().unwrap();
        run(&c, &forest);

        for name in NAMES {
            if let Ok(stats) = c.query(name, 0) {
                prop_assert!(stats.count >= stats.nrecurse);
                let from_parents: u64 = stats.parent_counts.iter().sum();
                prop_assert_eq!(from_parents + stats.norphan, stats.count - stats.nrecurse);
            }
        }
    }

    /// Property 4: interning the same name repeatedly never grows the
    /// number of known regions past the number of distinct names used.
    #[test]
    fn intern_is_idempotent(forest in forest_strategy()) {
        let c = Control::new();
        c.initialize().unwrap();
        run(&c, &forest);

        let nregions = c.get_nregions(0).unwrap();
        prop_assert!(nregions <= NAMES.len());
    }

    /// Property 5: under `FullTree`, building the call tree and exporting it
    /// never panics (cycle edges are rejected rather than followed forever)
    /// and produces a non-empty trace whenever at least one region ran.
    #[test]
    fn full_tree_construction_terminates(forest in forest_strategy()) {
        let c = Control::new();
        c.set_option(Opt::PrintMethod(PrintMethod::FullTree)).unwrap();
        c.initialize().unwrap();
        run(&c, &forest);

        let mut out = Vec::new();
        c.to_chrome_trace(&mut out).unwrap();
        if !forest.is_empty() {
            prop_assert!(!out.is_empty());
        }
    }

    /// Property 6: reset zeroes every region's stats but keeps every known
    /// name queryable (with zeroed stats) afterward.
    #[test]
    fn reset_clears_stats_keeps_names(forest in forest_strategy()) {
        let c = Control::new();
        c.initialize().unwrap();
        run(&c, &forest);
        let known: Vec<String> = NAMES
            .iter()
            .filter(|n| c.query(n, 0).is_ok())
            .map(|n| n.to_string())
            .collect();

        c.reset().unwrap();

        for name in &known {
            let stats = c.query(name, 0).unwrap();
            prop_assert_eq!(stats.count, 0);
            prop_assert_eq!(stats.accum, 0.0);
        }
    }

    /// Property 7: replaying the same forest through the handle-based API
    /// produces identical per-name call counts to the name-based API.
    #[test]
    fn handle_matches_name_based_counts(forest in forest_strategy()) {
        let by_name = Control::new();
        by_name.initialize().unwrap();
        run(&by_name, &forest);

        let by_handle = Control::new();
        by_handle.initialize().unwrap();
        run_with_handles(&by_handle, &forest);

        for name in NAMES {
            let a = by_name.query(name, 0).ok().map(|s| s.count);
            let b = by_handle.query(name, 0).ok().map(|s| s.count);
            prop_assert_eq!(a, b);
        }
    }
}

fn run_with_handles(c: &Control, nodes: &[Node]) {
    use std::collections::HashMap;
    // Fresh per call: a `Handle` caches the region id of the arena it was
    // first used against, so reusing one across different `Control`
    // instances would name the wrong region on the second instance.
    let handles: HashMap<&'static str, perfregion::Handle> = NAMES.iter().map(|n| (*n, perfregion::Handle::new())).collect();

    fn go(c: &Control, nodes: &[Node], handles: &HashMap<&'static str, perfregion::Handle>) {
        for node in nodes {
            let h = &handles[node.name];
            c.start_handle(node.name, h).unwrap();
            go(c, &node.children, handles);
            c.stop_handle(h).unwrap();
        }
    }
    go(c, nodes, &handles);
}
