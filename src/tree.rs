//! Call-tree constructor (§4.6): builds a parent→children DAG from each
//! region's recorded parent set, under one of four parent-selection
//! policies, rejecting any edge that would close a cycle.

use log::warn;

use crate::options::PrintMethod;
use crate::region::{RegionArena, RegionId, ROOT};

/// `children[i]` holds the child region ids attached to region `i`. Computed
/// fresh from the arena's parent sets rather than stored on `Region`, so
/// building a tree never needs mutable access to a structure the reporter
/// and cross-thread queries read concurrently with other threads' hot paths.
pub fn build(arena: &RegionArena, policy: PrintMethod) -> Vec<Vec<RegionId>> {
    let n = arena.regions.len();
    let mut children: Vec<Vec<RegionId>> = vec![Vec::new(); n];

    for idx in 1..n {
        let region = &arena.regions[idx];
        let child = RegionId(idx);
        if region.parent.is_empty() {
            // Orphan-only region: its only recorded ancestor is the sentinel.
            try_add_edge(arena, &mut children, ROOT, child);
            continue;
        }
        let attached = match policy {
            PrintMethod::FirstParent => try_add_edge(arena, &mut children, region.parent[0], child),
            PrintMethod::LastParent => {
                let last = *region.parent.last().unwrap();
                try_add_edge(arena, &mut children, last, child)
            }
            PrintMethod::MostFrequent => {
                let best = region
                    .parent
                    .iter()
                    .zip(region.parent_count.iter())
                    .max_by_key(|(_, count)| **count)
                    .map(|(p, _)| *p)
                    .unwrap();
                try_add_edge(arena, &mut children, best, child)
            }
            PrintMethod::FullTree => {
                let mut any = false;
                for &parent in &region.parent {
                    any |= try_add_edge(arena, &mut children, parent, child);
                }
                any
            }
        };
        // Every candidate edge was rejected as a cycle (or was a self-parent):
        // attach under the sentinel root rather than leave the region
        // unreachable from it (§4.6, §8 property 5).
        if !attached {
            try_add_edge(arena, &mut children, ROOT, child);
        }
    }
    children
}

fn try_add_edge(arena: &RegionArena, children: &mut [Vec<RegionId>], parent: RegionId, child: RegionId) -> bool {
    if parent == child {
        return false;
    }
    if reachable(children, child, parent) {
        warn!(
            "rejecting edge {} -> {} that would close a cycle",
            arena.regions[parent.0].name, arena.regions[child.0].name
        );
        return false;
    }
    children[parent.0].push(child);
    true
}

/// Whether `to` is reachable from `from` via already-added child edges.
fn reachable(children: &[Vec<RegionId>], from: RegionId, to: RegionId) -> bool {
    let mut stack = vec![from];
    let mut seen = vec![false; children.len()];
    while let Some(cur) = stack.pop() {
        if cur == to {
            return true;
        }
        if seen[cur.0] {
            continue;
        }
        seen[cur.0] = true;
        for &next in &children[cur.0] {
            stack.push(next);
        }
    }
    false
}
