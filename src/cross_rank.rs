//! Cross-rank summary boundary (§4.9). The core computes the per-process
//! summary a real interprocess aggregator would reduce across ranks; the
//! reduction itself is an external collaborator this crate only defines the
//! seam for.

use crate::engine::ThreadState;
use crate::error::{Error, Result};

/// Identifies which thread produced an extreme value.
pub type Producer = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalRegionStats {
    pub name: String,
    pub calls: u64,
    pub wall_max: f64,
    pub wall_max_producer: Producer,
    pub wall_min: f64,
    pub wall_min_producer: Producer,
}

/// Computes [`GlobalRegionStats`] for `name` across every thread registered
/// in this process, as `get_threadstats` does in the source this design is
/// drawn from.
pub fn get_threadstats(threads: &[&ThreadState], name: &str) -> Result<GlobalRegionStats> {
    let mut calls = 0u64;
    let mut wall_max = f64::MIN;
    let mut wall_max_producer = 0usize;
    let mut wall_min = f64::MAX;
    let mut wall_min_producer = 0usize;
    let mut found = false;

    for thread in threads {
        if let Some(id) = thread.arena.find(name) {
            let region = &thread.arena.regions[id.0];
            found = true;
            calls += region.count;
            if region.count > 0 {
                if region.wall_max > wall_max {
                    wall_max = region.wall_max;
                    wall_max_producer = thread.index;
                }
                if region.wall_min < wall_min {
                    wall_min = region.wall_min;
                    wall_min_producer = thread.index;
                }
            }
        }
    }

    if !found {
        return Err(Error::UnknownTimer(name.to_string()));
    }
    Ok(GlobalRegionStats {
        name: name.to_string(),
        calls,
        wall_max,
        wall_max_producer,
        wall_min,
        wall_min_producer,
    })
}

/// Folds per-rank [`GlobalRegionStats`] into one record. A real multi-process
/// build would implement this with a log-depth tree reduction computing a
/// running mean and M2 (Welford/Chan) over per-rank `wall_max` values before
/// the designated root prints a summary; this crate ships only the
/// single-rank identity, since interprocess reduction is outside the core.
pub trait RankReducer {
    fn reduce(&self, per_rank: &[GlobalRegionStats]) -> Option<GlobalRegionStats>;
}

pub struct SingleRank;

impl RankReducer for SingleRank {
    fn reduce(&self, per_rank: &[GlobalRegionStats]) -> Option<GlobalRegionStats> {
        per_rank.first().cloned()
    }
}
