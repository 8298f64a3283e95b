//! Public, owned snapshot of one region's statistics, as returned by
//! [`crate::query`]. Kept distinct from the internal `region::Region` so
//! that callers observe a stable value rather than a borrow into a thread's
//! live arena (which the hot path may still be mutating on other threads).

#[derive(Debug, Clone, PartialEq)]
pub struct RegionStats {
    pub name: String,
    pub count: u64,
    pub nrecurse: u64,
    pub accum: f64,
    pub wall_min: f64,
    pub wall_max: f64,
    pub cpu_user: f64,
    pub cpu_sys: f64,
    pub nparent: usize,
    pub norphan: u64,
    /// Per-parent invocation counts, in first-observed order. Invariant
    /// (§8 property 3): `parent_counts.iter().sum::<u64>() + norphan ==
    /// count - nrecurse`.
    pub parent_counts: Vec<u64>,
}
