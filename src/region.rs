//! Per-thread region entry and hash index (§4.3).

/// Region names are truncated to this many bytes; truncation is silent.
pub const MAX_CHARS: usize = 63;

/// Index of a region within its owning thread's [`RegionArena`]. Index `0` is
/// always the sentinel root. Never compared across threads: each thread owns
/// its own arena, so the same `RegionId` means different things on different
/// threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub usize);

pub const ROOT: RegionId = RegionId(0);

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub count: u64,
    pub nrecurse: u64,
    pub recurselvl: u32,
    pub onflg: bool,
    pub accum: f64,
    pub wall_min: f64,
    pub wall_max: f64,
    pub last_start: f64,
    pub cpu_accum_user: f64,
    pub cpu_accum_sys: f64,
    pub cpu_last_user: f64,
    pub cpu_last_sys: f64,
    pub parent: Vec<RegionId>,
    pub parent_count: Vec<u64>,
    pub norphan: u64,
}

impl Region {
    fn new(name: String) -> Self {
        Self {
            name,
            count: 0,
            nrecurse: 0,
            recurselvl: 0,
            onflg: false,
            accum: 0.0,
            wall_min: 0.0,
            wall_max: 0.0,
            last_start: 0.0,
            cpu_accum_user: 0.0,
            cpu_accum_sys: 0.0,
            cpu_last_user: 0.0,
            cpu_last_sys: 0.0,
            parent: Vec::new(),
            parent_count: Vec::new(),
            norphan: 0,
        }
    }

    /// Number of distinct parents observed for this region.
    pub fn nparent(&self) -> usize {
        self.parent.len()
    }

    fn reset_stats(&mut self) {
        self.count = 0;
        self.nrecurse = 0;
        self.recurselvl = 0;
        self.onflg = false;
        self.accum = 0.0;
        self.wall_min = 0.0;
        self.wall_max = 0.0;
        self.cpu_accum_user = 0.0;
        self.cpu_accum_sys = 0.0;
        self.parent.clear();
        self.parent_count.clear();
        self.norphan = 0;
    }
}

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_CHARS {
        return name.to_string();
    }
    let mut end = MAX_CHARS;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Hash of a name: sum of `byte_value * (1-based position)` over the first
/// [`MAX_CHARS`] bytes, modulo `tablesize`.
fn hash_name(name: &str, tablesize: usize) -> usize {
    let sum: u64 = name
        .as_bytes()
        .iter()
        .take(MAX_CHARS)
        .enumerate()
        .map(|(i, b)| (*b as u64) * (i as u64 + 1))
        .sum();
    (sum % tablesize as u64) as usize
}

/// Hash of an instrumentation address: `(address >> 4) mod tablesize`.
fn hash_addr(addr: usize, tablesize: usize) -> usize {
    (addr >> 4) % tablesize
}

/// Per-thread region entries plus the hash index over them. The arena is the
/// insertion-ordered list from §4.3; `buckets[i]` holds the `RegionId`s whose
/// name (or address) hashes to bucket `i`, searched linearly on collision.
#[derive(Debug)]
pub struct RegionArena {
    pub regions: Vec<Region>,
    buckets: Vec<Vec<RegionId>>,
    tablesize: usize,
    max_name_len: usize,
}

impl RegionArena {
    pub fn new(tablesize: usize) -> Self {
        let mut regions = Vec::with_capacity(64);
        regions.push(Region::new("(root)".to_string()));
        Self {
            regions,
            buckets: vec![Vec::new(); tablesize],
            tablesize,
            max_name_len: 0,
        }
    }

    pub fn tablesize(&self) -> usize {
        self.tablesize
    }

    pub fn max_name_len(&self) -> usize {
        self.max_name_len
    }

    pub fn find(&self, name: &str) -> Option<RegionId> {
        let truncated = truncate_name(name);
        let bucket = &self.buckets[hash_name(&truncated, self.tablesize)];
        bucket
            .iter()
            .copied()
            .find(|id| self.regions[id.0].name == truncated)
    }

    pub fn find_addr(&self, addr: usize) -> Option<RegionId> {
        let name = format!("{addr:#x}");
        let bucket = &self.buckets[hash_addr(addr, self.tablesize)];
        bucket
            .iter()
            .copied()
            .find(|id| self.regions[id.0].name == name)
    }

    /// Returns the existing entry for `name` or creates one. Idempotent: a
    /// repeated intern of the same name returns the same `RegionId` and does
    /// not grow the arena (§8 property 4).
    pub fn intern(&mut self, name: &str) -> RegionId {
        let truncated = truncate_name(name);
        let bucket_idx = hash_name(&truncated, self.tablesize);
        if let Some(id) = self.buckets[bucket_idx]
            .iter()
            .copied()
            .find(|id| self.regions[id.0].name == truncated)
        {
            return id;
        }
        self.max_name_len = self.max_name_len.max(truncated.len());
        let id = RegionId(self.regions.len());
        self.regions.push(Region::new(truncated));
        self.buckets[bucket_idx].push(id);
        id
    }

    pub fn intern_addr(&mut self, addr: usize) -> RegionId {
        let name = format!("{addr:#x}");
        let bucket_idx = hash_addr(addr, self.tablesize);
        if let Some(id) = self.buckets[bucket_idx]
            .iter()
            .copied()
            .find(|id| self.regions[id.0].name == name)
        {
            return id;
        }
        self.max_name_len = self.max_name_len.max(name.len());
        let id = RegionId(self.regions.len());
        self.regions.push(Region::new(name));
        self.buckets[bucket_idx].push(id);
        id
    }

    /// Drops all accumulated statistics but keeps every known region name
    /// (§8 property 6).
    pub fn reset(&mut self) {
        for region in self.regions.iter_mut().skip(1) {
            region.reset_stats();
        }
    }

    /// `(empty, single, double, more_than_two)` bucket occupancy counts, for
    /// the collision diagnostics section of the reporter.
    pub fn bucket_histogram(&self) -> (usize, usize, usize, usize) {
        let mut h = (0, 0, 0, 0);
        for bucket in &self.buckets {
            match bucket.len() {
                0 => h.0 += 1,
                1 => h.1 += 1,
                2 => h.2 += 1,
                _ => h.3 += 1,
            }
        }
        h
    }

    /// Buckets with more than one entry, as `(bucket_index, names)`.
    pub fn colliding_buckets(&self) -> Vec<(usize, Vec<&str>)> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() > 1)
            .map(|(i, b)| (i, b.iter().map(|id| self.regions[id.0].name.as_str()).collect()))
            .collect()
    }

    pub fn max_chain_len(&self) -> usize {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn total_collisions(&self) -> usize {
        self.buckets.iter().map(|b| b.len().saturating_sub(1)).sum()
    }

    /// Rough memory footprint of this arena's structures, in bytes.
    pub fn approx_bytes(&self) -> usize {
        let region_bytes = self.regions.len() * std::mem::size_of::<Region>();
        let parent_bytes: usize = self
            .regions
            .iter()
            .map(|r| r.parent.capacity() * std::mem::size_of::<RegionId>() + r.parent_count.capacity() * 8)
            .sum();
        let bucket_bytes = self.buckets.iter().map(|b| b.capacity() * std::mem::size_of::<RegionId>()).sum::<usize>();
        region_bytes + parent_bytes + bucket_bytes
    }
}
