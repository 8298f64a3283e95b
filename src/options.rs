use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Parent-selection policy used by the call-tree constructor (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintMethod {
    FirstParent,
    LastParent,
    MostFrequent,
    FullTree,
}

impl Default for PrintMethod {
    fn default() -> Self {
        PrintMethod::FirstParent
    }
}

/// One recognized `set_option` identifier, paired with its value.
#[derive(Debug, Clone)]
pub enum Opt {
    Wall(bool),
    Cpu(bool),
    AbortOnError(bool),
    Overhead(bool),
    DepthLimit(usize),
    Verbose(bool),
    Percent(bool),
    DoprPreamble(bool),
    DoprThreadSort(bool),
    DoprMultParent(bool),
    DoprCollision(bool),
    DoprMemUsage(bool),
    PrintMethod(PrintMethod),
    TableSize(usize),
    MaxThreads(usize),
    /// Pass-through option for a hardware-counter adapter the core does not interpret.
    HwPassthrough(String, String),
}

/// Immutable-after-`initialize` configuration block (control surface, §4.8).
#[derive(Debug, Clone)]
pub struct Options {
    pub wall: bool,
    pub cpu: bool,
    pub abort_on_error: bool,
    pub overhead: bool,
    pub depthlimit: usize,
    pub verbose: bool,
    pub percent: bool,
    pub dopr_preamble: bool,
    pub dopr_threadsort: bool,
    pub dopr_multparent: bool,
    pub dopr_collision: bool,
    pub dopr_memusage: bool,
    pub print_method: PrintMethod,
    pub tablesize: usize,
    pub maxthreads: usize,
    pub hw_passthrough: BTreeMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            wall: true,
            cpu: false,
            abort_on_error: false,
            overhead: true,
            depthlimit: usize::MAX,
            verbose: false,
            percent: false,
            dopr_preamble: true,
            dopr_threadsort: false,
            dopr_multparent: false,
            dopr_collision: false,
            dopr_memusage: false,
            print_method: PrintMethod::default(),
            tablesize: 1023,
            maxthreads: 64,
            hw_passthrough: BTreeMap::new(),
        }
    }
}

impl Options {
    /// Applies one option. Returns `BadValue` for a recognized option given an
    /// out-of-range value; there is no `BadOption` case in Rust since `Opt` is
    /// already a closed, typed enumeration of the recognized identifiers.
    pub fn apply(&mut self, opt: Opt) -> Result<()> {
        match opt {
            Opt::Wall(v) => self.wall = v,
            Opt::Cpu(v) => self.cpu = v,
            Opt::AbortOnError(v) => self.abort_on_error = v,
            Opt::Overhead(v) => self.overhead = v,
            Opt::DepthLimit(v) => self.depthlimit = v,
            Opt::Verbose(v) => self.verbose = v,
            Opt::Percent(v) => self.percent = v,
            Opt::DoprPreamble(v) => self.dopr_preamble = v,
            Opt::DoprThreadSort(v) => self.dopr_threadsort = v,
            Opt::DoprMultParent(v) => self.dopr_multparent = v,
            Opt::DoprCollision(v) => self.dopr_collision = v,
            Opt::DoprMemUsage(v) => self.dopr_memusage = v,
            Opt::PrintMethod(v) => self.print_method = v,
            Opt::TableSize(v) => {
                if v == 0 {
                    return Err(Error::BadValue);
                }
                self.tablesize = v;
            }
            Opt::MaxThreads(v) => {
                if v == 0 {
                    return Err(Error::BadValue);
                }
                self.maxthreads = v;
            }
            Opt::HwPassthrough(k, v) => {
                self.hw_passthrough.insert(k, v);
            }
        }
        Ok(())
    }
}
