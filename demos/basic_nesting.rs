//! Minimal nested-region example: times an "outer" region containing two
//! calls to an "inner" region, then prints the hierarchical report.
//!
//! Run with `cargo run --example basic_nesting`.

use std::thread;
use std::time::Duration;

use perfregion::{region, Opt};

fn inner() {
    let _r = region!("inner");
    thread::sleep(Duration::from_millis(5));
}

fn outer() {
    let _r = region!("outer");
    inner();
    inner();
}

fn main() {
    env_logger::init();

    perfregion::set_option(Opt::DoprThreadSort(true)).unwrap();
    perfregion::initialize().expect("at least one time source must be available");

    outer();

    perfregion::pr_by_id(0).unwrap();
    println!("wrote timing.0");

    perfregion::finalize().unwrap();
}
