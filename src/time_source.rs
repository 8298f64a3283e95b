//! Time source driver table (§4.1). Six sources, matching the fixed set in
//! the data model: an x86 TSC-derived nanotime, a clock_gettime-equivalent,
//! a gettimeofday-equivalent, an MPI_Wtime placeholder, a PAPI real-usec
//! placeholder, and a placebo that always succeeds.

use log::warn;

use crate::error::{Error, Result};
use crate::platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSourceId {
    Tsc,
    ClockGettime,
    Gettimeofday,
    MpiWtime,
    PapiRealUsec,
    Placebo,
}

impl TimeSourceId {
    /// Attempts to initialize this source. The MPI and PAPI placeholders
    /// always fail here: the interprocess reducer and the hardware-counter
    /// adapter are external collaborators this crate does not embed.
    fn init(self) -> Result<TimeSourceState> {
        match self {
            TimeSourceId::Tsc => {
                let hz = platform::tsc_init().ok_or(Error::TimeSourceUnavailable)?;
                Ok(TimeSourceState::Tsc { hz })
            }
            TimeSourceId::ClockGettime => Ok(TimeSourceState::ClockGettime),
            TimeSourceId::Gettimeofday => Ok(TimeSourceState::Gettimeofday),
            TimeSourceId::MpiWtime => Err(Error::TimeSourceUnavailable),
            TimeSourceId::PapiRealUsec => Err(Error::TimeSourceUnavailable),
            TimeSourceId::Placebo => Ok(TimeSourceState::Placebo),
        }
    }
}

/// A successfully initialized time source, ready for repeated `now()` calls.
#[derive(Debug, Clone, Copy)]
pub enum TimeSourceState {
    Tsc { hz: f64 },
    ClockGettime,
    Gettimeofday,
    Placebo,
}

impl TimeSourceState {
    /// Reentrant, side-effect-free apart from reading the underlying clock.
    #[inline]
    pub fn now(self) -> f64 {
        match self {
            TimeSourceState::Tsc { hz } => platform::tsc_now_ticks() / hz,
            TimeSourceState::ClockGettime => platform::clock_gettime_now(),
            TimeSourceState::Gettimeofday => platform::gettimeofday_now(),
            TimeSourceState::Placebo => 0.0,
        }
    }
}

/// Resolves `id`, falling back to the gettimeofday-equivalent source on
/// failure and logging the fallback. The contract is that at least one
/// source must work for `initialize` to succeed; gettimeofday always does.
pub fn resolve_with_fallback(id: TimeSourceId) -> TimeSourceState {
    match id.init() {
        Ok(state) => state,
        Err(_) => {
            warn!("time source {id:?} unavailable, falling back to gettimeofday");
            TimeSourceId::Gettimeofday
                .init()
                .expect("gettimeofday source must always succeed")
        }
    }
}

/// Used by `set_time_source`, which must fail rather than silently fall back
/// (the automatic fallback only happens inside `initialize`).
pub fn try_init(id: TimeSourceId) -> Result<TimeSourceState> {
    id.init()
}
