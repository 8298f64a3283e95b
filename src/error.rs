use thiserror::Error;

/// Error surface of the timing engine. Every public control-surface and
/// start/stop operation returns one of these instead of aborting, unless
/// `abort_on_error` has been set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("timing library is not initialized")]
    NotInitialized,

    #[error("timing library is already initialized")]
    AlreadyInitialized,

    #[error("unrecognized option")]
    BadOption,

    #[error("value out of range for option")]
    BadValue,

    #[error("number of threads exceeds configured maxthreads")]
    ThreadOverflow,

    #[error("call stack nesting exceeds the compiled-in MAX_STACK bound")]
    StackOverflow,

    #[error("stop() called for region \"{0}\" which is not currently running")]
    UnbalancedStop(String),

    #[error("unknown region \"{0}\"")]
    UnknownTimer(String),

    #[error("selected time source is unavailable")]
    TimeSourceUnavailable,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
