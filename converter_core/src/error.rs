//! Domain and build errors for the regulation engine.
//!
//! Runtime faults never abort the tick loop: they surface as sticky flags
//! read from channel state. `ConverterError` and `Result` exist for the
//! handful of calls that *can* fail outright — non-RT construction, RST
//! design, and the demo CLI's I/O.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConverterError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("rst design rejected: {0}")]
    RstDesign(String),
    #[error("engine not initialized")]
    NotInitialized,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("iter_period must be > 0")]
    InvalidIterPeriod,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("missing load parameters")]
    MissingLoad,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
