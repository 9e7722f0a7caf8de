#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Regulation and simulation engine for a power converter: measurement
//! filtering, limit checking, an RST feedback regulator, a reference
//! function generator, and a closed-loop simulator, driven one iteration
//! at a time by an external caller.

pub mod builder;
pub mod channel;
pub mod delay_line;
pub mod error;
pub mod error_monitor;
pub mod filter;
pub mod fixed_point;
pub mod limits;
pub mod load;
pub mod orchestrator;
pub mod refgen;
pub mod rst;
pub mod simulator;
pub mod util;

pub use builder::ConverterEngineBuilder;
pub use error::{BuildError, ConverterError};
pub use orchestrator::{ConverterEngine, RegMode};
