#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Time abstraction shared by the demo CLI and the regulation engine's tests.
//!
//! `Clock` offers a `MonotonicClock` for real wall-clock pacing and a
//! `TestClock` (test-only) for deterministic timing. The engine itself
//! (`converter_core`) never reads the clock: it is a pure function of the
//! values handed to `tick`/`simulate` each iteration, driven externally at a
//! fixed period. Only the CLI's demo loop paces itself against real time.
pub mod clock;

pub use clock::{Clock, MonotonicClock};
