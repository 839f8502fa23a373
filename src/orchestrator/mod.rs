//! Capture-run orchestration.
//!
//! This module owns the run lifecycle (start/abort/reverse under a single-flight slot)
//! and the progress bus that fans events out to HTTP observers. Transport layers call
//! into [`RunController`] and never touch run state directly.

mod bus;
mod controller;

pub use controller::{RunAccepted, RunController};
