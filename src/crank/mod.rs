//! RoundCrank scheduler with clean module layout.
//!
//! This module provides:
//! - `core`: RoundCrank struct, background-round bookkeeping and initialization
//! - `lifecycle`: the per-tick current-round state machine
//! - `cleanup`: archive -> participant close -> round close for background rounds
//! - `recovery`: rebuilds the pointer and background set after a restart
//! - `tasks`: the poll loop
//! - `tests`: Unit tests for the engine

pub mod cleanup;
pub mod core;
pub mod lifecycle;
pub mod recovery;
pub mod tasks;

pub use cleanup::BackgroundPassSummary;
pub use self::core::{BackgroundRound, CleanupStats, RoundCrank};
pub use lifecycle::{TickAction, TickReport};
pub use recovery::RecoveryReport;
