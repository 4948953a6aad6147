//! Operator console tooling shared by host front-ends.
//!
//! The console grammar lives in [`grammar`] and is implemented with a
//! bounded token/parse pipeline; [`commands`] routes parsed commands into a
//! [`commands::SimulationHost`].

pub mod catalog;
pub mod commands;
pub mod grammar;
pub mod status;
