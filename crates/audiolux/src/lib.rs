//! Audiolux - Audio-Reactive Front End
//!
//! The per-iteration loop that feeds an LED animation engine with loudness
//! and spectrum values, plus the pieces the host binary needs around it.

#![warn(missing_docs)]

pub mod cli;
pub mod logging_setup;
pub mod reactive;

pub use reactive::{AudioReactive, IterationReport, HICCUP_THRESHOLD_MS};
