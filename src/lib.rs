//! Boomerang is a framework for building and executing stateful, deterministic Reactors.
//!
//! This crate is the thin public facade over the scheduling core: the reaction
//! queue, the Global Earliest-Deadline-First Non-Preemptive (GEDF-NP) scheduler,
//! and the watchdog subsystem, all of which live in [`boomerang_runtime`].

pub use boomerang_core as core;
pub use boomerang_runtime as runtime;
