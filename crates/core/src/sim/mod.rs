//! Simulation driver.
//!
//! Wires the `Machine` up to a `Context`/`MemoryHierarchy` pair and exposes
//! a thin, CLI-facing `Simulator` that ticks it to completion. No on-disk
//! binary format is part of the core (spec §6 "Persisted output") — the
//! CLI's own loading of test programs into a `TestContext` lives alongside
//! `main.rs`, not here.

pub mod simulator;
