//! A cycle-accurate x86-64 core simulator.
//!
//! This crate implements:
//! 1. **`isa`:** the x86 decoder and basic-block cache, translating byte
//!    streams into `TransOp` micro-op sequences with self-modifying-code
//!    invalidation.
//! 2. **`core`:** the in-order "Atom" pipeline and the out-of-order pipeline
//!    (ROB, physical register file, LSQ, issue queue), plus the external
//!    collaborator traits (`Context`, `MemoryHierarchy`, `BranchPredictor`)
//!    and their lightweight stand-in implementations.
//! 3. **`sim`:** the `Machine`/`Core`/`Thread` driver that ticks the chosen
//!    pipeline engine once per simulated cycle.
//!
//! Configuration, logging, and statistics follow the layering of the crates
//! this one is grounded on: a serde-deserializable `Config` tree, `tracing`
//! events at stage boundaries, and a `SimStats` dumped as YAML.

/// Common types: addresses, code-location identity, traps, register storage.
pub mod common;
/// Machine/queue/decode/MMU/cache configuration tree.
pub mod config;
/// Pipelines, physical register file, state lists, and external collaborators.
pub mod core;
/// x86 decoder, `TransOp`, `BasicBlock`, and the basic-block cache.
pub mod isa;
/// `Machine`/`Core`/`Thread` driver and the CLI-facing `Simulator`.
pub mod sim;
/// Simulation statistics collection and YAML reporting.
pub mod stats;

pub use crate::config::Config;
pub use crate::sim::simulator::Simulator;
