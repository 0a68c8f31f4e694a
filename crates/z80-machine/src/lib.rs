//! Execution loop and debug surface for a [`zilog_z80::Z80`] core.
//!
//! This crate owns none of the CPU's opcode semantics — that lives in
//! `zilog-z80` — and none of a host's memory map or peripherals. It only
//! drives the fetch/decode/execute cycle until a frame boundary,
//! breakpoint, halt, or caller-chosen termination point is reached.

mod config;
mod context;
mod machine;

pub use config::{ConfigError, MachineConfig};
pub use context::{ExecutionContext, ExecutionMode, TerminationReason};
pub use machine::Machine;
