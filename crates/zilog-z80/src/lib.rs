//! Cycle-accurate Zilog Z80 CPU core.
//!
//! `Z80::tick()` steps the machine exactly one T-state at a time, driven by
//! a queue of micro-ops rather than a per-instruction dispatch loop, so
//! callers can interleave memory/IO contention and interrupt sampling at
//! T-state granularity instead of only between instructions.

mod alu;
mod cpu;
mod flags;
mod microcode;
mod registers;

pub use cpu::Z80;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::Registers;

#[cfg(feature = "test-utils")]
pub use microcode::MicroOp;
