//! Machine-shell configuration and its error type.

use std::error::Error;
use std::fmt;

/// Host-supplied timing configuration for a [`crate::Machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Base clock frequency in Hz, e.g. 3_500_000 for a 48K Spectrum.
    pub base_clock_hz: u32,
    /// Integer multiplier applied on top of the base clock. Must be
    /// nonzero; takes effect through `configure()` or, for
    /// `set_clock_multiplier()`, at the next frame boundary.
    pub clock_multiplier: u32,
    /// T-state budget per frame; the unit at which the loop samples
    /// clock-multiplier changes and invokes the per-frame hook.
    pub ticks_per_frame: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            base_clock_hz: 3_500_000,
            clock_multiplier: 1,
            ticks_per_frame: 69_888,
        }
    }
}

/// Errors raised while configuring a [`crate::Machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A clock multiplier of 0 was requested; the clock would never run.
    InvalidClockMultiplier(u32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidClockMultiplier(value) => {
                write!(f, "invalid clock multiplier: {value} (must be >= 1)")
            }
        }
    }
}

impl Error for ConfigError {}
