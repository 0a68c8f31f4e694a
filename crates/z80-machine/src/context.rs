//! Loop-scoped execution state: what `execute_machine_loop` is trying to
//! do, and why its last call returned.

/// How `execute_machine_loop` decides when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Run until the configured frame budget is exhausted.
    #[default]
    Normal,
    /// Run until the CPU halts.
    UntilHalt,
    /// Run until PC reaches `ExecutionContext::termination_point`.
    UntilExecutionPoint,
}

/// Why the last `execute_machine_loop` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The configured frame budget was exhausted.
    Normal,
    /// The CPU halted (only returned in `UntilHalt` mode).
    UntilHalt,
    /// PC reached the configured termination point.
    UntilExecutionPoint,
    /// PC reached an address in the breakpoint set.
    Breakpoint,
    /// The caller set the cancellation flag between instructions.
    Cancelled,
}

/// Loop-scoped configuration and the outcome of the last call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionContext {
    pub mode: ExecutionMode,
    pub termination_point: Option<u16>,
    pub last_reason: Option<TerminationReason>,
}
