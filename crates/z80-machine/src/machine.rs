//! The execution loop and debug surface wrapping a [`Z80`] and a host bus.

use std::collections::HashSet;

use emu_core::{Bus, Cpu};
use zilog_z80::Z80;

use crate::config::{ConfigError, MachineConfig};
use crate::context::{ExecutionContext, ExecutionMode, TerminationReason};

type InterruptHook<B> = Box<dyn FnMut(&Z80, &B) -> bool>;
type FrameHook<B> = Box<dyn FnMut(&mut Z80, &mut B)>;
type InstructionHook<B> = Box<dyn FnMut(&Z80, &B)>;

/// Drives a [`Z80`] against a host-supplied [`Bus`] until a frame boundary,
/// breakpoint, halt, or user-requested termination point is reached.
///
/// The shell owns no RAM and interprets "frame" only as a T-state budget;
/// it has no notion of video or audio timing of its own.
pub struct Machine<B: Bus> {
    pub cpu: Z80,
    pub bus: B,

    config: MachineConfig,
    pending_multiplier: Option<u32>,
    frame_tacts: u64,

    ctx: ExecutionContext,
    startup_breakpoint: Option<u16>,
    breakpoints: HashSet<u16>,
    cancelled: bool,

    should_raise_interrupt: Option<InterruptHook<B>>,
    per_frame_hook: Option<FrameHook<B>>,
    per_instruction_hook: Option<InstructionHook<B>>,
}

impl<B: Bus> Machine<B> {
    pub fn new(bus: B) -> Self {
        Self {
            cpu: Z80::new(),
            bus,
            config: MachineConfig::default(),
            pending_multiplier: None,
            frame_tacts: 0,
            ctx: ExecutionContext::default(),
            startup_breakpoint: None,
            breakpoints: HashSet::new(),
            cancelled: false,
            should_raise_interrupt: None,
            per_frame_hook: None,
            per_instruction_hook: None,
        }
    }

    /// Installs the hook consulted once per instruction boundary to decide
    /// whether a maskable interrupt should be asserted this round.
    pub fn set_interrupt_hook(&mut self, hook: impl FnMut(&Z80, &B) -> bool + 'static) {
        self.should_raise_interrupt = Some(Box::new(hook));
    }

    /// Installs the hook run when the frame budget is exhausted, before the
    /// next instruction starts.
    pub fn set_frame_hook(&mut self, hook: impl FnMut(&mut Z80, &mut B) + 'static) {
        self.per_frame_hook = Some(Box::new(hook));
    }

    /// Installs the hook run after every completed instruction.
    pub fn set_instruction_hook(&mut self, hook: impl FnMut(&Z80, &B) + 'static) {
        self.per_instruction_hook = Some(Box::new(hook));
    }

    #[must_use]
    pub const fn config(&self) -> MachineConfig {
        self.config
    }

    #[must_use]
    pub const fn execution_context(&self) -> ExecutionContext {
        self.ctx
    }

    pub fn set_mode(&mut self, mode: ExecutionMode, termination_point: Option<u16>) {
        self.ctx.mode = mode;
        self.ctx.termination_point = termination_point;
    }

    #[must_use]
    pub const fn startup_breakpoint(&self) -> Option<u16> {
        self.startup_breakpoint
    }

    pub fn add_breakpoint(&mut self, address: u16) {
        self.breakpoints.insert(address);
    }

    pub fn remove_breakpoint(&mut self, address: u16) {
        self.breakpoints.remove(&address);
    }

    #[must_use]
    pub fn breakpoints(&self) -> &HashSet<u16> {
        &self.breakpoints
    }

    /// Requests that the next `execute_machine_loop` call stop between
    /// instructions rather than running to frame completion.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Idempotent (re)initialization after peripheral changes: adopts the
    /// given configuration immediately, including any clock multiplier
    /// change that `set_clock_multiplier` alone would defer to the next
    /// frame boundary.
    pub fn configure(&mut self, config: MachineConfig) -> Result<(), ConfigError> {
        if config.clock_multiplier == 0 {
            return Err(ConfigError::InvalidClockMultiplier(0));
        }
        self.config = config;
        self.pending_multiplier = None;
        Ok(())
    }

    /// Changes the clock multiplier. Takes effect at the next frame
    /// boundary, matching real hardware where the clock generator can't be
    /// retimed mid-frame.
    pub fn set_clock_multiplier(&mut self, multiplier: u32) -> Result<(), ConfigError> {
        if multiplier == 0 {
            return Err(ConfigError::InvalidClockMultiplier(0));
        }
        self.pending_multiplier = Some(multiplier);
        Ok(())
    }

    /// Zeroes all registers, IFFs and the interrupt mode; sets PC=0, R=0,
    /// SP=0xFFFF, AF=0xFFFF, as on power-up. Also clears loop-scoped state
    /// (startup breakpoint, frame position, cancellation) but leaves
    /// breakpoints and hooks in place.
    pub fn hard_reset(&mut self) {
        self.cpu.hard_reset();
        self.frame_tacts = 0;
        self.startup_breakpoint = None;
        self.cancelled = false;
        self.ctx.last_reason = None;
    }

    /// Soft reset: PC=0, IFFs cleared, IM=0. Does not touch the bus — the
    /// shell owns no RAM, so a soft reset can never affect memory contents.
    pub fn reset(&mut self) {
        Cpu::reset(&mut self.cpu);
        self.startup_breakpoint = None;
        self.cancelled = false;
        self.ctx.last_reason = None;
    }

    fn run_one_instruction(&mut self) {
        loop {
            self.cpu.tick(&mut self.bus);
            self.frame_tacts += 1;
            if self.cpu.at_instruction_boundary() {
                break;
            }
        }
    }

    fn check_breakpoint_now(&mut self) -> bool {
        self.breakpoints.contains(&self.cpu.regs.pc)
    }

    /// Runs the loop described in the component design: one breakpoint
    /// gate, then instructions until a frame completes, a breakpoint or
    /// termination point is hit, the CPU halts (in `UntilHalt` mode), or
    /// the loop is cancelled.
    pub fn execute_machine_loop(&mut self) -> TerminationReason {
        self.ctx.last_reason = None;

        if Some(self.cpu.regs.pc) != self.startup_breakpoint && self.check_breakpoint_now() {
            self.startup_breakpoint = Some(self.cpu.regs.pc);
            self.ctx.last_reason = Some(TerminationReason::Breakpoint);
            return TerminationReason::Breakpoint;
        }
        self.startup_breakpoint = None;

        loop {
            if self.frame_tacts >= self.config.ticks_per_frame {
                if let Some(multiplier) = self.pending_multiplier.take() {
                    self.config.clock_multiplier = multiplier;
                }
                if let Some(mut hook) = self.per_frame_hook.take() {
                    hook(&mut self.cpu, &mut self.bus);
                    self.per_frame_hook = Some(hook);
                }
                self.frame_tacts -= self.config.ticks_per_frame;
            }

            if let Some(mut hook) = self.should_raise_interrupt.take() {
                let raise = hook(&self.cpu, &self.bus);
                self.should_raise_interrupt = Some(hook);
                if raise {
                    self.cpu.interrupt();
                }
            }

            self.run_one_instruction();

            if let Some(mut hook) = self.per_instruction_hook.take() {
                hook(&self.cpu, &self.bus);
                self.per_instruction_hook = Some(hook);
            }

            if self.ctx.mode == ExecutionMode::UntilExecutionPoint
                && self.ctx.termination_point == Some(self.cpu.regs.pc)
            {
                self.ctx.last_reason = Some(TerminationReason::UntilExecutionPoint);
                return TerminationReason::UntilExecutionPoint;
            }

            if self.check_breakpoint_now() {
                self.startup_breakpoint = Some(self.cpu.regs.pc);
                self.ctx.last_reason = Some(TerminationReason::Breakpoint);
                return TerminationReason::Breakpoint;
            }

            if self.ctx.mode == ExecutionMode::UntilHalt && self.cpu.is_halted() {
                self.ctx.last_reason = Some(TerminationReason::UntilHalt);
                return TerminationReason::UntilHalt;
            }

            if self.cancelled {
                self.cancelled = false;
                self.ctx.last_reason = Some(TerminationReason::Cancelled);
                return TerminationReason::Cancelled;
            }

            if self.frame_tacts >= self.config.ticks_per_frame
                && self.ctx.mode == ExecutionMode::Normal
            {
                self.ctx.last_reason = Some(TerminationReason::Normal);
                return TerminationReason::Normal;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::SimpleBus;

    fn machine_with_program(program: &[u8]) -> Machine<SimpleBus> {
        let mut bus = SimpleBus::new();
        bus.load(0, program);
        Machine::new(bus)
    }

    #[test]
    fn runs_to_an_execution_point() {
        let mut machine = machine_with_program(&[0x01, 0x34, 0x12, 0x00]);
        machine.set_mode(ExecutionMode::UntilExecutionPoint, Some(0x0003));
        let reason = machine.execute_machine_loop();
        assert_eq!(reason, TerminationReason::UntilExecutionPoint);
        assert_eq!(machine.cpu.regs.bc(), 0x1234);
        assert_eq!(machine.cpu.regs.pc, 0x0003);
    }

    #[test]
    fn djnz_loop_reaches_its_execution_point() {
        // DJNZ -2 spins on itself until B hits zero, then falls through.
        let mut machine = machine_with_program(&[0x10, 0xFE]);
        machine.cpu.regs.b = 0x02;
        machine.set_mode(ExecutionMode::UntilExecutionPoint, Some(0x0002));
        let reason = machine.execute_machine_loop();
        assert_eq!(reason, TerminationReason::UntilExecutionPoint);
        assert_eq!(machine.cpu.regs.b, 0);
        assert_eq!(machine.cpu.regs.pc, 0x0002);
    }

    #[test]
    fn stops_on_breakpoint_then_steps_past_it() {
        let mut machine = machine_with_program(&[0x00, 0x00, 0x00]);
        machine.cpu.regs.pc = 0x8000;
        // SimpleBus is 64K; load NOPs at the breakpoint address directly.
        machine.bus.load(0x8000, &[0x00, 0x00]);
        machine.add_breakpoint(0x8000);
        machine
            .configure(MachineConfig {
                ticks_per_frame: 4,
                ..MachineConfig::default()
            })
            .unwrap();

        let first = machine.execute_machine_loop();
        assert_eq!(first, TerminationReason::Breakpoint);
        assert_eq!(machine.startup_breakpoint(), Some(0x8000));

        let second = machine.execute_machine_loop();
        assert_eq!(second, TerminationReason::Normal);
        assert_eq!(machine.cpu.regs.pc, 0x8001);
    }

    #[test]
    fn until_halt_mode_stops_when_cpu_halts() {
        let mut machine = machine_with_program(&[0x00, 0x76]);
        machine.set_mode(ExecutionMode::UntilHalt, None);
        let reason = machine.execute_machine_loop();
        assert_eq!(reason, TerminationReason::UntilHalt);
        assert!(machine.cpu.is_halted());
    }

    #[test]
    fn hard_reset_matches_power_on_state() {
        let mut machine = machine_with_program(&[]);
        machine.cpu.regs.pc = 0x1234;
        machine.cpu.regs.sp = 0x0000;
        machine.hard_reset();
        assert_eq!(machine.cpu.regs.pc, 0);
        assert_eq!(machine.cpu.regs.sp, 0xFFFF);
        assert_eq!(machine.cpu.regs.af(), 0xFFFF);
        assert_eq!(machine.cpu.regs.r, 0);
        assert_eq!(machine.cpu.regs.im, 0);
    }

    #[test]
    fn soft_reset_leaves_ram_untouched() {
        let mut machine = machine_with_program(&[0xAA]);
        machine.cpu.regs.pc = 0x1234;
        machine.reset();
        assert_eq!(machine.cpu.regs.pc, 0);
        assert_eq!(machine.bus.peek(0), 0xAA);
    }

    #[test]
    fn configure_rejects_zero_multiplier() {
        let mut machine = machine_with_program(&[]);
        let err = machine
            .configure(MachineConfig {
                clock_multiplier: 0,
                ..MachineConfig::default()
            })
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidClockMultiplier(0));
    }

    #[test]
    fn cancellation_stops_the_loop_after_the_in_flight_instruction() {
        let mut machine = machine_with_program(&[0x00, 0x00, 0x00, 0x00]);
        machine.cancel();
        let reason = machine.execute_machine_loop();
        assert_eq!(reason, TerminationReason::Cancelled);
        // The instruction in flight when cancel() was observed still ran
        // to completion before the loop stopped.
        assert_eq!(machine.cpu.regs.pc, 1);
    }
}
