//! The Z80 CPU core: register file, micro-op scheduler and the fetch/decode
//! loop that drives the handlers in `execute`.

mod execute;

use emu_core::{Bus, Cpu, Observable, ReadResult, Ticks, Value};

use crate::flags::{CF, HF, NF, PF, SF, ZF};
use crate::microcode::{MicroOp, MicroOpQueue};
use crate::registers::Registers;

/// A cycle-accurate Zilog Z80.
///
/// `tick()` advances the CPU by exactly one T-state. Instructions are
/// decomposed into a handful of `MicroOp`s (fetches, memory/IO accesses,
/// internal delays) queued up front by the handlers in `execute`; `tick`
/// just burns through whichever micro-op is current, performs its bus
/// access on its last T-state, and lets wait states reported by the bus
/// extend it before moving on.
#[derive(Debug, Clone)]
pub struct Z80 {
    pub regs: Registers,

    pub opcode: u8,
    /// `0x00` (none), `0xCB`, `0xDD`, `0xED` or `0xFD`.
    pub prefix: u8,
    /// `0xCB` once a `DD`/`FD` prefix is followed by `CB` (the `DDCB`/`FDCB`
    /// family), `0x00` otherwise.
    pub prefix2: u8,

    pub micro_ops: MicroOpQueue,
    pub addr: u16,
    pub data_lo: u8,
    pub data_hi: u8,
    pub displacement: i8,
    /// Counts how many `Execute` markers have fired for the instruction in
    /// progress, letting a single follow-up function implement several
    /// sequential stages (e.g. `LD HL,(nn)`: compute address, then read).
    pub followup_stage: u8,

    /// Set by `EI`; consulted (not cleared) by `interrupt()`, and cleared by
    /// the decode of the instruction following the one that set it.
    pub ei_delay: bool,
    /// Set by `LD A,I`/`LD A,R`; these instructions reset P/V to IFF2
    /// instead of parity, and the flag exists so a debugger can tell this
    /// state apart from ordinary `LD A,r`.
    pub last_was_ld_a_ir: bool,
    /// The `Q` register in Patrik Rak's formulation of the undocumented
    /// `SCF`/`CCF` X/Y flag behavior: the F value as it stood after the
    /// *previous* instruction, consulted by this one.
    pub prev_q: u8,
    /// F value written by this instruction so far; becomes `prev_q` once
    /// the next instruction starts decoding. Reset to 0 by every
    /// instruction that writes F, by opcodes that don't.
    pub last_q: u8,

    /// T-states elapsed in the current micro-op, reset on each advance.
    op_elapsed: u8,
    /// Extra wait states the bus granted the current micro-op.
    op_wait: u8,

    int_requested: bool,
    nmi_requested: bool,

    total_ticks: Ticks,
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            opcode: 0,
            prefix: 0,
            prefix2: 0,
            micro_ops: MicroOpQueue::new(),
            addr: 0,
            data_lo: 0,
            data_hi: 0,
            displacement: 0,
            followup_stage: 0,
            ei_delay: false,
            last_was_ld_a_ir: false,
            prev_q: 0,
            last_q: 0,
            op_elapsed: 0,
            op_wait: 0,
            int_requested: false,
            nmi_requested: false,
            total_ticks: Ticks::ZERO,
        };
        cpu.regs.sp = 0xFFFF;
        cpu.regs.im = 0;
        cpu.micro_ops.push(MicroOp::FetchOpcode);
        cpu
    }

    /// Total T-states executed since construction or the last `reset()`.
    #[must_use]
    pub const fn total_ticks(&self) -> Ticks {
        self.total_ticks
    }

    /// The micro-op currently being processed, if any.
    #[must_use]
    pub const fn current_micro_op(&self) -> Option<MicroOp> {
        self.micro_ops.current()
    }

    /// T-states elapsed within the current micro-op.
    #[must_use]
    pub const fn t_state(&self) -> u8 {
        self.op_elapsed
    }

    #[must_use]
    pub const fn b(&self) -> u8 {
        self.regs.b
    }

    #[must_use]
    pub const fn c(&self) -> u8 {
        self.regs.c
    }

    #[must_use]
    pub const fn d(&self) -> u8 {
        self.regs.d
    }

    #[must_use]
    pub const fn e(&self) -> u8 {
        self.regs.e
    }

    #[must_use]
    pub const fn de(&self) -> u16 {
        self.regs.de()
    }

    #[must_use]
    pub const fn hl(&self) -> u16 {
        self.regs.hl()
    }

    /// True once the CPU has nothing left of the previous instruction to
    /// process and is about to start fetching the next opcode — the only
    /// point at which a host may safely raise an interrupt, check a
    /// breakpoint, or otherwise inspect a consistent, instruction-aligned
    /// snapshot of state.
    #[must_use]
    pub const fn at_instruction_boundary(&self) -> bool {
        self.op_elapsed == 0 && matches!(self.micro_ops.current(), Some(MicroOp::FetchOpcode))
    }

    /// Advance the CPU by exactly one T-state.
    pub fn tick<B: Bus>(&mut self, bus: &mut B) {
        self.total_ticks += Ticks::new(1);

        if self.at_instruction_boundary() {
            if self.nmi_requested {
                self.nmi_requested = false;
                self.acknowledge_nmi(bus);
                return;
            }
            if self.int_requested {
                self.int_requested = false;
                self.acknowledge_interrupt(bus);
                return;
            }
        }

        let Some(op) = self.micro_ops.current() else {
            self.begin_instruction();
            return;
        };

        if op == MicroOp::Execute {
            self.resolve_execute();
            return;
        }

        self.op_elapsed += 1;
        let base = op.base_t_states();
        if self.op_elapsed == base && self.op_wait == 0 {
            self.op_wait = self.perform_bus_access(op, bus);
        }
        if self.op_elapsed >= base + self.op_wait {
            self.micro_ops.advance();
            self.op_elapsed = 0;
            self.op_wait = 0;
            match self.micro_ops.current() {
                None => self.begin_instruction(),
                Some(MicroOp::Execute) => self.resolve_execute(),
                Some(_) => {}
            }
        }
    }

    /// Queues a bare internal delay of `t_states` T-states.
    pub(crate) fn queue_internal(&mut self, t_states: u8) {
        self.micro_ops.push(MicroOp::Internal(t_states));
    }

    /// Queues the zero-cost marker that hands control to a follow-up
    /// handler once the preceding micro-ops have supplied their data.
    pub(crate) fn queue_execute_followup(&mut self) {
        self.micro_ops.push(MicroOp::Execute);
    }

    fn resolve_execute(&mut self) {
        self.micro_ops.advance();
        self.followup_stage += 1;
        self.dispatch_followup();
        if self.micro_ops.is_empty() {
            self.begin_instruction();
        }
    }

    /// Called once a new instruction's FetchOpcode micro-op has nothing
    /// left ahead of it. Does *not* touch the Q-register bookkeeping,
    /// `ei_delay` or `last_was_ld_a_ir` — those are reset by
    /// `dispatch_opcode`, exactly once per instruction, at the fetch that
    /// actually determines what the instruction does (a prefix byte's own
    /// fetch just chains to another fetch and must leave them alone).
    fn begin_instruction(&mut self) {
        self.prefix = 0;
        self.prefix2 = 0;
        self.followup_stage = 0;
        self.micro_ops.push(MicroOp::FetchOpcode);
    }

    /// Called once `self.opcode` holds a freshly fetched byte. Routes to
    /// the right opcode table, or — for `DD`/`FD` followed by `CB` — sets
    /// up the displacement-then-opcode read the `DDCB`/`FDCB` family needs
    /// before anything can dispatch.
    fn dispatch_opcode(&mut self) {
        let op = self.opcode;
        let starts_new_prefix = self.prefix == 0 && matches!(op, 0xCB | 0xDD | 0xED | 0xFD);
        let starts_ddfd_cb = (self.prefix == 0xDD || self.prefix == 0xFD) && op == 0xCB;

        if !starts_new_prefix && !starts_ddfd_cb {
            self.prev_q = self.last_q;
            self.last_q = 0;
            self.ei_delay = false;
            self.last_was_ld_a_ir = false;
        }

        if starts_ddfd_cb {
            self.prefix2 = 0xCB;
            self.micro_ops.push(MicroOp::FetchDisplacement);
            self.micro_ops.push(MicroOp::ReadImm8);
            self.queue_execute_followup();
            return;
        }

        match self.prefix {
            0 => self.decode_unprefixed(),
            0xCB => self.decode_cb(),
            0xED => self.decode_ed(),
            _ => self.decode_indexed(),
        }
    }

    /// `r`: 0=B, 1=C, 2=D, 3=E, 4=H, 5=L, 7=A. `6` ((HL)/(IX+d)/(IY+d)) is
    /// handled by the callers directly since it needs a memory access.
    fn get_reg8(&self, r: u8) -> u8 {
        match r {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            7 => self.regs.a,
            _ => unreachable!("get_reg8({r})"),
        }
    }

    fn set_reg8(&mut self, r: u8, value: u8) {
        match r {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            7 => self.regs.a = value,
            _ => unreachable!("set_reg8({r})"),
        }
    }

    /// `rp`: 0=BC, 1=DE, 2=HL, 3=SP.
    fn get_reg16(&self, rp: u8) -> u16 {
        match rp {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.sp,
            _ => unreachable!("get_reg16({rp})"),
        }
    }

    fn set_reg16(&mut self, rp: u8, value: u16) {
        match rp {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.sp = value,
            _ => unreachable!("set_reg16({rp})"),
        }
    }

    /// `rp`: 0=BC, 1=DE, 2=HL, 3=AF. Used by PUSH/POP, which push AF rather
    /// than SP in the third slot.
    fn get_reg16_af(&self, rp: u8) -> u16 {
        match rp {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.af(),
            _ => unreachable!("get_reg16_af({rp})"),
        }
    }

    fn set_reg16_af(&mut self, rp: u8, value: u16) {
        match rp {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.set_af(value),
            _ => unreachable!("set_reg16_af({rp})"),
        }
    }

    /// The `IX`/`IY` register selected by the current prefix (`FD` means
    /// `IY`, anything else means `IX`).
    fn get_index_reg(&self) -> u16 {
        if self.prefix == 0xFD {
            self.regs.iy
        } else {
            self.regs.ix
        }
    }

    fn set_index_reg(&mut self, value: u16) {
        if self.prefix == 0xFD {
            self.regs.iy = value;
        } else {
            self.regs.ix = value;
        }
    }

    /// Like `get_reg8`, but `4`/`5` (H/L) read the high/low half of the
    /// active index register instead — the undocumented `LD r,IXH` family.
    fn get_reg8_indexed(&self, r: u8) -> u8 {
        match r {
            4 => (self.get_index_reg() >> 8) as u8,
            5 => self.get_index_reg() as u8,
            _ => self.get_reg8(r),
        }
    }

    fn set_reg8_indexed(&mut self, r: u8, value: u8) {
        match r {
            4 => {
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0x00FF) | (u16::from(value) << 8));
            }
            5 => {
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0xFF00) | u16::from(value));
            }
            _ => self.set_reg8(r, value),
        }
    }

    /// `cc`: 0=NZ, 1=Z, 2=NC, 3=C, 4=PO, 5=PE, 6=P, 7=M.
    fn condition(&self, cc: u8) -> bool {
        match cc {
            0 => self.regs.f & ZF == 0,
            1 => self.regs.f & ZF != 0,
            2 => self.regs.f & CF == 0,
            3 => self.regs.f & CF != 0,
            4 => self.regs.f & PF == 0,
            5 => self.regs.f & PF != 0,
            6 => self.regs.f & SF == 0,
            7 => self.regs.f & SF != 0,
            _ => unreachable!("condition({cc})"),
        }
    }

    /// Writes F and records it as this instruction's `Q` value for the
    /// next `SCF`/`CCF` to see via `prev_q`.
    fn set_f(&mut self, value: u8) {
        self.regs.f = value;
        self.last_q = value;
    }

    fn perform_bus_access<B: Bus>(&mut self, op: MicroOp, bus: &mut B) -> u8 {
        match op {
            MicroOp::FetchOpcode => {
                if self.regs.halted {
                    self.opcode = 0x00;
                    self.regs.bump_r();
                    self.dispatch_opcode();
                    return 0;
                }
                let ReadResult { data, wait_states } = bus.read(u32::from(self.regs.pc));
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.regs.bump_r();
                self.opcode = data;
                self.dispatch_opcode();
                wait_states
            }
            MicroOp::FetchDisplacement => {
                let ReadResult { data, wait_states } = bus.read(u32::from(self.regs.pc));
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.displacement = data as i8;
                wait_states
            }
            MicroOp::ReadImm8 | MicroOp::ReadImm16Lo => {
                let ReadResult { data, wait_states } = bus.read(u32::from(self.regs.pc));
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.data_lo = data;
                wait_states
            }
            MicroOp::ReadImm16Hi => {
                let ReadResult { data, wait_states } = bus.read(u32::from(self.regs.pc));
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.data_hi = data;
                wait_states
            }
            MicroOp::ReadMem => {
                let ReadResult { data, wait_states } = bus.read(u32::from(self.addr));
                self.data_lo = data;
                wait_states
            }
            MicroOp::ReadMem16Lo => {
                let ReadResult { data, wait_states } = bus.read(u32::from(self.addr));
                self.data_lo = data;
                self.addr = self.addr.wrapping_add(1);
                wait_states
            }
            MicroOp::ReadMem16Hi => {
                let ReadResult { data, wait_states } = bus.read(u32::from(self.addr));
                self.data_hi = data;
                wait_states
            }
            MicroOp::WriteMem => bus.write(u32::from(self.addr), self.data_lo),
            MicroOp::WriteMem16Lo => {
                let wait = bus.write(u32::from(self.addr), self.data_lo);
                self.addr = self.addr.wrapping_add(1);
                wait
            }
            MicroOp::WriteMem16Hi => bus.write(u32::from(self.addr), self.data_hi),
            MicroOp::WriteMemHiFirst => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                self.addr = self.regs.sp;
                bus.write(u32::from(self.addr), self.data_hi)
            }
            MicroOp::WriteMemLoSecond => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                self.addr = self.regs.sp;
                bus.write(u32::from(self.addr), self.data_lo)
            }
            MicroOp::IoRead => {
                let ReadResult { data, wait_states } = bus.io_read(u32::from(self.addr));
                self.data_lo = data;
                wait_states
            }
            MicroOp::IoWrite => bus.io_write(u32::from(self.addr), self.data_lo),
            MicroOp::Internal(_) | MicroOp::Execute => 0,
        }
    }

    fn push_return_address<B: Bus>(&mut self, bus: &mut B) {
        let pc = self.regs.pc;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(u32::from(self.regs.sp), (pc >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(u32::from(self.regs.sp), pc as u8);
    }

    /// Runs an interrupt acknowledge sequence atomically within a single
    /// `tick()` call. The fetch this call intercepted stays queued — the
    /// next `tick()` simply re-fetches, now from the vector's target.
    fn acknowledge_interrupt<B: Bus>(&mut self, bus: &mut B) {
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.halted = false;
        self.regs.bump_r();

        match self.regs.im {
            // IM 0 has no peripheral wired up to place a real instruction on
            // the bus, so it is treated like IM 1: both inject RST 38h.
            0 | 1 => {
                self.push_return_address(bus);
                self.regs.pc = 0x0038;
                self.total_ticks += Ticks::new(12);
            }
            _ => {
                let vector = (u16::from(self.regs.i) << 8) | 0x00FF;
                let lo = bus.read(u32::from(vector)).data;
                let hi = bus.read(u32::from(vector.wrapping_add(1))).data;
                self.push_return_address(bus);
                self.regs.pc = u16::from(lo) | (u16::from(hi) << 8);
                self.total_ticks += Ticks::new(18);
            }
        }
    }

    fn acknowledge_nmi<B: Bus>(&mut self, bus: &mut B) {
        self.regs.iff1 = false;
        self.regs.halted = false;
        self.regs.bump_r();
        self.push_return_address(bus);
        self.regs.pc = 0x0066;
        self.total_ticks += Ticks::new(10);
    }

    /// Resets to power-on state: registers zeroed except AF and SP, which
    /// power up with every bit set, interrupts disabled, IM 0.
    pub fn hard_reset(&mut self) {
        self.regs = Registers::default();
        self.regs.sp = 0xFFFF;
        self.regs.set_af(0xFFFF);
        self.opcode = 0;
        self.prefix = 0;
        self.prefix2 = 0;
        self.micro_ops.clear();
        self.addr = 0;
        self.data_lo = 0;
        self.data_hi = 0;
        self.displacement = 0;
        self.followup_stage = 0;
        self.ei_delay = false;
        self.last_was_ld_a_ir = false;
        self.prev_q = 0;
        self.last_q = 0;
        self.op_elapsed = 0;
        self.op_wait = 0;
        self.int_requested = false;
        self.nmi_requested = false;
        self.total_ticks = Ticks::ZERO;
        self.micro_ops.push(MicroOp::FetchOpcode);
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for Z80 {
    type Registers = Registers;

    fn tick<B: Bus>(&mut self, bus: &mut B) {
        Self::tick(self, bus);
    }

    fn pc(&self) -> u32 {
        u32::from(self.regs.pc)
    }

    fn registers(&self) -> Self::Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }

    /// Requests a maskable interrupt. Refused if interrupts are disabled,
    /// the one-instruction delay after `EI` is still pending, or the CPU
    /// isn't sitting at an instruction boundary right now.
    fn interrupt(&mut self) -> bool {
        if self.ei_delay || !self.regs.iff1 || !self.at_instruction_boundary() {
            return false;
        }
        self.int_requested = true;
        true
    }

    /// Non-maskable interrupts are always accepted; acknowledgement still
    /// waits for the next instruction boundary.
    fn nmi(&mut self) {
        self.nmi_requested = true;
    }

    /// Resets the CPU as a real Z80's `/RESET` line would: registers are
    /// left alone except for the ones the reset signal actually drives.
    fn reset(&mut self) {
        self.regs.pc = 0;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.im = 0;
        self.regs.halted = false;
        self.regs.i = 0;
        self.regs.r = 0;
        self.prefix = 0;
        self.prefix2 = 0;
        self.followup_stage = 0;
        self.ei_delay = false;
        self.int_requested = false;
        self.nmi_requested = false;
        self.micro_ops.clear();
        self.op_elapsed = 0;
        self.op_wait = 0;
        self.micro_ops.push(MicroOp::FetchOpcode);
    }
}

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "pc" => Some(Value::U16(self.regs.pc)),
            "sp" => Some(Value::U16(self.regs.sp)),
            "af" => Some(Value::U16(self.regs.af())),
            "bc" => Some(Value::U16(self.regs.bc())),
            "de" => Some(Value::U16(self.regs.de())),
            "hl" => Some(Value::U16(self.regs.hl())),
            "ix" => Some(Value::U16(self.regs.ix)),
            "iy" => Some(Value::U16(self.regs.iy)),
            "i" => Some(Value::U8(self.regs.i)),
            "r" => Some(Value::U8(self.regs.r)),
            "im" => Some(Value::U8(self.regs.im)),
            "iff1" => Some(Value::Bool(self.regs.iff1)),
            "iff2" => Some(Value::Bool(self.regs.iff2)),
            "halted" => Some(Value::Bool(self.regs.halted)),
            "flags.s" => Some(Value::Bool(self.regs.f & SF != 0)),
            "flags.z" => Some(Value::Bool(self.regs.f & ZF != 0)),
            "flags.pv" => Some(Value::Bool(self.regs.f & PF != 0)),
            "flags.n" => Some(Value::Bool(self.regs.f & NF != 0)),
            "flags.c" => Some(Value::Bool(self.regs.f & CF != 0)),
            "t_states" => Some(Value::U64(self.total_ticks.get())),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pc", "sp", "af", "bc", "de", "hl", "ix", "iy", "i", "r", "im", "iff1", "iff2",
            "halted", "flags.s", "flags.z", "flags.pv", "flags.n", "flags.c", "t_states",
        ]
    }
}

#[cfg(feature = "test-utils")]
impl Z80 {
    /// Forces the program counter, bypassing normal fetch/decode. Leaves
    /// the CPU at a fresh instruction boundary.
    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
        self.micro_ops.clear();
        self.op_elapsed = 0;
        self.op_wait = 0;
        self.prefix = 0;
        self.prefix2 = 0;
        self.followup_stage = 0;
        self.micro_ops.push(MicroOp::FetchOpcode);
    }

    pub fn set_sp(&mut self, sp: u16) {
        self.regs.sp = sp;
    }

    /// Pops a return address directly off the stack, as `RET` would,
    /// without going through the micro-op queue. Used by harnesses that
    /// intercept a CALL (e.g. a CP/M BDOS trap) and need to simulate its
    /// return.
    pub fn ret<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(u32::from(self.regs.sp)).data;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = bus.read(u32::from(self.regs.sp)).data;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        self.regs.pc = u16::from(lo) | (u16::from(hi) << 8);
        self.set_pc(self.regs.pc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::SimpleBus;

    #[test]
    fn new_cpu_sits_at_an_instruction_boundary() {
        let cpu = Z80::new();
        assert_eq!(cpu.current_micro_op(), Some(MicroOp::FetchOpcode));
        assert_eq!(cpu.t_state(), 0);
    }

    #[test]
    fn nop_takes_four_t_states_and_advances_pc() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x00]);
        let mut cpu = Z80::new();
        for _ in 0..4 {
            cpu.tick(&mut bus);
        }
        assert_eq!(cpu.regs.pc, 1);
        assert_eq!(cpu.current_micro_op(), Some(MicroOp::FetchOpcode));
        assert_eq!(cpu.t_state(), 0);
    }

    #[test]
    fn ld_bc_nn_loads_immediate_and_takes_ten_t_states() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x01, 0x34, 0x12]); // LD BC, 0x1234
        let mut cpu = Z80::new();
        for _ in 0..10 {
            cpu.tick(&mut bus);
        }
        assert_eq!(cpu.regs.bc(), 0x1234);
        assert_eq!(cpu.regs.pc, 3);
    }

    #[test]
    fn halt_spins_without_advancing_pc() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x76]); // HALT
        let mut cpu = Z80::new();
        for _ in 0..4 {
            cpu.tick(&mut bus);
        }
        assert!(cpu.is_halted());
        let pc_after_halt = cpu.regs.pc;
        for _ in 0..40 {
            cpu.tick(&mut bus);
        }
        assert_eq!(cpu.regs.pc, pc_after_halt);
        assert!(cpu.is_halted());
    }

    #[test]
    fn maskable_interrupt_vectors_to_0x0038_in_im1() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x00]); // NOP, so we sit at a clean boundary after one tick round
        let mut cpu = Z80::new();
        cpu.regs.iff1 = true;
        cpu.regs.im = 1;
        cpu.regs.pc = 0x8000;
        assert!(cpu.interrupt());
        cpu.tick(&mut bus);
        assert_eq!(cpu.regs.pc, 0x0038);
        assert_eq!(cpu.regs.sp, 0xFFFD);
        assert!(!cpu.regs.iff1);
    }

    #[test]
    fn halting_cpu_resumes_after_interrupt() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x76]);
        let mut cpu = Z80::new();
        cpu.regs.iff1 = true;
        cpu.regs.im = 1;
        for _ in 0..4 {
            cpu.tick(&mut bus);
        }
        assert!(cpu.is_halted());
        assert!(cpu.interrupt());
        cpu.tick(&mut bus);
        assert!(!cpu.is_halted());
        assert_eq!(cpu.regs.pc, 0x0038);
    }

    fn run_instruction(cpu: &mut Z80, bus: &mut SimpleBus) -> u64 {
        let start = cpu.total_ticks().get();
        cpu.tick(bus);
        while !cpu.at_instruction_boundary() {
            cpu.tick(bus);
        }
        cpu.total_ticks().get() - start
    }

    #[test]
    fn rlca_rotates_through_carry_and_takes_four_t_states() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x07]);
        let mut cpu = Z80::new();
        cpu.regs.a = 0x80;
        cpu.regs.f = 0x00;
        let tacts = run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.a, 0x01);
        assert_ne!(cpu.regs.f & CF, 0);
        assert_eq!(cpu.regs.f & (HF | NF), 0);
        assert_eq!(tacts, 4);
    }

    #[test]
    fn rra_rotates_carry_into_bit_seven() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x1F]);
        let mut cpu = Z80::new();
        cpu.regs.a = 0x01;
        cpu.regs.f = CF;
        let tacts = run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.a, 0x80);
        assert_ne!(cpu.regs.f & CF, 0);
        assert_eq!(cpu.regs.f & (HF | NF), 0);
        assert_eq!(tacts, 4);
    }

    #[test]
    fn add_hl_bc_sets_carry_and_half_carry_from_the_right_bits() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x09]);
        let mut cpu = Z80::new();
        cpu.regs.set_hl(0x1234);
        cpu.regs.set_bc(0x1111);
        let tacts = run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.hl(), 0x2345);
        assert_eq!(cpu.regs.f & (NF | HF | CF), 0);
        assert_eq!(tacts, 11);
    }

    #[test]
    fn djnz_loop_spends_the_documented_taken_and_not_taken_tacts() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x10, 0xFE]); // DJNZ -2
        let mut cpu = Z80::new();
        cpu.regs.b = 2;
        let first = run_instruction(&mut cpu, &mut bus); // B: 2 -> 1, taken
        assert_eq!(first, 13);
        assert_eq!(cpu.regs.pc, 0);
        let second = run_instruction(&mut cpu, &mut bus); // B: 1 -> 0, taken
        assert_eq!(second, 13);
        assert_eq!(cpu.regs.pc, 0);
        cpu.regs.b = 1;
        let third = run_instruction(&mut cpu, &mut bus); // B: 1 -> 0, not taken
        assert_eq!(third, 8);
        assert_eq!(cpu.regs.pc, 2);
    }

    #[test]
    fn conditional_jump_costs_more_when_taken() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0xC2, 0x00, 0x10]); // JP NZ, 0x1000
        let mut cpu = Z80::new();
        cpu.regs.f = ZF;
        let not_taken = run_instruction(&mut cpu, &mut bus);
        assert_eq!(not_taken, 10);
        assert_eq!(cpu.regs.pc, 3);

        cpu.set_pc(0);
        cpu.regs.f = 0;
        let taken = run_instruction(&mut cpu, &mut bus);
        assert_eq!(taken, 10);
        assert_eq!(cpu.regs.pc, 0x1000);
    }

    #[test]
    fn conditional_call_and_return_cost_more_when_taken() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0xC4, 0x10, 0x10]); // CALL NZ, 0x1010
        bus.load(0x1010, &[0xC0]); // RET NZ
        let mut cpu = Z80::new();

        cpu.regs.f = ZF;
        let call_not_taken = run_instruction(&mut cpu, &mut bus);
        assert_eq!(call_not_taken, 10);
        assert_eq!(cpu.regs.pc, 3);

        cpu.set_pc(0);
        cpu.regs.f = 0;
        let call_taken = run_instruction(&mut cpu, &mut bus);
        assert_eq!(call_taken, 17);
        assert_eq!(cpu.regs.pc, 0x1010);

        cpu.regs.f = ZF; // NZ now false: RET NZ must not take the return.
        let ret_not_taken = run_instruction(&mut cpu, &mut bus);
        assert_eq!(ret_not_taken, 5);
        assert_eq!(cpu.regs.pc, 0x1011);
    }

    #[test]
    fn ex_af_af_prime_twice_restores_af() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x08, 0x08]); // EX AF, AF' twice
        let mut cpu = Z80::new();
        cpu.regs.set_af(0x1234);
        cpu.regs.a_alt = 0x56;
        cpu.regs.f_alt = 0x78;
        run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.af(), 0x5678);
        run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.af(), 0x1234);
    }

    #[test]
    fn exx_twice_restores_bc_de_hl() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0xD9, 0xD9]); // EXX twice
        let mut cpu = Z80::new();
        cpu.regs.set_bc(0x1111);
        cpu.regs.set_de(0x2222);
        cpu.regs.set_hl(0x3333);
        cpu.regs.b_alt = 0x44;
        cpu.regs.c_alt = 0x44;
        cpu.regs.d_alt = 0x55;
        cpu.regs.e_alt = 0x55;
        cpu.regs.h_alt = 0x66;
        cpu.regs.l_alt = 0x66;
        run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.bc(), 0x4444);
        run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.bc(), 0x1111);
        assert_eq!(cpu.regs.de(), 0x2222);
        assert_eq!(cpu.regs.hl(), 0x3333);
    }

    #[test]
    fn r_register_low_seven_bits_advance_once_per_prefix_byte() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x00, 0xCB, 0x00]); // NOP, then CB-prefixed RLC B
        let mut cpu = Z80::new();
        cpu.regs.r = 0x7E;
        run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.r, 0x7F);
        run_instruction(&mut cpu, &mut bus); // two fetches: CB prefix + opcode
        assert_eq!(cpu.regs.r, 0x01);
    }

    #[test]
    fn r_register_bit_seven_survives_wraparound() {
        let mut bus = SimpleBus::new();
        bus.load(0, &[0x00]);
        let mut cpu = Z80::new();
        cpu.regs.r = 0xFF;
        run_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.regs.r, 0x80);
    }
}
