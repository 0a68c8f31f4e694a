//! Opcode tables, one module per prefix family.
//!
//! A `decode_*` function consumes the already-fetched byte in `self.opcode`.
//! Instructions with no operands to fetch run to completion there; anything
//! that needs an immediate or a memory read queues the micro-ops for it and
//! calls `queue_execute_followup()`, deferring the actual effect to a
//! `*_followup` function. `dispatch_followup` below is where those land,
//! fanning out by `self.prefix`/`self.prefix2` to whichever table's
//! follow-up the in-flight instruction belongs to.

#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]

mod block_cb;
mod extended;
mod indexed;
mod indexed_bit;
mod standard;

use crate::alu;
use crate::flags::{sz53p, CF, HF, XF, YF};

use super::Z80;

impl Z80 {
    /// Routes a pending follow-up to the table it belongs to.
    pub(crate) fn dispatch_followup(&mut self) {
        if self.prefix == 0xED {
            self.ed_followup();
            return;
        }
        if (self.prefix == 0xDD || self.prefix == 0xFD) && self.prefix2 == 0xCB {
            if self.followup_stage <= 1 {
                // Stage 1: the ReadImm8 just landed the opcode byte in
                // data_lo. Copy it to `opcode` and hand off to the
                // indexed-bit decoder, which sets up the memory read and
                // queues the real follow-up.
                //
                // DDCB/FDCB has no non-followup Execute anywhere in its
                // fetch chain (the prefix bytes just chain FetchOpcodes), so
                // this is the only place in the whole flow where the
                // per-instruction bookkeeping gets reset.
                self.ei_delay = false;
                self.last_was_ld_a_ir = false;
                self.prev_q = self.last_q;
                self.last_q = 0;
                self.opcode = self.data_lo;
                self.decode_indexed_bit();
                return;
            }
            self.indexed_bit_followup();
            return;
        }
        if self.prefix == 0xDD || self.prefix == 0xFD {
            self.indexed_followup();
            return;
        }
        if self.prefix == 0xCB {
            self.cb_followup();
            return;
        }
        self.unprefixed_followup();
    }

    /// `ADD`/`ADC`/`SUB`/`SBC`/`AND`/`XOR`/`OR`/`CP A, value` — the eight
    /// accumulator ALU ops share this dispatch since both the standard and
    /// indexed tables reach them through the same `0b01xxxxxx`-shaped byte.
    pub(crate) fn apply_accumulator_op(&mut self, op: u8, value: u8) {
        let alu_op = (op >> 3) & 7;
        match alu_op {
            0 => {
                let result = alu::add8(self.regs.a, value, false);
                self.regs.a = result.value;
                self.set_f(result.flags);
            }
            1 => {
                let carry = self.regs.f & CF != 0;
                let result = alu::add8(self.regs.a, value, carry);
                self.regs.a = result.value;
                self.set_f(result.flags);
            }
            2 => {
                let result = alu::sub8(self.regs.a, value, false);
                self.regs.a = result.value;
                self.set_f(result.flags);
            }
            3 => {
                let carry = self.regs.f & CF != 0;
                let result = alu::sub8(self.regs.a, value, carry);
                self.regs.a = result.value;
                self.set_f(result.flags);
            }
            4 => {
                self.regs.a &= value;
                self.set_f(sz53p(self.regs.a) | HF);
            }
            5 => {
                self.regs.a ^= value;
                self.set_f(sz53p(self.regs.a));
            }
            6 => {
                self.regs.a |= value;
                self.set_f(sz53p(self.regs.a));
            }
            7 => {
                let result = alu::sub8(self.regs.a, value, false);
                self.set_f((result.flags & !(YF | XF)) | (value & (YF | XF)));
            }
            _ => unreachable!(),
        }
    }
}
