//! DDCB/FDCB sub-table: rotate/shift/`BIT`/`RES`/`SET` on `(IX+d)`/`(IY+d)`,
//! with the undocumented copy-to-register side effect for `RES`/`SET`.

use crate::alu;
use crate::flags::{CF, HF, PF, SF, XF, YF, ZF};
use crate::microcode::MicroOp;

use super::super::Z80;

impl Z80 {
    /// Decode a DDCB/FDCB sub-opcode. The displacement byte has already been
    /// fetched into `self.displacement`; `self.opcode` holds the sub-opcode.
    pub(super) fn decode_indexed_bit(&mut self) {
        let idx = self.get_index_reg();
        self.addr = idx.wrapping_add(self.displacement as i16 as u16);
        self.regs.wz = self.addr;

        self.micro_ops.push(MicroOp::ReadMem);
        self.queue_internal(2);
        self.queue_execute_followup();
    }

    /// Finish a DDCB/FDCB instruction once the memory read lands.
    pub(super) fn indexed_bit_followup(&mut self) {
        let op = self.opcode;
        let value = self.data_lo;
        let r = op & 7;

        let result = match op {
            0x00..=0x07 => {
                let res = alu::rlc8(value);
                self.set_f(res.flags);
                res.value
            }
            0x08..=0x0F => {
                let res = alu::rrc8(value);
                self.set_f(res.flags);
                res.value
            }
            0x10..=0x17 => {
                let res = alu::rl8(value, self.regs.f & CF != 0);
                self.set_f(res.flags);
                res.value
            }
            0x18..=0x1F => {
                let res = alu::rr8(value, self.regs.f & CF != 0);
                self.set_f(res.flags);
                res.value
            }
            0x20..=0x27 => {
                let res = alu::sla8(value);
                self.set_f(res.flags);
                res.value
            }
            0x28..=0x2F => {
                let res = alu::sra8(value);
                self.set_f(res.flags);
                res.value
            }
            0x30..=0x37 => {
                let res = alu::sll8(value);
                self.set_f(res.flags);
                res.value
            }
            0x38..=0x3F => {
                let res = alu::srl8(value);
                self.set_f(res.flags);
                res.value
            }
            // BIT: flag X/Y come from the high byte of the effective address,
            // not from the operand.
            0x40..=0x7F => {
                let bit = (op >> 3) & 7;
                let mask = 1 << bit;
                let is_zero = value & mask == 0;
                let mut flags = self.regs.f & CF;
                flags |= HF;
                if is_zero {
                    flags |= ZF | PF;
                }
                if bit == 7 && !is_zero {
                    flags |= SF;
                }
                flags |= ((self.addr >> 8) as u8) & (XF | YF);
                self.set_f(flags);
                return;
            }
            // RES
            0x80..=0xBF => {
                let bit = (op >> 3) & 7;
                value & !(1 << bit)
            }
            // SET
            0xC0..=0xFF => {
                let bit = (op >> 3) & 7;
                value | (1 << bit)
            }
        };

        self.data_lo = result;
        self.micro_ops.push(MicroOp::WriteMem);

        // Undocumented: RES/SET (and the rotate/shift ops) also copy the
        // result into the plain register named by the low 3 bits, unless
        // that would mean the memory operand itself (r == 6).
        if r != 6 {
            self.set_reg8(r, result);
        }
    }
}
