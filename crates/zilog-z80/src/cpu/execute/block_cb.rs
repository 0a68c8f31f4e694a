//! CB-prefixed opcode table: rotate/shift, `BIT`, `RES` and `SET`, on a
//! register or `(HL)`.

use crate::alu;
use crate::flags::{CF, HF, PF, SF, XF, YF, ZF};
use crate::microcode::MicroOp;

use super::super::Z80;

impl Z80 {
    /// Decode a CB-prefixed opcode.
    pub(crate) fn decode_cb(&mut self) {
        let op = self.opcode;
        let r = op & 7;

        if r == 6 {
            self.addr = self.regs.hl();
            self.micro_ops.push(MicroOp::ReadMem);
            self.queue_internal(1);
            self.queue_execute_followup();
            return;
        }

        let value = self.get_reg8(r);
        let result = self.cb_operation(op, value, value);

        if let Some(res) = result {
            self.set_reg8(r, res);
        }
    }

    /// Finish a CB-prefixed `(HL)` operation once the memory read lands.
    pub(super) fn cb_followup(&mut self) {
        let op = self.opcode;
        let value = self.data_lo;
        // BIT n, (HL): X/Y come from the high byte of WZ, not from the
        // operand — this is the one CB-prefixed case where flag_source and
        // value diverge.
        let flag_source = (self.regs.wz >> 8) as u8;

        let result = self.cb_operation(op, value, flag_source);

        if let Some(res) = result {
            self.data_lo = res;
            self.micro_ops.push(MicroOp::WriteMem);
        }
    }

    /// Shared rotate/shift/BIT/RES/SET body. `None` means BIT, which only
    /// sets flags and writes nothing back.
    fn cb_operation(&mut self, op: u8, value: u8, flag_source: u8) -> Option<u8> {
        match op & 0xF8 {
            0x00 => {
                let res = alu::rlc8(value);
                self.set_f(res.flags);
                Some(res.value)
            }
            0x08 => {
                let res = alu::rrc8(value);
                self.set_f(res.flags);
                Some(res.value)
            }
            0x10 => {
                let res = alu::rl8(value, self.regs.f & CF != 0);
                self.set_f(res.flags);
                Some(res.value)
            }
            0x18 => {
                let res = alu::rr8(value, self.regs.f & CF != 0);
                self.set_f(res.flags);
                Some(res.value)
            }
            0x20 => {
                let res = alu::sla8(value);
                self.set_f(res.flags);
                Some(res.value)
            }
            0x28 => {
                let res = alu::sra8(value);
                self.set_f(res.flags);
                Some(res.value)
            }
            0x30 => {
                let res = alu::sll8(value);
                self.set_f(res.flags);
                Some(res.value)
            }
            0x38 => {
                let res = alu::srl8(value);
                self.set_f(res.flags);
                Some(res.value)
            }
            // BIT
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
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
                flags |= flag_source & (XF | YF);
                self.set_f(flags);
                None
            }
            // RES
            0x80 | 0x88 | 0x90 | 0x98 | 0xA0 | 0xA8 | 0xB0 | 0xB8 => {
                let bit = (op >> 3) & 7;
                Some(value & !(1 << bit))
            }
            // SET
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                let bit = (op >> 3) & 7;
                Some(value | (1 << bit))
            }
            _ => unreachable!(),
        }
    }
}
