//! DD/FD-prefixed opcode table: `IX`/`IY` addressing, plus the undocumented
//! `IXH`/`IXL`/`IYH`/`IYL` 8-bit register forms. Opcodes the prefix has no
//! effect on fall back to the unprefixed table (the prefix just cost two
//! extra T-states for nothing, which is exactly how real hardware behaves).

use crate::alu;
use crate::flags::{CF, PF, SF, ZF};
use crate::microcode::MicroOp;

use super::super::Z80;

impl Z80 {
    /// Decode a DD/FD-prefixed opcode.
    pub(crate) fn decode_indexed(&mut self) {
        let op = self.opcode;
        let _is_iy = self.prefix == 0xFD;

        match op {
            // ADD IX/IY, rr (09=BC, 19=DE, 29=IX/IY, 39=SP)
            0x09 | 0x19 | 0x29 | 0x39 => {
                self.queue_internal(7);
                let idx = self.get_index_reg();
                self.regs.wz = idx.wrapping_add(1);
                let rp = (op >> 4) & 3;
                let rr = self.get_reg16(rp);
                let (result, flags) = alu::add16(idx, rr);
                self.set_index_reg(result);
                self.set_f((self.regs.f & (SF | ZF | PF)) | flags);
            }

            // LD IX/IY, nn
            0x21 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // LD (nn), IX/IY
            0x22 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // INC IX/IY
            0x23 => {
                self.queue_internal(2);
                self.set_index_reg(self.get_index_reg().wrapping_add(1));
            }

            // INC IXH/IYH (undocumented)
            0x24 => {
                let val = (self.get_index_reg() >> 8) as u8;
                let result = alu::inc8(val);
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0x00FF) | ((result.value as u16) << 8));
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // DEC IXH/IYH (undocumented)
            0x25 => {
                let val = (self.get_index_reg() >> 8) as u8;
                let result = alu::dec8(val);
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0x00FF) | ((result.value as u16) << 8));
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // LD IXH/IYH, n (undocumented)
            0x26 => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // LD IX/IY, (nn)
            0x2A => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // DEC IX/IY
            0x2B => {
                self.queue_internal(2);
                self.set_index_reg(self.get_index_reg().wrapping_sub(1));
            }

            // INC IXL/IYL (undocumented)
            0x2C => {
                let val = self.get_index_reg() as u8;
                let result = alu::inc8(val);
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0xFF00) | (result.value as u16));
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // DEC IXL/IYL (undocumented)
            0x2D => {
                let val = self.get_index_reg() as u8;
                let result = alu::dec8(val);
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0xFF00) | (result.value as u16));
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // LD IXL/IYL, n (undocumented)
            0x2E => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // INC (IX+d)/(IY+d)
            0x34 => {
                self.micro_ops.push(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }

            // DEC (IX+d)/(IY+d)
            0x35 => {
                self.micro_ops.push(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }

            // LD (IX+d)/(IY+d), n
            0x36 => {
                self.micro_ops.push(MicroOp::FetchDisplacement);
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // LD r, (IX+d)/(IY+d)
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                self.micro_ops.push(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }

            // LD (IX+d)/(IY+d), r
            0x70 | 0x71 | 0x72 | 0x73 | 0x74 | 0x75 | 0x77 => {
                self.micro_ops.push(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }

            // ALU A, (IX+d)/(IY+d)
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                self.micro_ops.push(MicroOp::FetchDisplacement);
                self.queue_execute_followup();
            }

            // Undocumented LD r, r' with IXH/IXL/IYH/IYL substitution
            0x40..=0x7F => {
                let src = op & 0x07;
                let dst = (op >> 3) & 0x07;
                let src_val = self.get_reg8_indexed(src);
                self.set_reg8_indexed(dst, src_val);
            }

            // ALU A, IXH/IXL/IYH/IYL (undocumented)
            0x84 | 0x85 | 0x8C | 0x8D | 0x94 | 0x95 | 0x9C | 0x9D | 0xA4 | 0xA5 | 0xAC | 0xAD
            | 0xB4 | 0xB5 | 0xBC | 0xBD => {
                let value = self.get_reg8_indexed(op & 7);
                self.apply_accumulator_op(op, value);
            }

            // POP IX/IY
            0xE1 => {
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // EX (SP), IX/IY
            0xE3 => {
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // PUSH IX/IY
            0xE5 => {
                self.queue_internal(1);
                let idx = self.get_index_reg();
                self.data_hi = (idx >> 8) as u8;
                self.data_lo = idx as u8;
                self.micro_ops.push(MicroOp::WriteMemHiFirst);
                self.micro_ops.push(MicroOp::WriteMemLoSecond);
            }

            // JP (IX)/(IY)
            0xE9 => {
                self.regs.pc = self.get_index_reg();
            }

            // LD SP, IX/IY
            0xF9 => {
                self.queue_internal(2);
                self.regs.sp = self.get_index_reg();
            }

            // All other DD/FD opcodes execute as unprefixed (prefix has no effect)
            _ => {
                // Reset prefix so the unprefixed decoder runs cleanly
                self.prefix = 0;
                self.decode_unprefixed();
            }
        }
    }

    /// Finish a DD/FD-prefixed instruction once its queued reads land.
    pub(super) fn indexed_followup(&mut self) {
        let op = self.opcode;
        let _is_iy = self.prefix == 0xFD;

        match op {
            // POP IX/IY
            0xE1 => {
                self.regs.sp = self.regs.sp.wrapping_add(2);
                let value = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.set_index_reg(value);
            }

            // EX (SP), IX/IY
            0xE3 => {
                let stack_lo = self.data_lo;
                let stack_hi = self.data_hi;
                self.queue_internal(1);
                let idx = self.get_index_reg();
                self.data_hi = (idx >> 8) as u8;
                self.data_lo = idx as u8;
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::WriteMem16Lo);
                self.micro_ops.push(MicroOp::WriteMem16Hi);
                self.queue_internal(2);
                let new_val = u16::from(stack_lo) | (u16::from(stack_hi) << 8);
                self.set_index_reg(new_val);
                self.regs.wz = new_val;
            }

            // LD IX/IY, nn
            0x21 => {
                let value = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.set_index_reg(value);
            }

            // LD IXH/IYH, n (undocumented)
            0x26 => {
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0x00FF) | ((self.data_lo as u16) << 8));
            }

            // LD IXL/IYL, n (undocumented)
            0x2E => {
                let idx = self.get_index_reg();
                self.set_index_reg((idx & 0xFF00) | (self.data_lo as u16));
            }

            // LD (nn), IX/IY
            0x22 => {
                let addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = addr.wrapping_add(1);
                let idx = self.get_index_reg();
                self.addr = addr;
                self.data_lo = idx as u8;
                self.data_hi = (idx >> 8) as u8;
                self.micro_ops.push(MicroOp::WriteMem16Lo);
                self.micro_ops.push(MicroOp::WriteMem16Hi);
            }

            // LD IX/IY, (nn) — stage 2
            0x2A if self.followup_stage >= 2 => {
                let value = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.set_index_reg(value);
            }

            // LD IX/IY, (nn) — stage 1
            0x2A => {
                let addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = addr.wrapping_add(1);
                self.addr = addr;
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // INC (IX+d)/(IY+d) — stage 2
            0x34 if self.followup_stage >= 2 => {
                let result = alu::inc8(self.data_lo);
                self.data_lo = result.value;
                self.set_f((self.regs.f & CF) | result.flags);
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // INC (IX+d)/(IY+d) — stage 1
            0x34 => {
                let idx = self.get_index_reg();
                self.addr = idx.wrapping_add(self.displacement as i16 as u16);
                self.regs.wz = self.addr;
                self.queue_internal(5);
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_internal(1);
                self.queue_execute_followup();
            }

            // DEC (IX+d)/(IY+d) — stage 2
            0x35 if self.followup_stage >= 2 => {
                let result = alu::dec8(self.data_lo);
                self.data_lo = result.value;
                self.set_f((self.regs.f & CF) | result.flags);
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // DEC (IX+d)/(IY+d) — stage 1
            0x35 => {
                let idx = self.get_index_reg();
                self.addr = idx.wrapping_add(self.displacement as i16 as u16);
                self.regs.wz = self.addr;
                self.queue_internal(5);
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_internal(1);
                self.queue_execute_followup();
            }

            // LD (IX+d)/(IY+d), n
            0x36 => {
                let idx = self.get_index_reg();
                self.addr = idx.wrapping_add(self.displacement as i16 as u16);
                self.regs.wz = self.addr;
                self.queue_internal(2);
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // LD r, (IX+d)/(IY+d) — stage 2
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E if self.followup_stage >= 2 => {
                let dst = (op >> 3) & 7;
                self.set_reg8(dst, self.data_lo);
            }

            // LD r, (IX+d)/(IY+d) — stage 1
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                let idx = self.get_index_reg();
                self.addr = idx.wrapping_add(self.displacement as i16 as u16);
                self.regs.wz = self.addr;
                self.queue_internal(5);
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // LD (IX+d)/(IY+d), r
            0x70 | 0x71 | 0x72 | 0x73 | 0x74 | 0x75 | 0x77 => {
                let idx = self.get_index_reg();
                self.addr = idx.wrapping_add(self.displacement as i16 as u16);
                self.regs.wz = self.addr;
                self.data_lo = self.get_reg8(op & 7);
                self.queue_internal(5);
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // ALU (IX+d)/(IY+d) — stage 2
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE if self.followup_stage >= 2 => {
                self.apply_accumulator_op(op, self.data_lo);
            }

            // ALU (IX+d)/(IY+d) — stage 1
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                let idx = self.get_index_reg();
                self.addr = idx.wrapping_add(self.displacement as i16 as u16);
                self.regs.wz = self.addr;
                self.queue_internal(5);
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            _ => {
                // Should be handled by fallthrough to unprefixed in decode_indexed
                panic!(
                    "Unimplemented DD/FD followup: opcode={:02X} PC={:04X}",
                    op, self.regs.pc
                );
            }
        }
    }
}
