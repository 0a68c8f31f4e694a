//! The unprefixed opcode table: all 256 base-page instructions.

use crate::alu;
use crate::flags::{sz53p, CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::microcode::MicroOp;

use super::super::Z80;

impl Z80 {
    /// Decode and begin executing an unprefixed opcode.
    pub(crate) fn decode_unprefixed(&mut self) {
        let op = self.opcode;

        match op {
            // NOP
            0x00 => {}

            // LD rr, nn (01=BC, 11=DE, 21=HL, 31=SP)
            0x01 | 0x11 | 0x21 | 0x31 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // LD (BC), A
            0x02 => {
                self.addr = self.regs.bc();
                self.data_lo = self.regs.a;
                self.regs.wz = ((self.regs.a as u16) << 8) | ((self.addr.wrapping_add(1)) & 0xFF);
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // INC rr (03=BC, 13=DE, 23=HL, 33=SP)
            0x03 | 0x13 | 0x23 | 0x33 => {
                self.queue_internal(2);
                let rp = (op >> 4) & 3;
                let val = self.get_reg16(rp).wrapping_add(1);
                self.set_reg16(rp, val);
            }

            // INC r (04=B, 0C=C, 14=D, 1C=E, 24=H, 2C=L, 3C=A)
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x3C => {
                let r = (op >> 3) & 7;
                let val = self.get_reg8(r);
                let result = alu::inc8(val);
                self.set_reg8(r, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // DEC r (05=B, 0D=C, 15=D, 1D=E, 25=H, 2D=L, 3D=A)
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x3D => {
                let r = (op >> 3) & 7;
                let val = self.get_reg8(r);
                let result = alu::dec8(val);
                self.set_reg8(r, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // LD r, n (06=B, 0E=C, 16=D, 1E=E, 26=H, 2E=L, 3E=A)
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // RLCA
            0x07 => {
                let carry = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | carry;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (self.regs.a & (YF | XF))
                        | if carry != 0 { CF } else { 0 },
                );
            }

            // EX AF, AF'
            0x08 => {
                let tmp_a = self.regs.a;
                let tmp_f = self.regs.f;
                self.regs.a = self.regs.a_alt;
                self.regs.f = self.regs.f_alt;
                self.regs.a_alt = tmp_a;
                self.regs.f_alt = tmp_f;
            }

            // ADD HL, rr (09=BC, 19=DE, 29=HL, 39=SP)
            0x09 | 0x19 | 0x29 | 0x39 => {
                self.queue_internal(7);
                let rp = (op >> 4) & 3;
                let hl = self.regs.hl();
                let rr = self.get_reg16(rp);
                self.regs.wz = hl.wrapping_add(1);
                let (result, flags) = alu::add16(hl, rr);
                self.regs.set_hl(result);
                self.set_f((self.regs.f & (SF | ZF | PF)) | flags);
            }

            // LD A, (BC)
            0x0A => {
                self.addr = self.regs.bc();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // DEC rr (0B=BC, 1B=DE, 2B=HL, 3B=SP)
            0x0B | 0x1B | 0x2B | 0x3B => {
                self.queue_internal(2);
                let rp = (op >> 4) & 3;
                let val = self.get_reg16(rp).wrapping_sub(1);
                self.set_reg16(rp, val);
            }

            // RRCA
            0x0F => {
                let carry = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | (carry << 7);
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (self.regs.a & (YF | XF))
                        | if carry != 0 { CF } else { 0 },
                );
            }

            // DJNZ e
            0x10 => {
                self.queue_internal(1);
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // LD (DE), A
            0x12 => {
                self.addr = self.regs.de();
                self.data_lo = self.regs.a;
                self.regs.wz = ((self.regs.a as u16) << 8) | ((self.addr.wrapping_add(1)) & 0xFF);
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // RLA
            0x17 => {
                let old_carry = if self.regs.f & CF != 0 { 1 } else { 0 };
                let new_carry = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | old_carry;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (self.regs.a & (YF | XF))
                        | if new_carry != 0 { CF } else { 0 },
                );
            }

            // JR e
            0x18 => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // LD A, (DE)
            0x1A => {
                self.addr = self.regs.de();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // RRA
            0x1F => {
                let old_carry = if self.regs.f & CF != 0 { 0x80 } else { 0 };
                let new_carry = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | old_carry;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | (self.regs.a & (YF | XF))
                        | if new_carry != 0 { CF } else { 0 },
                );
            }

            // JR cc, e (20=NZ, 28=Z, 30=NC, 38=C)
            0x20 | 0x28 | 0x30 | 0x38 => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // LD (nn), HL
            0x22 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // DAA
            0x27 => {
                let a = self.regs.a;
                let nf = self.regs.f & NF != 0;
                let cf = self.regs.f & CF != 0;
                let hf = self.regs.f & HF != 0;

                let mut correction: u8 = 0;
                let mut new_cf = cf;

                if hf || (a & 0x0F) > 9 {
                    correction |= 0x06;
                }
                if cf || a > 0x99 {
                    correction |= 0x60;
                    new_cf = true;
                }

                let result = if nf {
                    a.wrapping_sub(correction)
                } else {
                    a.wrapping_add(correction)
                };

                let new_hf = if nf {
                    hf && (a & 0x0F) < 6
                } else {
                    (a & 0x0F) > 9
                };

                self.regs.a = result;
                self.set_f(
                    sz53p(result)
                        | if nf { NF } else { 0 }
                        | if new_cf { CF } else { 0 }
                        | if new_hf { HF } else { 0 },
                );
            }

            // LD HL, (nn)
            0x2A => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // CPL
            0x2F => {
                self.regs.a = !self.regs.a;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF | CF)) | HF | NF | (self.regs.a & (XF | YF)),
                );
            }

            // LD (nn), A
            0x32 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // INC (HL)
            0x34 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // DEC (HL)
            0x35 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // LD (HL), n
            0x36 => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // SCF
            0x37 => {
                // Undocumented: X/Y come from (prev_Q XOR F) OR A — the
                // Patrik Rak "Q register" formulation.
                let q_xor_f = self.prev_q ^ self.regs.f;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF)) | CF | ((q_xor_f | self.regs.a) & (XF | YF)),
                );
            }

            // LD A, (nn)
            0x3A => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // CCF
            0x3F => {
                let old_cf = self.regs.f & CF;
                // Undocumented: X/Y come from (prev_Q XOR F) OR A, same as SCF.
                let q_xor_f = self.prev_q ^ self.regs.f;
                self.set_f(
                    (self.regs.f & (SF | ZF | PF))
                        | ((q_xor_f | self.regs.a) & (XF | YF))
                        | if old_cf != 0 { HF } else { 0 }
                        | if old_cf == 0 { CF } else { 0 },
                );
            }

            // LD r, r' (40-7F except 76=HALT)
            0x40..=0x7F if op != 0x76 => {
                let src = op & 7;
                let dst = (op >> 3) & 7;
                if src == 6 {
                    // LD r, (HL)
                    self.addr = self.regs.hl();
                    self.micro_ops.push(MicroOp::ReadMem);
                    self.queue_execute_followup();
                } else if dst == 6 {
                    // LD (HL), r
                    self.addr = self.regs.hl();
                    self.data_lo = self.get_reg8(src);
                    self.micro_ops.push(MicroOp::WriteMem);
                } else {
                    let value = self.get_reg8(src);
                    self.set_reg8(dst, value);
                }
            }

            // HALT
            0x76 => {
                self.regs.halted = true;
            }

            // ALU A, r (80-BF)
            0x80..=0xBF => {
                let r = op & 7;
                if r == 6 {
                    self.addr = self.regs.hl();
                    self.micro_ops.push(MicroOp::ReadMem);
                    self.queue_execute_followup();
                } else {
                    let value = self.get_reg8(r);
                    self.apply_accumulator_op(op, value);
                }
            }

            // RET cc (C0=NZ, C8=Z, D0=NC, D8=C, E0=PO, E8=PE, F0=P, F8=M)
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                let cc = (op >> 3) & 7;
                self.queue_internal(1);
                if self.condition(cc) {
                    self.addr = self.regs.sp;
                    self.micro_ops.push(MicroOp::ReadMem16Lo);
                    self.micro_ops.push(MicroOp::ReadMem16Hi);
                    self.queue_execute_followup();
                }
            }

            // POP rr (C1=BC, D1=DE, E1=HL, F1=AF)
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // JP cc, nn (C2=NZ, CA=Z, D2=NC, DA=C, E2=PO, EA=PE, F2=P, FA=M)
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // JP nn
            0xC3 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // CALL cc, nn (C4=NZ, CC=Z, D4=NC, DC=C, E4=PO, EC=PE, F4=P, FC=M)
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // PUSH rr (C5=BC, D5=DE, E5=HL, F5=AF)
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                self.queue_internal(1);
                let rp = (op >> 4) & 3;
                let val = self.get_reg16_af(rp);
                self.data_hi = (val >> 8) as u8;
                self.data_lo = val as u8;
                self.micro_ops.push(MicroOp::WriteMemHiFirst);
                self.micro_ops.push(MicroOp::WriteMemLoSecond);
            }

            // ALU A, n (C6=ADD, CE=ADC, D6=SUB, DE=SBC, E6=AND, EE=XOR, F6=OR, FE=CP)
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // RST n (C7=00, CF=08, D7=10, DF=18, E7=20, EF=28, F7=30, FF=38)
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.queue_internal(1);
                let target = u16::from(op & 0x38);
                self.regs.wz = target;
                let ret_addr = self.regs.pc;
                self.data_hi = (ret_addr >> 8) as u8;
                self.data_lo = ret_addr as u8;
                self.micro_ops.push(MicroOp::WriteMemHiFirst);
                self.micro_ops.push(MicroOp::WriteMemLoSecond);
                self.regs.pc = target;
            }

            // RET
            0xC9 => {
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // CB prefix — handled by fetch
            0xCB => {
                self.prefix = 0xCB;
                self.micro_ops.push(MicroOp::FetchOpcode);
            }

            // CALL nn
            0xCD => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // OUT (n), A
            0xD3 => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // IN A, (n)
            0xDB => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // EXX
            0xD9 => {
                let tmp;
                tmp = self.regs.b;
                self.regs.b = self.regs.b_alt;
                self.regs.b_alt = tmp;
                let tmp2 = self.regs.c;
                self.regs.c = self.regs.c_alt;
                self.regs.c_alt = tmp2;
                let tmp3 = self.regs.d;
                self.regs.d = self.regs.d_alt;
                self.regs.d_alt = tmp3;
                let tmp4 = self.regs.e;
                self.regs.e = self.regs.e_alt;
                self.regs.e_alt = tmp4;
                let tmp5 = self.regs.h;
                self.regs.h = self.regs.h_alt;
                self.regs.h_alt = tmp5;
                let tmp6 = self.regs.l;
                self.regs.l = self.regs.l_alt;
                self.regs.l_alt = tmp6;
            }

            // DD prefix — handled by fetch
            0xDD => {
                self.prefix = 0xDD;
                self.micro_ops.push(MicroOp::FetchOpcode);
            }

            // EX (SP), HL
            0xE3 => {
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // JP (HL)
            0xE9 => {
                self.regs.pc = self.regs.hl();
            }

            // EX DE, HL
            0xEB => {
                let tmp = self.regs.de();
                self.regs.set_de(self.regs.hl());
                self.regs.set_hl(tmp);
            }

            // ED prefix — handled by fetch
            0xED => {
                self.prefix = 0xED;
                self.micro_ops.push(MicroOp::FetchOpcode);
            }

            // DI
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
            }

            // EI
            0xFB => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.ei_delay = true;
            }

            // FD prefix — handled by fetch
            0xFD => {
                self.prefix = 0xFD;
                self.micro_ops.push(MicroOp::FetchOpcode);
            }

            // LD SP, HL
            0xF9 => {
                self.queue_internal(2);
                self.regs.sp = self.regs.hl();
            }

            _ => {
                // Should not happen — all 256 opcodes covered
                panic!(
                    "Unimplemented opcode: {:02X} at PC={:04X}",
                    op,
                    self.regs.pc.wrapping_sub(1)
                );
            }
        }
    }

    /// Finish an unprefixed instruction once its queued immediate/memory
    /// reads have supplied data.
    pub(super) fn unprefixed_followup(&mut self) {
        let op = self.opcode;

        match op {
            // LD rr, nn (01=BC, 11=DE, 21=HL, 31=SP)
            0x01 | 0x11 | 0x21 | 0x31 => {
                let rp = (op >> 4) & 3;
                let val = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.set_reg16(rp, val);
            }

            // LD r, n (06=B, 0E=C, 16=D, 1E=E, 26=H, 2E=L, 3E=A)
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                let r = (op >> 3) & 7;
                self.set_reg8(r, self.data_lo);
            }

            // LD A, (BC)
            0x0A => {
                self.regs.a = self.data_lo;
                self.regs.wz = self.regs.bc().wrapping_add(1);
            }

            // DJNZ e
            0x10 => {
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.queue_internal(5);
                    let displacement = self.data_lo as i8;
                    self.regs.pc = self.regs.pc.wrapping_add(displacement as u16);
                    self.regs.wz = self.regs.pc;
                }
            }

            // JR e
            0x18 => {
                self.queue_internal(5);
                let displacement = self.data_lo as i8;
                self.regs.pc = self.regs.pc.wrapping_add(displacement as u16);
                self.regs.wz = self.regs.pc;
            }

            // LD A, (DE)
            0x1A => {
                self.regs.a = self.data_lo;
                self.regs.wz = self.regs.de().wrapping_add(1);
            }

            // JR cc, e (20=NZ, 28=Z, 30=NC, 38=C)
            0x20 | 0x28 | 0x30 | 0x38 => {
                let cc = (op >> 3) & 3; // Map: 20→0(NZ), 28→1(Z), 30→2(NC), 38→3(C)
                let taken = match cc {
                    0 => self.regs.f & ZF == 0, // NZ
                    1 => self.regs.f & ZF != 0, // Z
                    2 => self.regs.f & CF == 0,      // NC
                    3 => self.regs.f & CF != 0,      // C
                    _ => unreachable!(),
                };
                if taken {
                    self.queue_internal(5);
                    let displacement = self.data_lo as i8;
                    self.regs.pc = self.regs.pc.wrapping_add(displacement as u16);
                    self.regs.wz = self.regs.pc;
                }
            }

            // LD (nn), HL
            0x22 => {
                self.addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = self.addr.wrapping_add(1);
                self.data_lo = self.regs.l;
                self.data_hi = self.regs.h;
                self.micro_ops.push(MicroOp::WriteMem16Lo);
                self.micro_ops.push(MicroOp::WriteMem16Hi);
            }

            // LD HL, (nn) — stage 2: data loaded
            0x2A if self.followup_stage >= 2 => {
                self.regs.l = self.data_lo;
                self.regs.h = self.data_hi;
            }

            // LD HL, (nn) — stage 1: set up memory read
            0x2A => {
                self.addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = self.addr.wrapping_add(1);
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // LD (nn), A
            0x32 => {
                self.addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = ((self.regs.a as u16) << 8) | ((self.addr.wrapping_add(1)) & 0xFF);
                self.data_lo = self.regs.a;
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // INC (HL)
            0x34 => {
                self.queue_internal(1);
                let result = alu::inc8(self.data_lo);
                self.data_lo = result.value;
                self.set_f((self.regs.f & CF) | result.flags);
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // DEC (HL)
            0x35 => {
                self.queue_internal(1);
                let result = alu::dec8(self.data_lo);
                self.data_lo = result.value;
                self.set_f((self.regs.f & CF) | result.flags);
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // LD (HL), n
            0x36 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::WriteMem);
            }

            // LD A, (nn) — stage 2
            0x3A if self.followup_stage >= 2 => {
                self.regs.a = self.data_lo;
            }

            // LD A, (nn) — stage 1
            0x3A => {
                self.addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = self.addr.wrapping_add(1);
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // LD r, (HL) follow-up
            0x46 | 0x4E | 0x56 | 0x5E | 0x66 | 0x6E | 0x7E => {
                let dst = (op >> 3) & 7;
                self.set_reg8(dst, self.data_lo);
            }

            // ALU A, (HL) follow-up
            0x86 | 0x8E | 0x96 | 0x9E | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                self.apply_accumulator_op(op, self.data_lo);
            }

            // RET cc follow-up (conditional returns)
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                self.regs.sp = self.regs.sp.wrapping_add(2);
                let addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = addr;
                self.regs.pc = addr;
            }

            // POP rr (C1=BC, D1=DE, E1=HL, F1=AF)
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                self.regs.sp = self.regs.sp.wrapping_add(2);
                let rp = (op >> 4) & 3;
                let val = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.set_reg16_af(rp, val);
            }

            // JP cc, nn follow-up
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = addr;
                let cc = (op >> 3) & 7;
                if self.condition(cc) {
                    self.regs.pc = addr;
                }
            }

            // JP nn
            0xC3 => {
                let addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = addr;
                self.regs.pc = addr;
            }

            // CALL cc, nn follow-up
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let target = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = target;
                let cc = (op >> 3) & 7;
                if self.condition(cc) {
                    self.queue_internal(1);
                    let ret_addr = self.regs.pc;
                    self.data_hi = (ret_addr >> 8) as u8;
                    self.data_lo = ret_addr as u8;
                    self.micro_ops.push(MicroOp::WriteMemHiFirst);
                    self.micro_ops.push(MicroOp::WriteMemLoSecond);
                    self.regs.pc = target;
                }
            }

            // ALU A, n follow-up (C6=ADD, CE=ADC, D6=SUB, DE=SBC, E6=AND, EE=XOR, F6=OR, FE=CP)
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                self.apply_accumulator_op(op, self.data_lo);
            }

            // RET
            0xC9 => {
                let addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.sp = self.regs.sp.wrapping_add(2);
                self.regs.wz = addr;
                self.regs.pc = addr;
            }

            // CALL nn
            0xCD => {
                let target = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = target;
                self.queue_internal(1);
                let ret_addr = self.regs.pc;
                self.data_hi = (ret_addr >> 8) as u8;
                self.data_lo = ret_addr as u8;
                self.micro_ops.push(MicroOp::WriteMemHiFirst);
                self.micro_ops.push(MicroOp::WriteMemLoSecond);
                self.regs.pc = target;
            }

            // OUT (n), A — follow-up: port address = (A << 8) | n
            0xD3 => {
                let port = (u16::from(self.regs.a) << 8) | u16::from(self.data_lo);
                self.regs.wz =
                    ((self.regs.a as u16) << 8) | ((self.data_lo.wrapping_add(1)) as u16);
                self.addr = port;
                self.data_lo = self.regs.a;
                self.micro_ops.push(MicroOp::IoWrite);
            }

            // IN A, (n) — stage 2: store read value
            0xDB if self.followup_stage >= 2 => {
                self.regs.a = self.data_lo;
            }

            // IN A, (n) — follow-up: port address = (A << 8) | n
            0xDB => {
                let port = (u16::from(self.regs.a) << 8) | u16::from(self.data_lo);
                self.regs.wz = port.wrapping_add(1);
                self.addr = port;
                self.micro_ops.push(MicroOp::IoRead);
                self.queue_execute_followup();
            }

            // EX (SP), HL — follow-up: read done, write HL to stack
            0xE3 => {
                // data_lo/data_hi have stack values
                let stack_lo = self.data_lo;
                let stack_hi = self.data_hi;
                self.queue_internal(1);
                // Write HL to (SP)
                self.data_hi = self.regs.h;
                self.data_lo = self.regs.l;
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::WriteMem16Lo);
                self.micro_ops.push(MicroOp::WriteMem16Hi);
                self.queue_internal(2);
                // Load HL from stack values
                self.regs.l = stack_lo;
                self.regs.h = stack_hi;
                self.regs.wz = self.regs.hl();
            }

            _ => {
                panic!(
                    "Unimplemented followup: opcode={:02X} PC={:04X}",
                    op, self.regs.pc
                );
            }
        }
    }
}
