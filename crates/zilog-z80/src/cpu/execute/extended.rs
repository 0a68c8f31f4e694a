//! ED-prefixed opcode table: port I/O, 16-bit `ADC`/`SBC`, block transfer /
//! search / I/O instructions, interrupt mode selection, and the `I`/`R`
//! register loads.

use crate::alu;
use crate::flags::{sz53p, CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::microcode::MicroOp;

use super::super::Z80;

impl Z80 {
    /// Decode an ED-prefixed opcode.
    pub(crate) fn decode_ed(&mut self) {
        let op = self.opcode;

        match op {
            // IN r, (C) (40=B, 48=C, 50=D, 58=E, 60=H, 68=L, 78=A)
            // Also 70 = IN (C) — result discarded but flags set
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_add(1);
                self.micro_ops.push(MicroOp::IoRead);
                self.queue_execute_followup();
            }

            // OUT (C), r (41=B, 49=C, 51=D, 59=E, 61=H, 69=L, 79=A)
            // Also 71 = OUT (C), 0
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_add(1);
                let r = (op >> 3) & 7;
                self.data_lo = if r == 6 { 0 } else { self.get_reg8(r) };
                self.micro_ops.push(MicroOp::IoWrite);
            }

            // SBC HL, rr (42=BC, 52=DE, 62=HL, 72=SP)
            0x42 | 0x52 | 0x62 | 0x72 => {
                self.queue_internal(7);
                let rp = (op >> 4) & 3;
                let hl = self.regs.hl();
                self.regs.wz = hl.wrapping_add(1);
                let rr = self.get_reg16(rp);
                let (result, flags) = alu::sbc16(hl, rr, self.regs.f & CF != 0);
                self.regs.set_hl(result);
                self.set_f(flags);
            }

            // LD (nn), rr (43=BC, 53=DE, 63=HL, 73=SP)
            0x43 | 0x53 | 0x63 | 0x73 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // NEG (and undocumented mirrors)
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let result = alu::sub8(0, self.regs.a, false);
                self.regs.a = result.value;
                self.set_f(result.flags);
            }

            // RETN (and undocumented mirrors)
            0x45 | 0x55 | 0x65 | 0x75 => {
                self.regs.iff1 = self.regs.iff2;
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // IM 0 (and undocumented mirrors)
            0x46 | 0x66 | 0x4E | 0x6E => {
                self.regs.im = 0;
            }

            // LD I, A
            0x47 => {
                self.queue_internal(1);
                self.regs.i = self.regs.a;
            }

            // ADC HL, rr (4A=BC, 5A=DE, 6A=HL, 7A=SP)
            0x4A | 0x5A | 0x6A | 0x7A => {
                self.queue_internal(7);
                let rp = (op >> 4) & 3;
                let hl = self.regs.hl();
                self.regs.wz = hl.wrapping_add(1);
                let rr = self.get_reg16(rp);
                let (result, flags) = alu::adc16(hl, rr, self.regs.f & CF != 0);
                self.regs.set_hl(result);
                self.set_f(flags);
            }

            // LD rr, (nn) (4B=BC, 5B=DE, 6B=HL, 7B=SP)
            0x4B | 0x5B | 0x6B | 0x7B => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // RETI (and undocumented mirrors)
            0x4D | 0x5D | 0x6D | 0x7D => {
                self.regs.iff1 = self.regs.iff2;
                self.addr = self.regs.sp;
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // LD R, A
            0x4F => {
                self.queue_internal(1);
                self.regs.r = self.regs.a;
            }

            // IM 1
            0x56 | 0x76 => {
                self.regs.im = 1;
            }

            // LD A, I
            0x57 => {
                self.queue_internal(1);
                self.regs.a = self.regs.i;
                self.set_f(
                    (self.regs.f & CF)
                        | if self.regs.a & 0x80 != 0 { SF } else { 0 }
                        | if self.regs.a == 0 { ZF } else { 0 }
                        | (self.regs.a & (YF | XF))
                        | if self.regs.iff2 { PF } else { 0 },
                );
                self.last_was_ld_a_ir = true;
            }

            // IM 2
            0x5E | 0x7E => {
                self.regs.im = 2;
            }

            // LD A, R
            0x5F => {
                self.queue_internal(1);
                self.regs.a = self.regs.r;
                self.set_f(
                    (self.regs.f & CF)
                        | if self.regs.a & 0x80 != 0 { SF } else { 0 }
                        | if self.regs.a == 0 { ZF } else { 0 }
                        | (self.regs.a & (YF | XF))
                        | if self.regs.iff2 { PF } else { 0 },
                );
                self.last_was_ld_a_ir = true;
            }

            // RRD
            0x67 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // RLD
            0x6F => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // LDI
            0xA0 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // CPI
            0xA1 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // INI
            0xA2 => {
                self.queue_internal(1);
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_add(1);
                self.micro_ops.push(MicroOp::IoRead);
                self.queue_execute_followup();
            }

            // OUTI
            0xA3 => {
                self.queue_internal(1);
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // LDD
            0xA8 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // CPD
            0xA9 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // IND
            0xAA => {
                self.queue_internal(1);
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_sub(1);
                self.micro_ops.push(MicroOp::IoRead);
                self.queue_execute_followup();
            }

            // OUTD
            0xAB => {
                self.queue_internal(1);
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // LDIR
            0xB0 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // CPIR
            0xB1 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // INIR
            0xB2 => {
                self.queue_internal(1);
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_add(1);
                self.micro_ops.push(MicroOp::IoRead);
                self.queue_execute_followup();
            }

            // OTIR
            0xB3 => {
                self.queue_internal(1);
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // LDDR
            0xB8 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // CPDR
            0xB9 => {
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // INDR
            0xBA => {
                self.queue_internal(1);
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_sub(1);
                self.micro_ops.push(MicroOp::IoRead);
                self.queue_execute_followup();
            }

            // OTDR
            0xBB => {
                self.queue_internal(1);
                self.addr = self.regs.hl();
                self.micro_ops.push(MicroOp::ReadMem);
                self.queue_execute_followup();
            }

            // All undefined ED opcodes are NOP (8 T-states total: 4 for the
            // ED fetch + 4 for the opcode fetch)
            _ => {}
        }
    }

    /// Finish an ED-prefixed instruction once its queued reads land.
    pub(super) fn ed_followup(&mut self) {
        let op = self.opcode;

        match op {
            // IN r, (C) follow-up
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let r = (op >> 3) & 7;
                if r != 6 {
                    self.set_reg8(r, self.data_lo);
                }
                self.set_f(sz53p(self.data_lo) | (self.regs.f & CF));
            }

            // RETN/RETI follow-up
            0x45 | 0x55 | 0x65 | 0x75 | 0x4D | 0x5D | 0x6D | 0x7D => {
                self.regs.sp = self.regs.sp.wrapping_add(2);
                let addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = addr;
                self.regs.pc = addr;
            }

            // LD (nn), rr (43=BC, 53=DE, 63=HL, 73=SP)
            0x43 | 0x53 | 0x63 | 0x73 => {
                self.addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = self.addr.wrapping_add(1);
                let rp = (op >> 4) & 3;
                let val = self.get_reg16(rp);
                self.data_lo = val as u8;
                self.data_hi = (val >> 8) as u8;
                self.micro_ops.push(MicroOp::WriteMem16Lo);
                self.micro_ops.push(MicroOp::WriteMem16Hi);
            }

            // LD rr, (nn) — stage 2
            0x4B | 0x5B | 0x6B | 0x7B if self.followup_stage >= 2 => {
                let rp = (op >> 4) & 3;
                let val = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.set_reg16(rp, val);
            }

            // LD rr, (nn) — stage 1
            0x4B | 0x5B | 0x6B | 0x7B => {
                self.addr = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = self.addr.wrapping_add(1);
                self.micro_ops.push(MicroOp::ReadMem16Lo);
                self.micro_ops.push(MicroOp::ReadMem16Hi);
                self.queue_execute_followup();
            }

            // RRD
            0x67 => {
                let mem = self.data_lo;
                self.queue_internal(4);
                self.regs.wz = self.regs.hl().wrapping_add(1);
                let new_a = (self.regs.a & 0xF0) | (mem & 0x0F);
                let new_mem = ((self.regs.a & 0x0F) << 4) | ((mem >> 4) & 0x0F);
                self.regs.a = new_a;
                self.data_lo = new_mem;
                self.micro_ops.push(MicroOp::WriteMem);
                self.set_f(sz53p(self.regs.a) | (self.regs.f & CF));
            }

            // RLD
            0x6F => {
                let mem = self.data_lo;
                self.queue_internal(4);
                self.regs.wz = self.regs.hl().wrapping_add(1);
                let new_a = (self.regs.a & 0xF0) | ((mem >> 4) & 0x0F);
                let new_mem = ((mem & 0x0F) << 4) | (self.regs.a & 0x0F);
                self.regs.a = new_a;
                self.data_lo = new_mem;
                self.micro_ops.push(MicroOp::WriteMem);
                self.set_f(sz53p(self.regs.a) | (self.regs.f & CF));
            }

            // LDI
            0xA0 => {
                let value = self.data_lo;
                self.addr = self.regs.de();
                self.data_lo = value;
                self.micro_ops.push(MicroOp::WriteMem);
                self.queue_internal(2);
                self.regs.set_hl(self.regs.hl().wrapping_add(1));
                self.regs.set_de(self.regs.de().wrapping_add(1));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                let n = value.wrapping_add(self.regs.a);
                self.set_f(
                    (self.regs.f & (SF | ZF | CF))
                        | (n & XF)
                        | if n & 0x02 != 0 { YF } else { 0 }
                        | if self.regs.bc() != 0 { PF } else { 0 },
                );
            }

            // CPI
            0xA1 => {
                let value = self.data_lo;
                self.queue_internal(5);
                self.regs.wz = self.regs.wz.wrapping_add(1);
                let result = self.regs.a.wrapping_sub(value);
                let hf = (self.regs.a & 0x0F) < (value & 0x0F);
                let n = result.wrapping_sub(if hf { 1 } else { 0 });
                self.regs.set_hl(self.regs.hl().wrapping_add(1));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                self.set_f(
                    (self.regs.f & CF)
                        | NF
                        | if result == 0 { ZF } else { 0 }
                        | if result & 0x80 != 0 { SF } else { 0 }
                        | if hf { HF } else { 0 }
                        | (n & XF)
                        | if n & 0x02 != 0 { YF } else { 0 }
                        | if self.regs.bc() != 0 { PF } else { 0 },
                );
            }

            // INI
            0xA2 => {
                let value = self.data_lo;
                self.addr = self.regs.hl();
                self.data_lo = value;
                self.micro_ops.push(MicroOp::WriteMem);
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.regs.set_hl(self.regs.hl().wrapping_add(1));
                let k = u16::from(value) + u16::from(self.regs.c.wrapping_add(1));
                self.set_f(
                    if self.regs.b == 0 { ZF } else { 0 }
                        | (self.regs.b & (SF | YF | XF))
                        | if value & 0x80 != 0 { NF } else { 0 }
                        | if (k & 0xFF) < value as u16 {
                            HF | CF
                        } else {
                            0
                        }
                        | sz53p((k as u8) & 7 ^ self.regs.b) & PF,
                );
            }

            // OUTI
            0xA3 => {
                let value = self.data_lo;
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_add(1);
                self.data_lo = value;
                self.micro_ops.push(MicroOp::IoWrite);
                self.regs.set_hl(self.regs.hl().wrapping_add(1));
                let k = u16::from(value) + u16::from(self.regs.l);
                self.set_f(
                    if self.regs.b == 0 { ZF } else { 0 }
                        | (self.regs.b & (SF | YF | XF))
                        | if value & 0x80 != 0 { NF } else { 0 }
                        | if (k & 0xFF) < value as u16 {
                            HF | CF
                        } else {
                            0
                        }
                        | sz53p((k as u8) & 7 ^ self.regs.b) & PF,
                );
            }

            // LDD
            0xA8 => {
                let value = self.data_lo;
                self.addr = self.regs.de();
                self.data_lo = value;
                self.micro_ops.push(MicroOp::WriteMem);
                self.queue_internal(2);
                self.regs.set_hl(self.regs.hl().wrapping_sub(1));
                self.regs.set_de(self.regs.de().wrapping_sub(1));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                let n = value.wrapping_add(self.regs.a);
                self.set_f(
                    (self.regs.f & (SF | ZF | CF))
                        | (n & XF)
                        | if n & 0x02 != 0 { YF } else { 0 }
                        | if self.regs.bc() != 0 { PF } else { 0 },
                );
            }

            // CPD
            0xA9 => {
                let value = self.data_lo;
                self.queue_internal(5);
                self.regs.wz = self.regs.wz.wrapping_sub(1);
                let result = self.regs.a.wrapping_sub(value);
                let hf = (self.regs.a & 0x0F) < (value & 0x0F);
                let n = result.wrapping_sub(if hf { 1 } else { 0 });
                self.regs.set_hl(self.regs.hl().wrapping_sub(1));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                self.set_f(
                    (self.regs.f & CF)
                        | NF
                        | if result == 0 { ZF } else { 0 }
                        | if result & 0x80 != 0 { SF } else { 0 }
                        | if hf { HF } else { 0 }
                        | (n & XF)
                        | if n & 0x02 != 0 { YF } else { 0 }
                        | if self.regs.bc() != 0 { PF } else { 0 },
                );
            }

            // IND
            0xAA => {
                let value = self.data_lo;
                self.addr = self.regs.hl();
                self.data_lo = value;
                self.micro_ops.push(MicroOp::WriteMem);
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.regs.set_hl(self.regs.hl().wrapping_sub(1));
                let k = u16::from(value) + u16::from(self.regs.c.wrapping_sub(1));
                self.set_f(
                    if self.regs.b == 0 { ZF } else { 0 }
                        | (self.regs.b & (SF | YF | XF))
                        | if value & 0x80 != 0 { NF } else { 0 }
                        | if (k & 0xFF) < value as u16 {
                            HF | CF
                        } else {
                            0
                        }
                        | sz53p((k as u8) & 7 ^ self.regs.b) & PF,
                );
            }

            // OUTD
            0xAB => {
                let value = self.data_lo;
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_sub(1);
                self.data_lo = value;
                self.micro_ops.push(MicroOp::IoWrite);
                self.regs.set_hl(self.regs.hl().wrapping_sub(1));
                let k = u16::from(value) + u16::from(self.regs.l);
                self.set_f(
                    if self.regs.b == 0 { ZF } else { 0 }
                        | (self.regs.b & (SF | YF | XF))
                        | if value & 0x80 != 0 { NF } else { 0 }
                        | if (k & 0xFF) < value as u16 {
                            HF | CF
                        } else {
                            0
                        }
                        | sz53p((k as u8) & 7 ^ self.regs.b) & PF,
                );
            }

            // LDIR
            0xB0 => {
                let value = self.data_lo;
                self.addr = self.regs.de();
                self.data_lo = value;
                self.micro_ops.push(MicroOp::WriteMem);
                self.queue_internal(2);
                self.regs.set_hl(self.regs.hl().wrapping_add(1));
                self.regs.set_de(self.regs.de().wrapping_add(1));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                let n = value.wrapping_add(self.regs.a);
                if self.regs.bc() != 0 {
                    // Repeat: XF/YF come from PCH after the PC decrement.
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    let pch = (self.regs.pc >> 8) as u8;
                    self.set_f((self.regs.f & (SF | ZF | CF)) | PF | (pch & (XF | YF)));
                } else {
                    self.set_f(
                        (self.regs.f & (SF | ZF | CF))
                            | (n & XF)
                            | if n & 0x02 != 0 { YF } else { 0 },
                    );
                }
            }

            // CPIR
            0xB1 => {
                let value = self.data_lo;
                self.queue_internal(5);
                self.regs.wz = self.regs.wz.wrapping_add(1);
                let result = self.regs.a.wrapping_sub(value);
                let hf = (self.regs.a & 0x0F) < (value & 0x0F);
                let n = result.wrapping_sub(if hf { 1 } else { 0 });
                self.regs.set_hl(self.regs.hl().wrapping_add(1));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                let base_f = (self.regs.f & CF)
                    | NF
                    | if result == 0 { ZF } else { 0 }
                    | if result & 0x80 != 0 { SF } else { 0 }
                    | if hf { HF } else { 0 }
                    | if self.regs.bc() != 0 { PF } else { 0 };
                if self.regs.bc() != 0 && result != 0 {
                    // Repeat: XF/YF come from PCH.
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    let pch = (self.regs.pc >> 8) as u8;
                    self.set_f(base_f | (pch & (XF | YF)));
                } else {
                    self.set_f(base_f | (n & XF) | if n & 0x02 != 0 { YF } else { 0 });
                }
            }

            // INIR
            0xB2 => {
                let value = self.data_lo;
                self.addr = self.regs.hl();
                self.data_lo = value;
                self.micro_ops.push(MicroOp::WriteMem);
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.regs.set_hl(self.regs.hl().wrapping_add(1));
                let k = u16::from(value) + u16::from(self.regs.c.wrapping_add(1));
                let hcf = k > 255;
                let nf = value & 0x80 != 0;
                let p = ((k as u8) & 7) ^ self.regs.b;
                if self.regs.b != 0 {
                    // Repeat: HF/PF recomputed, XF/YF from PCH, WZ = PC + 1.
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    let pch = (self.regs.pc >> 8) as u8;
                    let (hf, pf) = if hcf {
                        if nf {
                            (
                                if self.regs.b & 0x0F == 0 { HF } else { 0 },
                                sz53p(p ^ (self.regs.b.wrapping_sub(1) & 7)) & PF,
                            )
                        } else {
                            (
                                if self.regs.b & 0x0F == 0x0F { HF } else { 0 },
                                sz53p(p ^ (self.regs.b.wrapping_add(1) & 7)) & PF,
                            )
                        }
                    } else {
                        (0, sz53p(p ^ (self.regs.b & 7)) & PF)
                    };
                    self.set_f(
                        (self.regs.b & SF)
                            | (pch & (XF | YF))
                            | if nf { NF } else { 0 }
                            | if hcf { CF } else { 0 }
                            | hf
                            | pf,
                    );
                } else {
                    self.set_f(
                        ZF | if nf { NF } else { 0 }
                            | if hcf { HF | CF } else { 0 }
                            | sz53p(p) & PF,
                    );
                }
            }

            // OTIR
            0xB3 => {
                let value = self.data_lo;
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_add(1);
                self.data_lo = value;
                self.micro_ops.push(MicroOp::IoWrite);
                self.regs.set_hl(self.regs.hl().wrapping_add(1));
                let k = u16::from(value) + u16::from(self.regs.l);
                let hcf = k > 255;
                let nf = value & 0x80 != 0;
                let p = ((k as u8) & 7) ^ self.regs.b;
                if self.regs.b != 0 {
                    // Repeat: HF/PF recomputed, XF/YF from PCH, WZ = PC + 1.
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    let pch = (self.regs.pc >> 8) as u8;
                    let (hf, pf) = if hcf {
                        if nf {
                            (
                                if self.regs.b & 0x0F == 0 { HF } else { 0 },
                                sz53p(p ^ (self.regs.b.wrapping_sub(1) & 7)) & PF,
                            )
                        } else {
                            (
                                if self.regs.b & 0x0F == 0x0F { HF } else { 0 },
                                sz53p(p ^ (self.regs.b.wrapping_add(1) & 7)) & PF,
                            )
                        }
                    } else {
                        (0, sz53p(p ^ (self.regs.b & 7)) & PF)
                    };
                    self.set_f(
                        (self.regs.b & SF)
                            | (pch & (XF | YF))
                            | if nf { NF } else { 0 }
                            | if hcf { CF } else { 0 }
                            | hf
                            | pf,
                    );
                } else {
                    self.set_f(
                        ZF | if nf { NF } else { 0 }
                            | if hcf { HF | CF } else { 0 }
                            | sz53p(p) & PF,
                    );
                }
            }

            // LDDR
            0xB8 => {
                let value = self.data_lo;
                self.addr = self.regs.de();
                self.data_lo = value;
                self.micro_ops.push(MicroOp::WriteMem);
                self.queue_internal(2);
                self.regs.set_hl(self.regs.hl().wrapping_sub(1));
                self.regs.set_de(self.regs.de().wrapping_sub(1));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                let n = value.wrapping_add(self.regs.a);
                if self.regs.bc() != 0 {
                    // Repeat: XF/YF come from PCH after the PC decrement.
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    let pch = (self.regs.pc >> 8) as u8;
                    self.set_f((self.regs.f & (SF | ZF | CF)) | PF | (pch & (XF | YF)));
                } else {
                    self.set_f(
                        (self.regs.f & (SF | ZF | CF))
                            | (n & XF)
                            | if n & 0x02 != 0 { YF } else { 0 },
                    );
                }
            }

            // CPDR
            0xB9 => {
                let value = self.data_lo;
                self.queue_internal(5);
                self.regs.wz = self.regs.wz.wrapping_sub(1);
                let result = self.regs.a.wrapping_sub(value);
                let hf = (self.regs.a & 0x0F) < (value & 0x0F);
                let n = result.wrapping_sub(if hf { 1 } else { 0 });
                self.regs.set_hl(self.regs.hl().wrapping_sub(1));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                let base_f = (self.regs.f & CF)
                    | NF
                    | if result == 0 { ZF } else { 0 }
                    | if result & 0x80 != 0 { SF } else { 0 }
                    | if hf { HF } else { 0 }
                    | if self.regs.bc() != 0 { PF } else { 0 };
                if self.regs.bc() != 0 && result != 0 {
                    // Repeat: XF/YF come from PCH.
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    let pch = (self.regs.pc >> 8) as u8;
                    self.set_f(base_f | (pch & (XF | YF)));
                } else {
                    self.set_f(base_f | (n & XF) | if n & 0x02 != 0 { YF } else { 0 });
                }
            }

            // INDR
            0xBA => {
                let value = self.data_lo;
                self.addr = self.regs.hl();
                self.data_lo = value;
                self.micro_ops.push(MicroOp::WriteMem);
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.regs.set_hl(self.regs.hl().wrapping_sub(1));
                let k = u16::from(value) + u16::from(self.regs.c.wrapping_sub(1));
                let hcf = k > 255;
                let nf = value & 0x80 != 0;
                let p = ((k as u8) & 7) ^ self.regs.b;
                if self.regs.b != 0 {
                    // Repeat: HF/PF recomputed, XF/YF from PCH, WZ = PC + 1.
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    let pch = (self.regs.pc >> 8) as u8;
                    let (hf, pf) = if hcf {
                        if nf {
                            (
                                if self.regs.b & 0x0F == 0 { HF } else { 0 },
                                sz53p(p ^ (self.regs.b.wrapping_sub(1) & 7)) & PF,
                            )
                        } else {
                            (
                                if self.regs.b & 0x0F == 0x0F { HF } else { 0 },
                                sz53p(p ^ (self.regs.b.wrapping_add(1) & 7)) & PF,
                            )
                        }
                    } else {
                        (0, sz53p(p ^ (self.regs.b & 7)) & PF)
                    };
                    self.set_f(
                        (self.regs.b & SF)
                            | (pch & (XF | YF))
                            | if nf { NF } else { 0 }
                            | if hcf { CF } else { 0 }
                            | hf
                            | pf,
                    );
                } else {
                    self.set_f(
                        ZF | if nf { NF } else { 0 }
                            | if hcf { HF | CF } else { 0 }
                            | sz53p(p) & PF,
                    );
                }
            }

            // OTDR
            0xBB => {
                let value = self.data_lo;
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_sub(1);
                self.data_lo = value;
                self.micro_ops.push(MicroOp::IoWrite);
                self.regs.set_hl(self.regs.hl().wrapping_sub(1));
                let k = u16::from(value) + u16::from(self.regs.l);
                let hcf = k > 255;
                let nf = value & 0x80 != 0;
                let p = ((k as u8) & 7) ^ self.regs.b;
                if self.regs.b != 0 {
                    // Repeat: HF/PF recomputed, XF/YF from PCH, WZ = PC + 1.
                    self.queue_internal(5);
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    let pch = (self.regs.pc >> 8) as u8;
                    let (hf, pf) = if hcf {
                        if nf {
                            (
                                if self.regs.b & 0x0F == 0 { HF } else { 0 },
                                sz53p(p ^ (self.regs.b.wrapping_sub(1) & 7)) & PF,
                            )
                        } else {
                            (
                                if self.regs.b & 0x0F == 0x0F { HF } else { 0 },
                                sz53p(p ^ (self.regs.b.wrapping_add(1) & 7)) & PF,
                            )
                        }
                    } else {
                        (0, sz53p(p ^ (self.regs.b & 7)) & PF)
                    };
                    self.set_f(
                        (self.regs.b & SF)
                            | (pch & (XF | YF))
                            | if nf { NF } else { 0 }
                            | if hcf { CF } else { 0 }
                            | hf
                            | pf,
                    );
                } else {
                    self.set_f(
                        ZF | if nf { NF } else { 0 }
                            | if hcf { HF | CF } else { 0 }
                            | sz53p(p) & PF,
                    );
                }
            }

            _ => {
                panic!(
                    "Unimplemented ED followup: opcode={:02X} PC={:04X}",
                    op, self.regs.pc
                );
            }
        }
    }
}
