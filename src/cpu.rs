use crate::bus::Bus;
use crate::opcodes::{self, Addr, AluOp, Cond, Instruction, Operand8, RotOp};
use crate::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z, Reg16, Registers};

// Interrupt vectors (gbdev.io/pandocs/Interrupts.html)
const INTERRUPT_VBLANK: u16 = 0x40;
const INTERRUPT_STAT: u16 = 0x48;
const INTERRUPT_TIMER: u16 = 0x50;
const INTERRUPT_SERIAL: u16 = 0x58;
const INTERRUPT_JOYPAD: u16 = 0x60;

/// Cycle cost of an interrupt dispatch (5 machine cycles).
const DISPATCH_CYCLES: u32 = 20;

/// Cycle cost of a step taken while halted with nothing pending.
const HALT_IDLE_CYCLES: u32 = 1;

pub struct Cpu {
    pub regs: Registers,
    pub ime: bool,
    pub halted: bool,
    /// Total cycles executed since power-on.
    pub cycles: u64,
    /// HALT executed with IME clear and an interrupt already pending:
    /// the next fetch reads the opcode without advancing PC.
    halt_bug: bool,
    /// EI takes effect only after the following instruction completes.
    ime_enable_delay: u8,
}

impl Cpu {
    /// CPU in the post-boot register state.
    pub fn new() -> Self {
        Self {
            regs: Registers::post_boot(),
            ime: false,
            halted: false,
            cycles: 0,
            halt_bug: false,
            ime_enable_delay: 0,
        }
    }

    /// CPU in a neutral power-on state, for executing a boot ROM from 0x0000.
    pub fn new_power_on() -> Self {
        Self {
            regs: Registers::power_on(),
            ..Self::new()
        }
    }

    /// Execute one instruction (or dispatch one interrupt, or idle one
    /// cycle while halted) and return the cycle cost. The driver is
    /// expected to advance the rest of the machine by the returned count.
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        if let Some(cost) = self.dispatch_interrupt(bus) {
            self.cycles += cost as u64;
            return cost;
        }

        if self.halted {
            if bus.pending_interrupts() == 0 {
                self.cycles += HALT_IDLE_CYCLES as u64;
                return HALT_IDLE_CYCLES;
            }
            // Halt-exit with IME clear: resume execution, no dispatch.
            self.halted = false;
        }

        let enable_after = self.ime_enable_delay == 1;

        let opcode = if self.halt_bug {
            self.halt_bug = false;
            bus.read(self.regs.pc)
        } else {
            self.fetch8(bus)
        };

        let (instr, prefix_cost) = if opcode == 0xCB {
            let cb = self.fetch8(bus);
            (opcodes::decode_cb(cb), 4)
        } else {
            let instr = opcodes::decode(opcode).unwrap_or_else(|| {
                panic!(
                    "unhandled opcode {opcode:02X} at PC={:04X}",
                    self.regs.pc.wrapping_sub(1)
                )
            });
            (instr, 0)
        };

        #[cfg(feature = "cpu-trace")]
        log::trace!(
            "{:04X}: {:02X} {:?}",
            self.regs.pc.wrapping_sub(1),
            opcode,
            instr
        );

        let cost = prefix_cost + self.execute(instr, bus);

        if enable_after && self.ime_enable_delay > 0 {
            self.ime = true;
        }
        if self.ime_enable_delay > 0 {
            self.ime_enable_delay -= 1;
        }

        self.cycles += cost as u64;
        cost
    }

    fn dispatch_interrupt(&mut self, bus: &mut Bus) -> Option<u32> {
        let pending = bus.pending_interrupts();
        if pending == 0 || !self.ime {
            return None;
        }

        self.ime = false;
        self.halted = false;
        let (bit, vector) = Self::next_interrupt(pending);
        bus.clear_interrupt(bit);

        self.push(bus, self.regs.pc);
        self.regs.pc = vector;
        Some(DISPATCH_CYCLES)
    }

    fn next_interrupt(pending: u8) -> (u8, u16) {
        if pending & 0x01 != 0 {
            (0x01, INTERRUPT_VBLANK)
        } else if pending & 0x02 != 0 {
            (0x02, INTERRUPT_STAT)
        } else if pending & 0x04 != 0 {
            (0x04, INTERRUPT_TIMER)
        } else if pending & 0x08 != 0 {
            (0x08, INTERRUPT_SERIAL)
        } else {
            (0x10, INTERRUPT_JOYPAD)
        }
    }

    #[inline(always)]
    fn fetch8(&mut self, bus: &mut Bus) -> u8 {
        let val = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    #[inline(always)]
    fn fetch16(&mut self, bus: &mut Bus) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut Bus, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, (val >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.regs.sp, val as u8);
    }

    fn pop(&mut self, bus: &mut Bus) -> u16 {
        let lo = bus.read(self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = bus.read(self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    fn read_operand(&mut self, bus: &mut Bus, op: Operand8) -> u8 {
        match op {
            Operand8::Reg(r) => self.regs.get(r),
            Operand8::HlInd => bus.read(self.regs.hl()),
            Operand8::Imm => self.fetch8(bus),
        }
    }

    fn write_operand(&mut self, bus: &mut Bus, op: Operand8, val: u8) {
        match op {
            Operand8::Reg(r) => self.regs.set(r, val),
            Operand8::HlInd => bus.write(self.regs.hl(), val),
            Operand8::Imm => unreachable!("immediate is not a writable operand"),
        }
    }

    /// Extra cycles for a memory or immediate operand access.
    fn operand_cost(op: Operand8) -> u32 {
        match op {
            Operand8::Reg(_) => 0,
            Operand8::HlInd | Operand8::Imm => 4,
        }
    }

    /// Resolve a memory operand of the A load/store forms, returning the
    /// effective address and the extra cycle cost of forming it.
    fn effective_addr(&mut self, bus: &mut Bus, addr: Addr) -> (u16, u32) {
        match addr {
            Addr::Bc => (self.regs.get16(Reg16::Bc), 4),
            Addr::De => (self.regs.get16(Reg16::De), 4),
            Addr::HlInc => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                (hl, 4)
            }
            Addr::HlDec => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                (hl, 4)
            }
            Addr::Imm16 => (self.fetch16(bus), 12),
            Addr::HighImm => {
                let off = self.fetch8(bus);
                (0xFF00 | off as u16, 8)
            }
            Addr::HighC => (0xFF00 | self.regs.get(crate::registers::Reg8::C) as u16, 4),
        }
    }

    fn cond_met(&self, cond: Cond) -> bool {
        match cond {
            Cond::Always => true,
            Cond::Z => self.regs.flag(FLAG_Z),
            Cond::Nz => !self.regs.flag(FLAG_Z),
            Cond::C => self.regs.flag(FLAG_C),
            Cond::Nc => !self.regs.flag(FLAG_C),
        }
    }

    fn execute(&mut self, instr: Instruction, bus: &mut Bus) -> u32 {
        use Instruction::*;

        match instr {
            Nop => 4,
            Stop => {
                // STOP is encoded as two bytes; skip the pad byte. The
                // divider resets, and we idle like HALT until an interrupt.
                let _ = self.fetch8(bus);
                bus.reset_div();
                self.halted = true;
                4
            }
            Halt => {
                if self.ime || bus.pending_interrupts() == 0 {
                    self.halted = true;
                } else {
                    self.halt_bug = true;
                }
                4
            }
            DisableInterrupts => {
                self.ime = false;
                self.ime_enable_delay = 0;
                4
            }
            EnableInterrupts => {
                self.ime_enable_delay = 2;
                4
            }

            Load8 { dst, src } => {
                let val = self.read_operand(bus, src);
                self.write_operand(bus, dst, val);
                4 + Self::operand_cost(src) + Self::operand_cost(dst)
            }
            LoadAFrom(addr) => {
                let (ea, extra) = self.effective_addr(bus, addr);
                let val = bus.read(ea);
                self.regs.set_a(val);
                4 + extra
            }
            StoreATo(addr) => {
                let (ea, extra) = self.effective_addr(bus, addr);
                bus.write(ea, self.regs.a());
                4 + extra
            }

            Load16(pair) => {
                let val = self.fetch16(bus);
                self.regs.set16(pair, val);
                12
            }
            StoreSp => {
                let addr = self.fetch16(bus);
                bus.write(addr, self.regs.sp as u8);
                bus.write(addr.wrapping_add(1), (self.regs.sp >> 8) as u8);
                20
            }
            LoadSpHl => {
                self.regs.sp = self.regs.hl();
                8
            }
            LoadHlSpOffset => {
                let res = self.sp_offset(bus);
                self.regs.set_hl(res);
                12
            }
            AddSp => {
                let res = self.sp_offset(bus);
                self.regs.sp = res;
                16
            }
            Push(pair) => {
                let val = self.regs.get16(pair);
                self.push(bus, val);
                16
            }
            Pop(pair) => {
                let val = self.pop(bus);
                // set16 masks the low nibble of F for POP AF.
                self.regs.set16(pair, val);
                12
            }

            Alu { op, src } => {
                let val = self.read_operand(bus, src);
                self.alu(op, val);
                4 + Self::operand_cost(src)
            }
            Inc8(target) => {
                let old = self.read_operand(bus, target);
                let res = old.wrapping_add(1);
                let f = (self.regs.f() & FLAG_C)
                    | if res == 0 { FLAG_Z } else { 0 }
                    | if (old & 0x0F) + 1 > 0x0F { FLAG_H } else { 0 };
                self.regs.set_f(f);
                self.write_operand(bus, target, res);
                4 + 2 * Self::operand_cost(target)
            }
            Dec8(target) => {
                let old = self.read_operand(bus, target);
                let res = old.wrapping_sub(1);
                let f = (self.regs.f() & FLAG_C)
                    | FLAG_N
                    | if res == 0 { FLAG_Z } else { 0 }
                    | if old & 0x0F == 0 { FLAG_H } else { 0 };
                self.regs.set_f(f);
                self.write_operand(bus, target, res);
                4 + 2 * Self::operand_cost(target)
            }
            Inc16(pair) => {
                let val = self.regs.get16(pair).wrapping_add(1);
                self.regs.set16(pair, val);
                8
            }
            Dec16(pair) => {
                let val = self.regs.get16(pair).wrapping_sub(1);
                self.regs.set16(pair, val);
                8
            }
            AddHl(pair) => {
                let hl = self.regs.hl();
                let val = self.regs.get16(pair);
                let res = hl.wrapping_add(val);
                let f = (self.regs.f() & FLAG_Z)
                    | if ((hl & 0x0FFF) + (val & 0x0FFF)) & 0x1000 != 0 {
                        FLAG_H
                    } else {
                        0
                    }
                    | if (hl as u32 + val as u32) > 0xFFFF {
                        FLAG_C
                    } else {
                        0
                    };
                self.regs.set_f(f);
                self.regs.set_hl(res);
                8
            }

            Daa => {
                let mut a = self.regs.a();
                let f = self.regs.f();
                let mut correction = 0u8;
                let mut carry = false;
                if f & FLAG_H != 0 || (f & FLAG_N == 0 && (a & 0x0F) > 9) {
                    correction |= 0x06;
                }
                if f & FLAG_C != 0 || (f & FLAG_N == 0 && a > 0x99) {
                    correction |= 0x60;
                    carry = true;
                }
                if f & FLAG_N == 0 {
                    a = a.wrapping_add(correction);
                } else {
                    a = a.wrapping_sub(correction);
                }
                self.regs.set_a(a);
                self.regs.set_f(
                    if a == 0 { FLAG_Z } else { 0 }
                        | (f & FLAG_N)
                        | if carry { FLAG_C } else { 0 },
                );
                4
            }
            Cpl => {
                self.regs.set_a(self.regs.a() ^ 0xFF);
                let f = (self.regs.f() & (FLAG_Z | FLAG_C)) | FLAG_N | FLAG_H;
                self.regs.set_f(f);
                4
            }
            Scf => {
                let f = (self.regs.f() & FLAG_Z) | FLAG_C;
                self.regs.set_f(f);
                4
            }
            Ccf => {
                let f = (self.regs.f() & FLAG_Z)
                    | if self.regs.flag(FLAG_C) { 0 } else { FLAG_C };
                self.regs.set_f(f);
                4
            }

            RotateA(op) => {
                let (res, carry) = Self::rotate(op, self.regs.a(), self.regs.flag(FLAG_C));
                self.regs.set_a(res);
                // The RxA forms always clear Z.
                self.regs.set_f(if carry { FLAG_C } else { 0 });
                4
            }

            Jp(cond) => {
                let addr = self.fetch16(bus);
                if self.cond_met(cond) {
                    self.regs.pc = addr;
                    16
                } else {
                    12
                }
            }
            JpHl => {
                self.regs.pc = self.regs.hl();
                4
            }
            Jr(cond) => {
                let offset = self.fetch8(bus) as i8;
                if self.cond_met(cond) {
                    self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
                    12
                } else {
                    8
                }
            }
            Call(cond) => {
                let addr = self.fetch16(bus);
                if self.cond_met(cond) {
                    self.push(bus, self.regs.pc);
                    self.regs.pc = addr;
                    24
                } else {
                    12
                }
            }
            Ret(Cond::Always) => {
                self.regs.pc = self.pop(bus);
                16
            }
            Ret(cond) => {
                if self.cond_met(cond) {
                    self.regs.pc = self.pop(bus);
                    20
                } else {
                    8
                }
            }
            Reti => {
                self.regs.pc = self.pop(bus);
                self.ime = true;
                16
            }
            Rst(vector) => {
                self.push(bus, self.regs.pc);
                self.regs.pc = vector;
                16
            }

            Rotate { op, target } => {
                let val = self.read_operand(bus, target);
                let (res, carry) = Self::rotate(op, val, self.regs.flag(FLAG_C));
                self.write_operand(bus, target, res);
                self.regs.set_f(
                    if res == 0 { FLAG_Z } else { 0 } | if carry { FLAG_C } else { 0 },
                );
                4 + 2 * Self::operand_cost(target)
            }
            Bit { bit, target } => {
                let val = self.read_operand(bus, target);
                let f = (self.regs.f() & FLAG_C)
                    | FLAG_H
                    | if val & (1 << bit) == 0 { FLAG_Z } else { 0 };
                self.regs.set_f(f);
                4 + Self::operand_cost(target)
            }
            Res { bit, target } => {
                let val = self.read_operand(bus, target) & !(1 << bit);
                self.write_operand(bus, target, val);
                4 + 2 * Self::operand_cost(target)
            }
            Set { bit, target } => {
                let val = self.read_operand(bus, target) | (1 << bit);
                self.write_operand(bus, target, val);
                4 + 2 * Self::operand_cost(target)
            }
        }
    }

    /// ADD SP,e / LD HL,SP+e share operand and flag behavior: half-carry
    /// and carry come from the low byte of the addition, Z and N clear.
    fn sp_offset(&mut self, bus: &mut Bus) -> u16 {
        let val = self.fetch8(bus) as i8 as i16 as u16;
        let sp = self.regs.sp;
        let f = if ((sp & 0xF) + (val & 0xF)) > 0xF {
            FLAG_H
        } else {
            0
        } | if ((sp & 0xFF) + (val & 0xFF)) > 0xFF {
            FLAG_C
        } else {
            0
        };
        self.regs.set_f(f);
        sp.wrapping_add(val)
    }

    fn alu(&mut self, op: AluOp, val: u8) {
        let a = self.regs.a();
        let carry_in = if self.regs.flag(FLAG_C) { 1u8 } else { 0 };
        match op {
            AluOp::Add => {
                let (res, carry) = a.overflowing_add(val);
                self.regs.set_f(
                    if res == 0 { FLAG_Z } else { 0 }
                        | if (a & 0x0F) + (val & 0x0F) > 0x0F {
                            FLAG_H
                        } else {
                            0
                        }
                        | if carry { FLAG_C } else { 0 },
                );
                self.regs.set_a(res);
            }
            AluOp::Adc => {
                let (res1, carry1) = a.overflowing_add(val);
                let (res2, carry2) = res1.overflowing_add(carry_in);
                self.regs.set_f(
                    if res2 == 0 { FLAG_Z } else { 0 }
                        | if (a & 0x0F) + (val & 0x0F) + carry_in > 0x0F {
                            FLAG_H
                        } else {
                            0
                        }
                        | if carry1 || carry2 { FLAG_C } else { 0 },
                );
                self.regs.set_a(res2);
            }
            AluOp::Sub => {
                let (res, borrow) = a.overflowing_sub(val);
                self.regs.set_f(
                    FLAG_N
                        | if res == 0 { FLAG_Z } else { 0 }
                        | if (a & 0x0F) < (val & 0x0F) { FLAG_H } else { 0 }
                        | if borrow { FLAG_C } else { 0 },
                );
                self.regs.set_a(res);
            }
            AluOp::Sbc => {
                let (res1, borrow1) = a.overflowing_sub(val);
                let (res2, borrow2) = res1.overflowing_sub(carry_in);
                self.regs.set_f(
                    FLAG_N
                        | if res2 == 0 { FLAG_Z } else { 0 }
                        | if (a & 0x0F) < (val & 0x0F) + carry_in {
                            FLAG_H
                        } else {
                            0
                        }
                        | if borrow1 || borrow2 { FLAG_C } else { 0 },
                );
                self.regs.set_a(res2);
            }
            AluOp::And => {
                let res = a & val;
                self.regs
                    .set_f(if res == 0 { FLAG_Z } else { 0 } | FLAG_H);
                self.regs.set_a(res);
            }
            AluOp::Xor => {
                let res = a ^ val;
                self.regs.set_f(if res == 0 { FLAG_Z } else { 0 });
                self.regs.set_a(res);
            }
            AluOp::Or => {
                let res = a | val;
                self.regs.set_f(if res == 0 { FLAG_Z } else { 0 });
                self.regs.set_a(res);
            }
            AluOp::Cp => {
                let res = a.wrapping_sub(val);
                self.regs.set_f(
                    FLAG_N
                        | if res == 0 { FLAG_Z } else { 0 }
                        | if (a & 0x0F) < (val & 0x0F) { FLAG_H } else { 0 }
                        | if a < val { FLAG_C } else { 0 },
                );
            }
        }
    }

    fn rotate(op: RotOp, val: u8, carry_in: bool) -> (u8, bool) {
        match op {
            RotOp::Rlc => (val.rotate_left(1), val & 0x80 != 0),
            RotOp::Rrc => (val.rotate_right(1), val & 0x01 != 0),
            RotOp::Rl => ((val << 1) | carry_in as u8, val & 0x80 != 0),
            RotOp::Rr => ((val >> 1) | ((carry_in as u8) << 7), val & 0x01 != 0),
            RotOp::Sla => (val << 1, val & 0x80 != 0),
            RotOp::Sra => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            RotOp::Swap => (val.rotate_left(4), false),
            RotOp::Srl => (val >> 1, val & 0x01 != 0),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
