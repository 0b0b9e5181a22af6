// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

/// The 8-bit registers addressable by instruction operand fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

/// The 16-bit register pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg16 {
    Af,
    Bc,
    De,
    Hl,
    Sp,
}

/// The register file. Each pair is stored canonically as one 16-bit word;
/// byte-wise access goes through accessors, so there is no layout aliasing.
///
/// Invariant: the low nibble of F is always zero. `set_af` and `set_f`
/// mask it, which covers POP AF as well.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    af: u16,
    bc: u16,
    de: u16,
    hl: u16,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    /// Post-boot register state for a DMG unit, per
    /// gbdev.io/pandocs/Power_Up_State.html.
    pub fn post_boot() -> Self {
        Self {
            af: 0x01B0,
            bc: 0x0013,
            de: 0x00D8,
            hl: 0x014D,
            sp: 0xFFFE,
            pc: 0x0100,
        }
    }

    /// Neutral power-on state, intended to be paired with a boot ROM
    /// mapped at 0x0000.
    pub fn power_on() -> Self {
        Self::default()
    }

    pub fn a(&self) -> u8 {
        (self.af >> 8) as u8
    }

    pub fn set_a(&mut self, val: u8) {
        self.af = ((val as u16) << 8) | (self.af & 0x00F0);
    }

    pub fn f(&self) -> u8 {
        self.af as u8
    }

    pub fn set_f(&mut self, val: u8) {
        self.af = (self.af & 0xFF00) | (val & 0xF0) as u16;
    }

    pub fn flag(&self, mask: u8) -> bool {
        self.f() & mask != 0
    }

    pub fn get(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a(),
            Reg8::B => (self.bc >> 8) as u8,
            Reg8::C => self.bc as u8,
            Reg8::D => (self.de >> 8) as u8,
            Reg8::E => self.de as u8,
            Reg8::H => (self.hl >> 8) as u8,
            Reg8::L => self.hl as u8,
        }
    }

    pub fn set(&mut self, reg: Reg8, val: u8) {
        let hi = |word: u16| (word & 0x00FF) | ((val as u16) << 8);
        let lo = |word: u16| (word & 0xFF00) | val as u16;
        match reg {
            Reg8::A => self.set_a(val),
            Reg8::B => self.bc = hi(self.bc),
            Reg8::C => self.bc = lo(self.bc),
            Reg8::D => self.de = hi(self.de),
            Reg8::E => self.de = lo(self.de),
            Reg8::H => self.hl = hi(self.hl),
            Reg8::L => self.hl = lo(self.hl),
        }
    }

    pub fn get16(&self, pair: Reg16) -> u16 {
        match pair {
            Reg16::Af => self.af,
            Reg16::Bc => self.bc,
            Reg16::De => self.de,
            Reg16::Hl => self.hl,
            Reg16::Sp => self.sp,
        }
    }

    pub fn set16(&mut self, pair: Reg16, val: u16) {
        match pair {
            Reg16::Af => self.af = val & 0xFFF0,
            Reg16::Bc => self.bc = val,
            Reg16::De => self.de = val,
            Reg16::Hl => self.hl = val,
            Reg16::Sp => self.sp = val,
        }
    }

    pub fn hl(&self) -> u16 {
        self.hl
    }

    pub fn set_hl(&mut self, val: u16) {
        self.hl = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f_low_nibble_always_zero() {
        let mut regs = Registers::default();
        regs.set16(Reg16::Af, 0xABCD);
        assert_eq!(regs.get16(Reg16::Af), 0xABC0);
        assert_eq!(regs.a(), 0xAB);
        regs.set_f(0xFF);
        assert_eq!(regs.f(), 0xF0);
    }

    #[test]
    fn byte_accessors_round_trip() {
        let mut regs = Registers::default();
        regs.set(Reg8::B, 0x12);
        regs.set(Reg8::C, 0x34);
        assert_eq!(regs.get16(Reg16::Bc), 0x1234);
        regs.set16(Reg16::De, 0x5678);
        assert_eq!(regs.get(Reg8::D), 0x56);
        assert_eq!(regs.get(Reg8::E), 0x78);
    }
}
