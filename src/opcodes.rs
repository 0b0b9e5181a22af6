//! Instruction decoding.
//!
//! Opcodes decode into an [`Instruction`] value built from a small set of
//! orthogonal operand and operation enums, and a single generic executor in
//! [`crate::cpu`] interprets them. The SM83 encoding is regular enough that
//! the whole primary page collapses into a handful of masked ranges.

use crate::registers::{Reg8, Reg16};

/// An 8-bit operand: a register, the byte addressed by HL, or an
/// immediate following the opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand8 {
    Reg(Reg8),
    HlInd,
    Imm,
}

/// Memory operands used by the A-register load/store forms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Addr {
    Bc,
    De,
    HlInc,
    HlDec,
    Imm16,
    HighImm,
    HighC,
}

/// Branch conditions. `Always` covers the unconditional encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Always,
    Z,
    Nz,
    C,
    Nc,
}

/// The eight accumulator arithmetic/logic operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

/// Rotate/shift operations from the CB page (and the four RxA forms).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Stop,
    Halt,
    DisableInterrupts,
    EnableInterrupts,
    Load8 { dst: Operand8, src: Operand8 },
    LoadAFrom(Addr),
    StoreATo(Addr),
    Load16(Reg16),
    StoreSp,
    LoadSpHl,
    LoadHlSpOffset,
    AddSp,
    Push(Reg16),
    Pop(Reg16),
    Alu { op: AluOp, src: Operand8 },
    Inc8(Operand8),
    Dec8(Operand8),
    Inc16(Reg16),
    Dec16(Reg16),
    AddHl(Reg16),
    Daa,
    Cpl,
    Scf,
    Ccf,
    RotateA(RotOp),
    Jp(Cond),
    JpHl,
    Jr(Cond),
    Call(Cond),
    Ret(Cond),
    Reti,
    Rst(u16),
    Rotate { op: RotOp, target: Operand8 },
    Bit { bit: u8, target: Operand8 },
    Res { bit: u8, target: Operand8 },
    Set { bit: u8, target: Operand8 },
}

/// Map a 3-bit operand field onto an 8-bit operand.
fn operand(bits: u8) -> Operand8 {
    match bits & 0x07 {
        0 => Operand8::Reg(Reg8::B),
        1 => Operand8::Reg(Reg8::C),
        2 => Operand8::Reg(Reg8::D),
        3 => Operand8::Reg(Reg8::E),
        4 => Operand8::Reg(Reg8::H),
        5 => Operand8::Reg(Reg8::L),
        6 => Operand8::HlInd,
        _ => Operand8::Reg(Reg8::A),
    }
}

/// Map the 2-bit `dd` pair field (BC/DE/HL/SP encodings).
fn pair_dd(bits: u8) -> Reg16 {
    match bits & 0x03 {
        0 => Reg16::Bc,
        1 => Reg16::De,
        2 => Reg16::Hl,
        _ => Reg16::Sp,
    }
}

/// Map the 2-bit `qq` pair field used by PUSH/POP (AF instead of SP).
fn pair_qq(bits: u8) -> Reg16 {
    match bits & 0x03 {
        0 => Reg16::Bc,
        1 => Reg16::De,
        2 => Reg16::Hl,
        _ => Reg16::Af,
    }
}

fn alu_op(bits: u8) -> AluOp {
    match bits & 0x07 {
        0 => AluOp::Add,
        1 => AluOp::Adc,
        2 => AluOp::Sub,
        3 => AluOp::Sbc,
        4 => AluOp::And,
        5 => AluOp::Xor,
        6 => AluOp::Or,
        _ => AluOp::Cp,
    }
}

fn rot_op(bits: u8) -> RotOp {
    match bits & 0x07 {
        0 => RotOp::Rlc,
        1 => RotOp::Rrc,
        2 => RotOp::Rl,
        3 => RotOp::Rr,
        4 => RotOp::Sla,
        5 => RotOp::Sra,
        6 => RotOp::Swap,
        _ => RotOp::Srl,
    }
}

/// Decode a primary-page opcode. Returns `None` for the eleven holes in
/// the encoding (0xD3 etc.), which have no defined behavior on hardware.
/// The 0xCB prefix is not decoded here; the CPU fetches the second byte
/// and uses [`decode_cb`].
pub fn decode(op: u8) -> Option<Instruction> {
    use Instruction::*;

    // Irregular encodings first, then the masked ranges.
    Some(match op {
        0x00 => Nop,
        0x10 => Stop,
        0x76 => Halt,
        0xF3 => DisableInterrupts,
        0xFB => EnableInterrupts,

        0x07 => RotateA(RotOp::Rlc),
        0x0F => RotateA(RotOp::Rrc),
        0x17 => RotateA(RotOp::Rl),
        0x1F => RotateA(RotOp::Rr),
        0x27 => Daa,
        0x2F => Cpl,
        0x37 => Scf,
        0x3F => Ccf,

        0x02 => StoreATo(Addr::Bc),
        0x12 => StoreATo(Addr::De),
        0x22 => StoreATo(Addr::HlInc),
        0x32 => StoreATo(Addr::HlDec),
        0x0A => LoadAFrom(Addr::Bc),
        0x1A => LoadAFrom(Addr::De),
        0x2A => LoadAFrom(Addr::HlInc),
        0x3A => LoadAFrom(Addr::HlDec),

        0x08 => StoreSp,
        0x18 => Jr(Cond::Always),
        0x20 => Jr(Cond::Nz),
        0x28 => Jr(Cond::Z),
        0x30 => Jr(Cond::Nc),
        0x38 => Jr(Cond::C),

        _ if op & 0xCF == 0x01 => Load16(pair_dd(op >> 4)),
        _ if op & 0xCF == 0x03 => Inc16(pair_dd(op >> 4)),
        _ if op & 0xCF == 0x09 => AddHl(pair_dd(op >> 4)),
        _ if op & 0xCF == 0x0B => Dec16(pair_dd(op >> 4)),
        _ if op & 0xC7 == 0x04 => Inc8(operand(op >> 3)),
        _ if op & 0xC7 == 0x05 => Dec8(operand(op >> 3)),
        _ if op & 0xC7 == 0x06 => Load8 {
            dst: operand(op >> 3),
            src: Operand8::Imm,
        },

        0x40..=0x7F => Load8 {
            dst: operand(op >> 3),
            src: operand(op),
        },
        0x80..=0xBF => Alu {
            op: alu_op(op >> 3),
            src: operand(op),
        },

        0xC9 => Ret(Cond::Always),
        0xD9 => Reti,
        0xC0 => Ret(Cond::Nz),
        0xC8 => Ret(Cond::Z),
        0xD0 => Ret(Cond::Nc),
        0xD8 => Ret(Cond::C),

        0xC3 => Jp(Cond::Always),
        0xC2 => Jp(Cond::Nz),
        0xCA => Jp(Cond::Z),
        0xD2 => Jp(Cond::Nc),
        0xDA => Jp(Cond::C),
        0xE9 => JpHl,

        0xCD => Call(Cond::Always),
        0xC4 => Call(Cond::Nz),
        0xCC => Call(Cond::Z),
        0xD4 => Call(Cond::Nc),
        0xDC => Call(Cond::C),

        0xC1 | 0xD1 | 0xE1 | 0xF1 => Pop(pair_qq(op >> 4)),
        0xC5 | 0xD5 | 0xE5 | 0xF5 => Push(pair_qq(op >> 4)),

        0xE0 => StoreATo(Addr::HighImm),
        0xF0 => LoadAFrom(Addr::HighImm),
        0xE2 => StoreATo(Addr::HighC),
        0xF2 => LoadAFrom(Addr::HighC),
        0xEA => StoreATo(Addr::Imm16),
        0xFA => LoadAFrom(Addr::Imm16),

        0xE8 => AddSp,
        0xF8 => LoadHlSpOffset,
        0xF9 => LoadSpHl,

        _ if op & 0xC7 == 0xC6 => Alu {
            op: alu_op(op >> 3),
            src: Operand8::Imm,
        },
        _ if op & 0xC7 == 0xC7 => Rst(((op >> 3) & 0x07) as u16 * 8),

        _ => return None,
    })
}

/// Decode a CB-page opcode. The CB page is total: every byte is defined.
pub fn decode_cb(op: u8) -> Instruction {
    let target = operand(op);
    match op {
        0x00..=0x3F => Instruction::Rotate {
            op: rot_op(op >> 3),
            target,
        },
        0x40..=0x7F => Instruction::Bit {
            bit: (op >> 3) & 0x07,
            target,
        },
        0x80..=0xBF => Instruction::Res {
            bit: (op >> 3) & 0x07,
            target,
        },
        0xC0..=0xFF => Instruction::Set {
            bit: (op >> 3) & 0x07,
            target,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_opcodes_have_no_decoding() {
        for op in [0xD3u8, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD] {
            assert_eq!(decode(op), None, "opcode {op:#04X}");
        }
    }

    #[test]
    fn every_other_primary_opcode_decodes() {
        let holes = [0xD3u8, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD];
        for op in 0..=0xFFu8 {
            if op == 0xCB || holes.contains(&op) {
                continue;
            }
            assert!(decode(op).is_some(), "opcode {op:#04X}");
        }
    }

    #[test]
    fn load_block_decodes_by_fields() {
        assert_eq!(
            decode(0x41),
            Some(Instruction::Load8 {
                dst: Operand8::Reg(Reg8::B),
                src: Operand8::Reg(Reg8::C),
            })
        );
        assert_eq!(
            decode(0x77),
            Some(Instruction::Load8 {
                dst: Operand8::HlInd,
                src: Operand8::Reg(Reg8::A),
            })
        );
        // 0x76 is HALT, not LD (HL),(HL).
        assert_eq!(decode(0x76), Some(Instruction::Halt));
    }

    #[test]
    fn cb_page_is_total_and_numbered_correctly() {
        // RES clears the numbered bit; SET sets it (0xA7 = RES 4,A).
        assert_eq!(
            decode_cb(0xA7),
            Instruction::Res {
                bit: 4,
                target: Operand8::Reg(Reg8::A),
            }
        );
        assert_eq!(
            decode_cb(0x2E),
            Instruction::Rotate {
                op: RotOp::Sra,
                target: Operand8::HlInd,
            }
        );
    }
}
