//! The TMEPT opcode table
//!
//! Maps every mnemonic to its opcode byte and encoding family. The table
//! is the single source of truth for both pass 1 (instruction sizes) and
//! pass 2 (encoding dispatch).

use phf::{phf_map, phf_set};

/// The six bit-layout families of the instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Three-byte standard arithmetic/logic/shift/bit/move, with the
    /// addressing mode chosen from the operand shape
    Std3,
    /// Two-byte, single register in the upper bits of byte 2
    Reg2,
    /// Two-byte, no operand
    NoReg2,
    /// Three-byte absolute 16-bit MAR load, big-endian
    Lmar,
    /// Four-byte compound compare-and-branch, four registers
    Cmp4,
    /// Four-byte decrement-and-jump, two registers
    Djn4,
}

impl Encoding {
    /// Instruction size in bytes, used by pass 1 to advance the location
    /// counter without encoding
    pub fn size(self) -> u16 {
        match self {
            Encoding::Std3 | Encoding::Lmar => 3,
            Encoding::Reg2 | Encoding::NoReg2 => 2,
            Encoding::Cmp4 | Encoding::Djn4 => 4,
        }
    }
}

/// Mnemonic -> (opcode byte, encoding family)
pub static OPCODES: phf::Map<&'static str, (u8, Encoding)> = phf_map! {
    // Arithmetic / logic
    "ADD" => (0x00, Encoding::Std3),
    "ADC" => (0x01, Encoding::Std3),
    "SUB" => (0x02, Encoding::Std3),
    "SBC" => (0x03, Encoding::Std3),
    "AND" => (0x04, Encoding::Std3),
    "OR"  => (0x05, Encoding::Std3),
    "NOR" => (0x06, Encoding::Std3),
    "NAD" => (0x07, Encoding::Std3),
    "XOR" => (0x08, Encoding::Std3),
    "CMP" => (0x09, Encoding::Std3),
    // Shift / rotate
    "ROL" => (0x0A, Encoding::Std3),
    "SOL" => (0x0B, Encoding::Std3),
    "SZL" => (0x0C, Encoding::Std3),
    "RIL" => (0x0D, Encoding::Std3),
    "ROR" => (0x0E, Encoding::Std3),
    "SOR" => (0x0F, Encoding::Std3),
    "SZR" => (0x10, Encoding::Std3),
    "RIR" => (0x11, Encoding::Std3),
    // Bit manipulation (single-operand: dst = f(dst))
    "INV" => (0x12, Encoding::Std3),
    "INH" => (0x13, Encoding::Std3),
    "INL" => (0x14, Encoding::Std3),
    "INE" => (0x15, Encoding::Std3),
    "INO" => (0x16, Encoding::Std3),
    "IEH" => (0x17, Encoding::Std3),
    "IOH" => (0x18, Encoding::Std3),
    "IEL" => (0x19, Encoding::Std3),
    "IOL" => (0x1A, Encoding::Std3),
    "IFB" => (0x1B, Encoding::Std3),
    "ILB" => (0x1C, Encoding::Std3),
    "REV" => (0x1D, Encoding::Std3),
    "RVL" => (0x1E, Encoding::Std3),
    "RVH" => (0x1F, Encoding::Std3),
    "RVE" => (0x20, Encoding::Std3),
    "RVO" => (0x21, Encoding::Std3),
    "RLE" => (0x22, Encoding::Std3),
    "RHE" => (0x23, Encoding::Std3),
    "RLO" => (0x24, Encoding::Std3),
    "RHO" => (0x25, Encoding::Std3),
    // Branches (register-indirect)
    "JMP" => (0x26, Encoding::Reg2),
    "JMZ" => (0x27, Encoding::Reg2),
    "JMN" => (0x28, Encoding::Reg2),
    "JMG" => (0x29, Encoding::Reg2),
    "JMO" => (0x2A, Encoding::Reg2),
    "JIE" => (0x2B, Encoding::Reg2),
    "JIO" => (0x2C, Encoding::Reg2),
    "JNE" => (0x38, Encoding::Reg2),
    "JGE" => (0x39, Encoding::Reg2),
    "JLE" => (0x3A, Encoding::Reg2),
    // Data movement
    "MOV"  => (0x2D, Encoding::Std3),
    "LMAR" => (0x2E, Encoding::Lmar),
    "SMAR" => (0x2F, Encoding::Reg2),
    "LOAD" => (0x30, Encoding::Reg2),
    "STOR" => (0x31, Encoding::Reg2),
    "IMAR" => (0x32, Encoding::NoReg2),
    "DMAR" => (0x33, Encoding::NoReg2),
    // Compound
    "ALE" => (0x34, Encoding::Cmp4),
    "DJN" => (0x35, Encoding::Djn4),
    "SLE" => (0x36, Encoding::Cmp4),
    "SJN" => (0x37, Encoding::Cmp4),
    // Stack
    "PUSH" => (0x3B, Encoding::Reg2),
    "POP"  => (0x3C, Encoding::Reg2),
    "CALL" => (0x3D, Encoding::Reg2),
    "RET"  => (0x3E, Encoding::NoReg2),
};

/// The bit-manip mnemonics that take a single register operand
/// (dst = f(dst))
pub static SINGLE_OPERAND: phf::Set<&'static str> = phf_set! {
    "INV", "INH", "INL", "INE", "INO", "IEH", "IOH", "IEL", "IOL", "IFB",
    "ILB", "REV", "RVL", "RVH", "RVE", "RVO", "RLE", "RHE", "RLO", "RHO",
};
