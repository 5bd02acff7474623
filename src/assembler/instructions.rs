//! Byte-level encoders for the six instruction families
//!
//! Each encoder receives the opcode byte from the table and the parsed
//! line, and returns the instruction's byte string. The `3std` family
//! picks its addressing mode from the operand shape; the others have a
//! fixed shape and reject anything else.

use crate::assembler::line::{is_register, parse_register, SourceLine};
use crate::assembler::opcodes::SINGLE_OPERAND;
use crate::assembler::{Error, SymbolTable};

const MODE_3ADDR: u8 = 0b00;
const MODE_2ADDR: u8 = 0b01;
const MODE_IMM: u8 = 0b10;
const MODE_MEM: u8 = 0b11;

/// Three-byte standard instruction: `[opc] [mode|dst] [src/imm] [pad]`.
/// The pad byte overlaps the next instruction and is overwritten by it;
/// it only survives at the end of a region.
pub fn encode_3std(
    opcode: u8,
    line: &SourceLine,
    symbols: &SymbolTable,
) -> Result<Vec<u8>, Error> {
    let mnemonic = line.mnemonic().unwrap_or_default();
    let ops = line.operands();

    // MOV Rd, [MAR] is the only memory-indirect form
    if mnemonic == "MOV" && ops.len() == 2 && ops[1].trim().eq_ignore_ascii_case("[MAR]") {
        let rd = line.parse_register(0)?;
        return Ok(vec![opcode, (MODE_MEM << 6) | (rd << 2), 0x00, 0x00]);
    }

    // Single-operand bit manipulation: dst = f(dst)
    if SINGLE_OPERAND.contains(mnemonic) {
        line.assert_n_operands(1)?;
        let rd = line.parse_register(0)?;
        return Ok(vec![opcode, (MODE_2ADDR << 6) | (rd << 2), rd << 4, 0x00]);
    }

    match ops.len() {
        3 => {
            let rd = line.parse_register(0)?;
            let rs1 = line.parse_register(1)?;
            let rs2 = line.parse_register(2)?;
            Ok(vec![opcode, (MODE_3ADDR << 6) | (rd << 2), (rs1 << 4) | rs2, 0x00])
        }
        2 => {
            let rd = line.parse_register(0)?;
            let op2 = ops[1].trim();
            // optional # immediate marker
            let imm_str = op2.strip_prefix('#').unwrap_or(op2);
            if is_register(imm_str) {
                let rs = parse_register(imm_str, line.file(), line.line())?;
                Ok(vec![opcode, (MODE_2ADDR << 6) | (rd << 2), (rd << 4) | rs, 0x00])
            } else {
                let imm = (line.eval_expr(imm_str, symbols)? & 0xFF) as u8;
                Ok(vec![opcode, (MODE_IMM << 6) | (rd << 2), imm, 0x00])
            }
        }
        1 => {
            // lone register, e.g. CMP Rd: compare against itself
            let rd = line.parse_register(0)?;
            Ok(vec![opcode, (MODE_2ADDR << 6) | (rd << 2), (rd << 4) | rd, 0x00])
        }
        _ => Err(line.operand_count_error()),
    }
}

/// Two-byte instruction with a single register: `[opc] [Rn << 2]`
pub fn encode_2reg(opcode: u8, line: &SourceLine) -> Result<Vec<u8>, Error> {
    line.assert_n_operands(1)?;
    let rn = line.parse_register(0)?;
    Ok(vec![opcode, rn << 2])
}

/// Two-byte instruction with no operand: `[opc] [0x00]`
pub fn encode_2noreg(opcode: u8, line: &SourceLine) -> Result<Vec<u8>, Error> {
    line.assert_n_operands(0)?;
    Ok(vec![opcode, 0x00])
}

/// LMAR: `[opc] [addr_hi] [addr_lo]`, big-endian within the instruction
pub fn encode_lmar(
    opcode: u8,
    line: &SourceLine,
    symbols: &SymbolTable,
) -> Result<Vec<u8>, Error> {
    line.assert_n_operands(1)?;
    let address = line.eval_operand(0, symbols)?;
    if !(0..=0xFFFF).contains(&address) {
        return Err(Error::AddressRange {
            address,
            file: line.file().to_path_buf(),
            line: line.line(),
        });
    }
    Ok(vec![opcode, (address >> 8) as u8, (address & 0xFF) as u8])
}

/// Compound compare-and-branch (ALE/SLE/SJN):
/// `[opc] [Rs1<<4|Rs2] [Rd<<4] [Rjmp<<4]`
pub fn encode_cmp4(opcode: u8, line: &SourceLine) -> Result<Vec<u8>, Error> {
    line.assert_n_operands(4)?;
    let rs1 = line.parse_register(0)?;
    let rs2 = line.parse_register(1)?;
    let rd = line.parse_register(2)?;
    let rjmp = line.parse_register(3)?;
    Ok(vec![opcode, (rs1 << 4) | rs2, rd << 4, rjmp << 4])
}

/// DJN: `[opc] [Rs<<4] [Rs<<4] [Rjmp<<4]` with the source register
/// doubling as the destination
pub fn encode_djn4(opcode: u8, line: &SourceLine) -> Result<Vec<u8>, Error> {
    line.assert_n_operands(2)?;
    let rs = line.parse_register(0)?;
    let rjmp = line.parse_register(1)?;
    Ok(vec![opcode, rs << 4, rs << 4, rjmp << 4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn line(mnemonic: &str, operands: &[&str]) -> SourceLine {
        SourceLine::new(
            PathBuf::from("<test>"),
            1,
            None,
            Some(mnemonic.to_string()),
            operands.iter().map(|o| o.to_string()).collect(),
            String::new(),
        )
    }

    fn no_symbols() -> SymbolTable {
        HashMap::new()
    }

    #[test]
    fn std3_three_address() {
        let bytes = encode_3std(0x00, &line("ADD", &["R1", "R2", "R3"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x00, 0x04, 0x23, 0x00]);
    }

    #[test]
    fn std3_two_address() {
        let bytes = encode_3std(0x00, &line("ADD", &["R5", "R6"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x00, (0b01 << 6) | (5 << 2), (5 << 4) | 6, 0x00]);
    }

    #[test]
    fn std3_immediate() {
        let bytes = encode_3std(0x00, &line("ADD", &["R2", "#0x11"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x00, (0b10 << 6) | (2 << 2), 0x11, 0x00]);
    }

    #[test]
    fn std3_immediate_without_hash() {
        let bytes = encode_3std(0x00, &line("ADD", &["R1", "5"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x00, (0b10 << 6) | (1 << 2), 5, 0x00]);
    }

    #[test]
    fn std3_immediate_is_masked() {
        let bytes = encode_3std(0x00, &line("ADD", &["R1", "0x1FF"]), &no_symbols()).unwrap();
        assert_eq!(bytes[2], 0xFF);
    }

    #[test]
    fn std3_register_beats_immediate() {
        // ADD R1, R2 must encode as two-address, not immediate
        let bytes = encode_3std(0x00, &line("ADD", &["R1", "R2"]), &no_symbols()).unwrap();
        assert_eq!(bytes[1] >> 6, 0b01);
        assert_eq!(bytes[2], (1 << 4) | 2);
    }

    #[test]
    fn std3_mov_mar() {
        let bytes = encode_3std(0x2D, &line("MOV", &["R3", "[MAR]"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x2D, (0b11 << 6) | (3 << 2), 0x00, 0x00]);
    }

    #[test]
    fn std3_single_operand_bit_manip() {
        let bytes = encode_3std(0x12, &line("INV", &["R5"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x12, (0b01 << 6) | (5 << 2), 5 << 4, 0x00]);
    }

    #[test]
    fn std3_bit_manip_rejects_extra_operands() {
        let result = encode_3std(0x12, &line("INV", &["R5", "R6"]), &no_symbols());
        assert!(matches!(result, Err(Error::OperandCount { .. })));
    }

    #[test]
    fn std3_lone_register_compares_with_itself() {
        let bytes = encode_3std(0x09, &line("CMP", &["R3"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x09, (0b01 << 6) | (3 << 2), (3 << 4) | 3, 0x00]);
    }

    #[test]
    fn std3_operand_count() {
        let result = encode_3std(0x00, &line("ADD", &[]), &no_symbols());
        assert!(matches!(result, Err(Error::OperandCount { .. })));
    }

    #[test]
    fn reg2() {
        let bytes = encode_2reg(0x26, &line("JMP", &["R15"])).unwrap();
        assert_eq!(bytes, [0x26, 15 << 2]);
        let bytes = encode_2reg(0x26, &line("JMP", &["R0"])).unwrap();
        assert_eq!(bytes, [0x26, 0x00]);
    }

    #[test]
    fn reg2_operand_count() {
        assert!(matches!(
            encode_2reg(0x26, &line("JMP", &[])),
            Err(Error::OperandCount { .. })
        ));
    }

    #[test]
    fn noreg2() {
        let bytes = encode_2noreg(0x3E, &line("RET", &[])).unwrap();
        assert_eq!(bytes, [0x3E, 0x00]);
        assert!(matches!(
            encode_2noreg(0x3E, &line("RET", &["R1"])),
            Err(Error::OperandCount { .. })
        ));
    }

    #[test]
    fn lmar() {
        let bytes = encode_lmar(0x2E, &line("LMAR", &["0x1234"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x2E, 0x12, 0x34]);
        let bytes = encode_lmar(0x2E, &line("LMAR", &["0"]), &no_symbols()).unwrap();
        assert_eq!(bytes, [0x2E, 0x00, 0x00]);
    }

    #[test]
    fn lmar_address_range() {
        assert!(matches!(
            encode_lmar(0x2E, &line("LMAR", &["0x10000"]), &no_symbols()),
            Err(Error::AddressRange { address: 0x10000, .. })
        ));
        assert!(matches!(
            encode_lmar(0x2E, &line("LMAR", &["-1"]), &no_symbols()),
            Err(Error::AddressRange { address: -1, .. })
        ));
    }

    #[test]
    fn cmp4() {
        let bytes = encode_cmp4(0x34, &line("ALE", &["R1", "R2", "R3", "R4"])).unwrap();
        assert_eq!(bytes, [0x34, (1 << 4) | 2, 3 << 4, 4 << 4]);
    }

    #[test]
    fn djn4() {
        let bytes = encode_djn4(0x35, &line("DJN", &["R1", "R5"])).unwrap();
        assert_eq!(bytes, [0x35, 1 << 4, 1 << 4, 5 << 4]);
    }

    #[test]
    fn djn4_operand_count() {
        assert!(matches!(
            encode_djn4(0x35, &line("DJN", &["R1"])),
            Err(Error::OperandCount { .. })
        ));
    }

    #[test]
    fn register_errors_bubble_up() {
        assert!(matches!(
            encode_2reg(0x26, &line("JMP", &["X5"])),
            Err(Error::OperandSyntax { .. })
        ));
        assert!(matches!(
            encode_3std(0x00, &line("ADD", &["R16", "R1"]), &no_symbols()),
            Err(Error::RegisterRange { register: 16, .. })
        ));
    }
}
