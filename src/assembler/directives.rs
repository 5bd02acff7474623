//! Directive handlers for pass 2
//!
//! `.org` and `.resetvec` return values for the pass to act on; `.byte`
//! and `.word` return the bytes to emit at the current location counter.

use crate::assembler::line::SourceLine;
use crate::assembler::{Error, SymbolTable, Warning};

/// `.org expr`: the new location counter value
pub fn org(line: &SourceLine, symbols: &SymbolTable) -> Result<u16, Error> {
    if line.n_operands() == 0 {
        return Err(line.operand_count_error());
    }
    let address = line.eval_operand(0, symbols)?;
    if !(0..=0xFFFF).contains(&address) {
        return Err(Error::AddressRange {
            address,
            file: line.file().to_path_buf(),
            line: line.line(),
        });
    }
    Ok(address as u16)
}

/// `.equ NAME, expr`: the name and its evaluated value. The caller
/// decides whether the binding takes effect (predefines stay frozen).
pub fn equ(line: &SourceLine, symbols: &SymbolTable) -> Result<(String, i64), Error> {
    if line.n_operands() < 2 {
        return Err(line.operand_count_error());
    }
    let name = line.operand(0).to_string();
    let value = line.eval_operand(1, symbols)?;
    Ok((name, value))
}

/// `.byte e1, e2, ...`: one byte per operand
pub fn byte(line: &SourceLine, symbols: &SymbolTable) -> Result<Vec<u8>, Error> {
    let mut data = Vec::with_capacity(line.n_operands());
    for index in 0..line.n_operands() {
        let value = line.eval_operand(index, symbols)?;
        if !(-128..=255).contains(&value) {
            return Err(Error::ValueRange {
                value,
                file: line.file().to_path_buf(),
                line: line.line(),
            });
        }
        data.push((value & 0xFF) as u8);
    }
    Ok(data)
}

/// `.word e1, e2, ...`: one little-endian 16-bit word per operand
pub fn word(line: &SourceLine, symbols: &SymbolTable) -> Result<Vec<u8>, Error> {
    let mut data = Vec::with_capacity(line.n_operands() * 2);
    for index in 0..line.n_operands() {
        let value = line.eval_operand(index, symbols)? & 0xFFFF;
        data.push((value & 0xFF) as u8);
        data.push((value >> 8) as u8);
    }
    Ok(data)
}

/// `.resetvec expr`: the 16-bit reset vector to place at 0xFFFC/0xFFFD
pub fn resetvec(line: &SourceLine, symbols: &SymbolTable) -> Result<u16, Error> {
    line.assert_n_operands(1)?;
    let value = line.eval_operand(0, symbols)?;
    Ok((value & 0xFFFF) as u16)
}

/// `__LOADADDR_HI__ Rn, expr`: the sentinel left behind by the LOADADDR
/// expansion. Emits no bytes; produces a warning when the target does not
/// fit the 8-bit immediate the expansion loaded.
pub fn loadaddr_hi(line: &SourceLine, symbols: &SymbolTable) -> Option<Warning> {
    if line.n_operands() < 2 {
        return None;
    }
    let register = line.operand(0);
    let value = line
        .eval_operand(1, symbols)
        .unwrap_or(0);
    if value > 0xFF {
        return Some(Warning {
            message: format!(
                "LOADADDR: address 0x{:04X} > 0xFF; only low byte loaded into {}. \
                 High byte requires additional instructions.",
                value, register
            ),
            file: line.file().to_path_buf(),
            line: line.line(),
        });
    }
    None
}
