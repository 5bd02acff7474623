//! Converts TMEPT assembly code into a ROM image in a two-pass manner
//!
//! The first pass assigns an address to every line and collects labels
//! and constants into a symbol table, while the second pass encodes the
//! instructions and directives into a sparse address->byte map.
//!
//! Comments start with a semicolon (`;`) and continue to the end of the
//! line. Labels are case-sensitive identifiers followed by a colon;
//! mnemonics and directives are case-insensitive:
//!
//! ```ignore
//! .equ COUNT, 5          ; constants, also COUNT = 5
//! start:
//!     XOR R1, R1, R1     ; R1 = 0
//!     ADD R1, #COUNT     ; 8-bit immediate, # optional
//! loop:
//!     ADD R2, R1         ; two-address form: R2 += R1
//!     DJN R1, R3         ; R1--; jump via R3 while R1 != 0
//! ```
//!
//! The instruction set has six encoding families:
//! - `3std`: arithmetic/logic/shift/bit/move; the addressing mode comes
//!   from the operand shape (`Rd,Rs1,Rs2` / `Rd,Rs` / `Rd,#imm` /
//!   `MOV Rd,[MAR]` / single-register bit manipulation)
//! - `2reg`: register-indirect branches, stack ops, MAR transfers
//! - `2noreg`: `IMAR`, `DMAR`, `RET`
//! - `lmar`: absolute 16-bit MAR load
//! - `cmp4`: compound compare-and-branch (`ALE`, `SLE`, `SJN`)
//! - `djn4`: decrement-and-jump (`DJN`)
//!
//! Supported directives: `.org`, `.equ`, `.byte`, `.word`, `.resetvec`,
//! `.include`, `.macro`/`.endm`. The built-in macros `LOADADDR`, `JMP_L`
//! and `CALL_L` expand to register-zeroing plus immediate-load sequences
//! for register-indirect branching.
//!
//! Expressions support `+ - * / % | & ^ ~ << >>`, parentheses, `lo()` /
//! `hi()` byte extractors, and `0x`/`0b`/`0o`/`$` literals. Forward label
//! references resolve in the second pass.

pub mod directives;
pub mod expr;
pub mod image;
pub mod instructions;
pub mod line;
pub mod listing;
pub mod opcodes;
pub mod preprocessor;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use self::line::SourceLine;
use self::opcodes::{Encoding, OPCODES};
use self::preprocessor::Preprocessor;

/// A symbol table maps case-sensitive identifiers to signed integers
pub type SymbolTable = HashMap<String, i64>;

/// Sparse memory image: address -> byte, last writer wins
pub type MemoryMap = HashMap<u16, u8>;

/// The reset vector lives at this fixed address pair (low byte first)
pub const RESET_VECTOR: u16 = 0xFFFC;

/// A non-fatal diagnostic collected during assembly
#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    pub file: PathBuf,
    pub line: usize,
}

/// One listing row: the address a line was assembled at and the bytes it
/// produced (empty for directives and label-only lines)
#[derive(Debug, Clone)]
pub struct ListingRecord {
    pub address: u16,
    pub bytes: Vec<u8>,
    pub line: SourceLine,
}

/// The result of a successful assembly
#[derive(Debug)]
pub struct Output {
    pub memory: MemoryMap,
    pub symbols: SymbolTable,
    pub listing: Vec<ListingRecord>,
    pub warnings: Vec<Warning>,
}

impl Output {
    /// Whether the program defines both reset vector bytes
    pub fn has_reset_vector(&self) -> bool {
        self.memory.contains_key(&RESET_VECTOR) && self.memory.contains_key(&(RESET_VECTOR + 1))
    }
}

/// Assemble a source file, resolving `.include`s relative to it.
/// `predefines` are caller-supplied constants that later `.equ`s and
/// labels cannot override.
pub fn assemble_file(path: &Path, predefines: &SymbolTable) -> Result<Output, Error> {
    let mut preprocessor = Preprocessor::new(predefines.clone());
    let lines = preprocessor.process_file(path)?;
    assemble_lines(&lines, preprocessor.defines(), predefines)
}

/// Assemble source code from a string (includes resolve against the
/// current directory)
pub fn assemble_str(source: &str, predefines: &SymbolTable) -> Result<Output, Error> {
    let mut preprocessor = Preprocessor::new(predefines.clone());
    let lines = preprocessor.process_str(source, Path::new("<string>"))?;
    assemble_lines(&lines, preprocessor.defines(), predefines)
}

fn assemble_lines(
    lines: &[SourceLine],
    captured_defines: &SymbolTable,
    predefines: &SymbolTable,
) -> Result<Output, Error> {
    let (mut symbols, located) = first_pass(lines, predefines)?;
    // Constants the preprocessor captured eagerly fill remaining gaps
    for (name, value) in captured_defines {
        symbols.entry(name.clone()).or_insert(*value);
    }
    second_pass(located, symbols, predefines)
}

/// First pass: walk the line stream, binding labels and early constants
/// and assigning every line its address
fn first_pass(
    lines: &[SourceLine],
    predefines: &SymbolTable,
) -> Result<(SymbolTable, Vec<(SourceLine, u16)>), Error> {
    let mut symbols = predefines.clone();
    let mut located = Vec::with_capacity(lines.len());
    let mut lc: u16 = 0;

    for source_line in lines {
        if let Some(label) = source_line.label() {
            if predefines.contains_key(label) {
                return Err(Error::LabelShadowsPredefine {
                    label: label.to_string(),
                    file: source_line.file().to_path_buf(),
                    line: source_line.line(),
                });
            }
            if symbols.contains_key(label) {
                return Err(Error::DuplicateLabel {
                    label: label.to_string(),
                    file: source_line.file().to_path_buf(),
                    line: source_line.line(),
                });
            }
            symbols.insert(label.to_string(), lc as i64);
        }

        located.push((source_line.clone(), lc));

        match source_line.mnemonic() {
            Some(".ORG") => match directives::org(source_line, &symbols) {
                Ok(address) => lc = address,
                // forward references resolve in pass 2, which re-evaluates
                Err(Error::UndefinedSymbol { .. }) | Err(Error::ExpressionSyntax { .. }) => {}
                Err(error) => return Err(error),
            },
            Some(".EQU") => {
                if source_line.n_operands() < 2 {
                    return Err(source_line.operand_count_error());
                }
                let name = source_line.operand(0);
                if !predefines.contains_key(name) {
                    match source_line.eval_operand(1, &symbols) {
                        Ok(value) => {
                            symbols.insert(name.to_string(), value);
                        }
                        // deferred to pass 2
                        Err(Error::UndefinedSymbol { .. })
                        | Err(Error::ExpressionSyntax { .. }) => {}
                        Err(error) => return Err(error),
                    }
                }
            }
            Some(mnemonic) => {
                lc = lc.wrapping_add(line_size(mnemonic, source_line.n_operands()));
            }
            None => {}
        }
    }

    Ok((symbols, located))
}

/// Static size rule used to advance the location counter without
/// encoding (operands may still be unresolvable in pass 1)
fn line_size(mnemonic: &str, n_operands: usize) -> u16 {
    match mnemonic {
        ".BYTE" => n_operands as u16,
        ".WORD" => n_operands as u16 * 2,
        ".RESETVEC" | "__LOADADDR_HI__" => 0,
        _ => match OPCODES.get(mnemonic) {
            Some(&(_, encoding)) => encoding.size(),
            // unknown mnemonics are reported in pass 2
            None => 0,
        },
    }
}

/// Second pass: resolve deferred constants, then encode every located
/// line into the memory map
fn second_pass(
    located: Vec<(SourceLine, u16)>,
    mut symbols: SymbolTable,
    predefines: &SymbolTable,
) -> Result<Output, Error> {
    // Re-evaluate .equs that pass 1 had to defer, in source order.
    // Predefines stay frozen; remaining failures are fatal below.
    for (source_line, _) in &located {
        if source_line.mnemonic() == Some(".EQU") && source_line.n_operands() >= 2 {
            let name = source_line.operand(0);
            if predefines.contains_key(name) {
                continue;
            }
            if let Ok(value) = source_line.eval_operand(1, &symbols) {
                symbols.insert(name.to_string(), value);
            }
        }
    }

    let mut memory = MemoryMap::new();
    let mut records = Vec::with_capacity(located.len());
    let mut warnings = Vec::new();

    for (source_line, address) in located {
        let bytes = match source_line.mnemonic() {
            None => Vec::new(),
            Some(".ORG") => {
                // surfaces forward-reference failures pass 1 swallowed
                directives::org(&source_line, &symbols)?;
                Vec::new()
            }
            Some(".EQU") => {
                if source_line.n_operands() < 2 {
                    return Err(source_line.operand_count_error());
                }
                // predefines silently override .equ of the same name
                if !predefines.contains_key(source_line.operand(0)) {
                    let (name, value) = directives::equ(&source_line, &symbols)?;
                    symbols.insert(name, value);
                }
                Vec::new()
            }
            Some(".BYTE") => directives::byte(&source_line, &symbols)?,
            Some(".WORD") => directives::word(&source_line, &symbols)?,
            Some(".RESETVEC") => {
                let vector = directives::resetvec(&source_line, &symbols)?;
                memory.insert(RESET_VECTOR, (vector & 0xFF) as u8);
                memory.insert(RESET_VECTOR + 1, (vector >> 8) as u8);
                Vec::new()
            }
            Some("__LOADADDR_HI__") => {
                if let Some(warning) = directives::loadaddr_hi(&source_line, &symbols) {
                    warnings.push(warning);
                }
                Vec::new()
            }
            Some(mnemonic) => {
                let &(opcode, encoding) =
                    OPCODES.get(mnemonic).ok_or_else(|| Error::UnknownMnemonic {
                        mnemonic: mnemonic.to_string(),
                        file: source_line.file().to_path_buf(),
                        line: source_line.line(),
                    })?;
                match encoding {
                    Encoding::Std3 => instructions::encode_3std(opcode, &source_line, &symbols)?,
                    Encoding::Reg2 => instructions::encode_2reg(opcode, &source_line)?,
                    Encoding::NoReg2 => instructions::encode_2noreg(opcode, &source_line)?,
                    Encoding::Lmar => instructions::encode_lmar(opcode, &source_line, &symbols)?,
                    Encoding::Cmp4 => instructions::encode_cmp4(opcode, &source_line)?,
                    Encoding::Djn4 => instructions::encode_djn4(opcode, &source_line)?,
                }
            }
        };

        for (offset, &byte) in bytes.iter().enumerate() {
            memory.insert(address.wrapping_add(offset as u16), byte);
        }
        records.push(ListingRecord { address, bytes, line: source_line });
    }

    Ok(Output { memory, symbols, listing: records, warnings })
}

/// An error that can occur during the assembly process
#[derive(Debug)]
pub enum Error {
    /// A mnemonic that is neither an instruction nor a directive
    UnknownMnemonic { mnemonic: String, file: PathBuf, line: usize },
    /// A label bound twice
    DuplicateLabel { label: String, file: PathBuf, line: usize },
    /// A label trying to rebind a caller-supplied constant
    LabelShadowsPredefine { label: String, file: PathBuf, line: usize },
    /// An identifier missing from the symbol table
    UndefinedSymbol { name: String, file: PathBuf, line: usize },
    /// A malformed or uncomputable expression
    ExpressionSyntax { message: String, file: PathBuf, line: usize },
    /// An operand list of the wrong length
    OperandCount { mnemonic: String, found: usize, file: PathBuf, line: usize },
    /// An operand that does not parse in its position
    OperandSyntax { operand: String, file: PathBuf, line: usize },
    /// A register number above R15
    RegisterRange { register: u32, file: PathBuf, line: usize },
    /// An address outside the 16-bit space
    AddressRange { address: i64, file: PathBuf, line: usize },
    /// A `.byte` value outside [-128, 255]
    ValueRange { value: i64, file: PathBuf, line: usize },
    /// An include that is already being processed
    CircularInclude { path: PathBuf, file: PathBuf, line: usize },
    /// An include file that cannot be opened
    IncludeNotFound { path: PathBuf, file: PathBuf, line: usize },
    /// End of file inside a `.macro` body
    UnterminatedMacro { name: String, file: PathBuf },
    /// A `.macro` inside another `.macro` body
    NestedMacro { name: String, file: PathBuf, line: usize },
    /// An `.endm` with no open `.macro`
    StrayEndm { file: PathBuf, line: usize },
    /// A macro invoked with the wrong number of arguments
    MacroArity { name: String, expected: usize, found: usize, file: PathBuf, line: usize },
    /// The input file could not be read
    ReadError { path: PathBuf },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownMnemonic { mnemonic, file, line } => {
                write!(f, "unknown mnemonic \"{}\" ({}:{})", mnemonic, file.display(), line)
            }
            Error::DuplicateLabel { label, file, line } => {
                write!(f, "duplicate label \"{}\" ({}:{})", label, file.display(), line)
            }
            Error::LabelShadowsPredefine { label, file, line } => {
                write!(
                    f,
                    "label \"{}\" shadows a predefined constant ({}:{})",
                    label,
                    file.display(),
                    line
                )
            }
            Error::UndefinedSymbol { name, file, line } => {
                write!(f, "undefined symbol \"{}\" ({}:{})", name, file.display(), line)
            }
            Error::ExpressionSyntax { message, file, line } => {
                write!(f, "cannot evaluate expression: {} ({}:{})", message, file.display(), line)
            }
            Error::OperandCount { mnemonic, found, file, line } => {
                write!(
                    f,
                    "{}: unexpected operand count ({}) ({}:{})",
                    mnemonic,
                    found,
                    file.display(),
                    line
                )
            }
            Error::OperandSyntax { operand, file, line } => {
                write!(f, "invalid operand \"{}\" ({}:{})", operand, file.display(), line)
            }
            Error::RegisterRange { register, file, line } => {
                write!(
                    f,
                    "register R{} out of range (max R15) ({}:{})",
                    register,
                    file.display(),
                    line
                )
            }
            Error::AddressRange { address, file, line } => {
                write!(
                    f,
                    "address {} out of 16-bit range ({}:{})",
                    address,
                    file.display(),
                    line
                )
            }
            Error::ValueRange { value, file, line } => {
                write!(f, ".byte value {} out of range ({}:{})", value, file.display(), line)
            }
            Error::CircularInclude { path, file, line } => {
                write!(
                    f,
                    "circular include of \"{}\" ({}:{})",
                    path.display(),
                    file.display(),
                    line
                )
            }
            Error::IncludeNotFound { path, file, line } => {
                write!(
                    f,
                    "cannot open include file \"{}\" ({}:{})",
                    path.display(),
                    file.display(),
                    line
                )
            }
            Error::UnterminatedMacro { name, file } => {
                write!(f, "unterminated .macro \"{}\" ({})", name, file.display())
            }
            Error::NestedMacro { name, file, line } => {
                write!(
                    f,
                    ".macro inside the body of \"{}\" ({}:{})",
                    name,
                    file.display(),
                    line
                )
            }
            Error::StrayEndm { file, line } => {
                write!(f, ".endm without a matching .macro ({}:{})", file.display(), line)
            }
            Error::MacroArity { name, expected, found, file, line } => {
                write!(
                    f,
                    "macro \"{}\" expects {} args, got {} ({}:{})",
                    name,
                    expected,
                    found,
                    file.display(),
                    line
                )
            }
            Error::ReadError { path } => {
                write!(f, "failed to read file {}", path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::opcodes::SINGLE_OPERAND;

    fn asm(source: &str) -> Output {
        assemble_str(source, &SymbolTable::new()).unwrap()
    }

    fn asm_with(source: &str, predefines: &SymbolTable) -> Output {
        assemble_str(source, predefines).unwrap()
    }

    fn asm_err(source: &str) -> Error {
        assemble_str(source, &SymbolTable::new()).unwrap_err()
    }

    /// Assemble and flatten to a byte image starting at address 0
    fn flat(source: &str) -> Vec<u8> {
        image::image_bytes(&asm(source).memory)
    }

    fn defines(pairs: &[(&str, i64)]) -> SymbolTable {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    // ── instruction encodings through the full pipeline ──

    #[test]
    fn add_three_address() {
        assert_eq!(flat("ADD R1, R2, R3\n"), [0x00, 0x04, 0x23, 0x00]);
    }

    #[test]
    fn add_two_address() {
        let bytes = flat("ADD R5, R6\n");
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], (0b01 << 6) | (5 << 2));
        assert_eq!(bytes[2], (5 << 4) | 6);
    }

    #[test]
    fn add_immediate() {
        let bytes = flat("ADD R2, #0x11\n");
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], (0b10 << 6) | (2 << 2));
        assert_eq!(bytes[2], 0x11);
    }

    #[test]
    fn xor_zero_idiom() {
        let bytes = flat("XOR R1, R1, R1\n");
        assert_eq!(bytes[0], 0x08);
        assert_eq!(bytes[1], 1 << 2);
        assert_eq!(bytes[2], (1 << 4) | 1);
    }

    #[test]
    fn mov_forms() {
        let bytes = flat("MOV R2, R7\n");
        assert_eq!(bytes[0], 0x2D);
        assert_eq!(bytes[1], (0b01 << 6) | (2 << 2));

        let bytes = flat("MOV R3, [MAR]\n");
        assert_eq!(bytes[0], 0x2D);
        assert_eq!(bytes[1], (0b11 << 6) | (3 << 2));
        assert_eq!(bytes[2], 0x00);
    }

    #[test]
    fn branch_family() {
        for (mnemonic, opcode) in [
            ("JMP", 0x26u8),
            ("JMZ", 0x27),
            ("JMN", 0x28),
            ("JMG", 0x29),
            ("JMO", 0x2A),
            ("JIE", 0x2B),
            ("JIO", 0x2C),
            ("JNE", 0x38),
            ("JGE", 0x39),
            ("JLE", 0x3A),
        ] {
            let bytes = flat(&format!("{} R5\n", mnemonic));
            assert_eq!(bytes, [opcode, 5 << 2], "{}", mnemonic);
        }
    }

    #[test]
    fn mar_and_stack_family() {
        assert_eq!(flat("SMAR R4\n"), [0x2F, 4 << 2]);
        assert_eq!(flat("LOAD R1\n"), [0x30, 1 << 2]);
        assert_eq!(flat("STOR R2\n"), [0x31, 2 << 2]);
        assert_eq!(flat("IMAR\n"), [0x32, 0x00]);
        assert_eq!(flat("DMAR\n"), [0x33, 0x00]);
        assert_eq!(flat("PUSH R3\n"), [0x3B, 3 << 2]);
        assert_eq!(flat("POP R5\n"), [0x3C, 5 << 2]);
        assert_eq!(flat("CALL R6\n"), [0x3D, 6 << 2]);
        assert_eq!(flat("RET\n"), [0x3E, 0x00]);
    }

    #[test]
    fn compound_family() {
        assert_eq!(flat("DJN R1, R5\n"), [0x35, 1 << 4, 1 << 4, 5 << 4]);
        assert_eq!(flat("ALE R1, R2, R3, R4\n"), [0x34, (1 << 4) | 2, 3 << 4, 4 << 4]);
        assert_eq!(flat("SLE R2, R3, R4, R5\n")[0], 0x36);
        assert_eq!(flat("SJN R1, R2, R3, R4\n")[0], 0x37);
    }

    #[test]
    fn every_opcode_assembles_to_its_table_byte() {
        for (mnemonic, &(opcode, encoding)) in OPCODES.entries() {
            let source = if SINGLE_OPERAND.contains(*mnemonic) {
                format!("{} R1\n", mnemonic)
            } else {
                match encoding {
                    Encoding::Std3 => match *mnemonic {
                        "MOV" | "CMP" => format!("{} R1, R2\n", mnemonic),
                        _ => format!("{} R1, R2, R3\n", mnemonic),
                    },
                    Encoding::Reg2 => format!("{} R1\n", mnemonic),
                    Encoding::NoReg2 => format!("{}\n", mnemonic),
                    Encoding::Lmar => format!("{} 0x1000\n", mnemonic),
                    Encoding::Cmp4 => format!("{} R1, R2, R3, R4\n", mnemonic),
                    Encoding::Djn4 => format!("{} R1, R2\n", mnemonic),
                }
            };
            let output = asm(&source);
            assert_eq!(
                output.memory[&0], opcode,
                "{}: expected opcode {:#04X}",
                mnemonic, opcode
            );
        }
    }

    // ── labels and forward references ──

    #[test]
    fn label_defines_address() {
        let output = asm(".org 0x10\nstart:\nRET\n");
        assert_eq!(output.symbols["start"], 0x10);
    }

    #[test]
    fn label_used_in_lmar() {
        let bytes = flat(".org 0x0000\nLMAR target\nRET\ntarget:\nADD R1, #1\n");
        // LMAR(3) + RET(2), so target sits at 0x0005
        assert_eq!(bytes[0], 0x2E);
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[2], 0x05);
    }

    #[test]
    fn forward_reference_in_lmar() {
        let bytes = flat("LMAR forward\nRET\nforward:\nADD R1, #0\n");
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[2], 0x05);
    }

    #[test]
    fn duplicate_label_is_an_error() {
        assert!(matches!(
            asm_err("start:\nstart:\nRET\n"),
            Error::DuplicateLabel { .. }
        ));
    }

    #[test]
    fn label_in_expression() {
        let bytes = flat(".equ BASE, 0x100\nLMAR BASE+0x10\n");
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], 0x10);
    }

    #[test]
    fn equ_forward_label_resolves_in_pass_2() {
        let bytes = flat(".equ TGT, end+1\nLMAR TGT\nRET\nend:\nRET\n");
        // end = 5, so TGT = 6
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[2], 0x06);
    }

    // ── directives ──

    #[test]
    fn org_places_code() {
        let output = asm(".org 0x200\nRET\n");
        assert_eq!(output.memory[&0x200], 0x3E);
    }

    #[test]
    fn org_leaves_gaps_unmapped() {
        let output = asm(".org 0x00\nRET\n.org 0x10\nRET\n");
        assert!(output.memory.contains_key(&0x00));
        assert!(output.memory.contains_key(&0x10));
        assert!(!output.memory.contains_key(&0x02));
    }

    #[test]
    fn org_with_eagerly_captured_constant() {
        let output = asm("PAGE = 0x0300\n.org PAGE\nRET\n");
        assert_eq!(output.memory[&0x300], 0x3E);
    }

    #[test]
    fn equ_in_immediate() {
        let bytes = flat(".equ ANSWER, 42\nADD R1, #ANSWER\n");
        assert_eq!(bytes[2], 42);
    }

    #[test]
    fn equ_expressions_compose() {
        let bytes = flat(".equ BASE, 0x100\n.equ OFFSET, 0x20\nLMAR BASE+OFFSET\n");
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], 0x20);
    }

    #[test]
    fn byte_directive() {
        let output = asm(".byte 0xAB\n");
        assert_eq!(output.memory[&0], 0xAB);
        let output = asm(".byte 1, 2, 3\n");
        assert_eq!(
            (output.memory[&0], output.memory[&1], output.memory[&2]),
            (1, 2, 3)
        );
    }

    #[test]
    fn byte_with_expression() {
        let output = asm(".equ X, 10\n.byte X*2\n");
        assert_eq!(output.memory[&0], 20);
    }

    #[test]
    fn word_directive_little_endian() {
        let output = asm(".word 0x1234\n");
        assert_eq!(output.memory[&0], 0x34);
        assert_eq!(output.memory[&1], 0x12);

        let output = asm(".word 0x0001, 0x0200\n");
        assert_eq!(output.memory[&0], 0x01);
        assert_eq!(output.memory[&1], 0x00);
        assert_eq!(output.memory[&2], 0x00);
        assert_eq!(output.memory[&3], 0x02);
    }

    #[test]
    fn resetvec_writes_fixed_addresses() {
        let output = asm(".resetvec 0x0200\n");
        assert_eq!(output.memory[&0xFFFC], 0x00);
        assert_eq!(output.memory[&0xFFFD], 0x02);
        assert!(output.has_reset_vector());
    }

    #[test]
    fn resetvec_does_not_advance_lc() {
        let output = asm(".org 0x00\n.resetvec 0x0200\nRET\n");
        assert_eq!(output.memory[&0x00], 0x3E);
    }

    #[test]
    fn resetvec_last_writer_wins() {
        let output = asm(".resetvec 0x0100\n.resetvec 0x0200\n");
        assert_eq!(output.memory[&0xFFFD], 0x02);
    }

    #[test]
    fn missing_reset_vector_is_detectable() {
        assert!(!asm("RET\n").has_reset_vector());
    }

    // ── built-in macros ──

    #[test]
    fn loadaddr_small() {
        let bytes = flat("LOADADDR R3, 0x42\n");
        // XOR R3,R3,R3
        assert_eq!(bytes[0], 0x08);
        assert_eq!(bytes[1], 3 << 2);
        assert_eq!(bytes[2], (3 << 4) | 3);
        // ADD R3,#lo(0x42)
        assert_eq!(bytes[3], 0x00);
        assert_eq!(bytes[4], (0b10 << 6) | (3 << 2));
        assert_eq!(bytes[5], 0x42);
    }

    #[test]
    fn loadaddr_label() {
        let bytes = flat("LOADADDR R1, target\ntarget:\nRET\n");
        // XOR(3) + ADD(3) precede the label, so target = 6
        assert_eq!(bytes[5], 6);
    }

    #[test]
    fn jmp_l() {
        let bytes = flat("JMP_L R2, dest\ndest:\nRET\n");
        assert_eq!(bytes[0], 0x08); // XOR
        assert_eq!(bytes[3], 0x00); // ADD
        assert_eq!(bytes[6], 0x26); // JMP
        assert_eq!(bytes[7], 2 << 2);
    }

    #[test]
    fn call_l() {
        let bytes = flat("CALL_L R4, sub\nsub:\nRET\n");
        assert_eq!(bytes[6], 0x3D); // CALL
        assert_eq!(bytes[7], 4 << 2);
    }

    #[test]
    fn loadaddr_warns_above_byte_range() {
        let output = asm(".org 0\nLOADADDR R1, 0x1234\n");
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].message.contains("0x1234"));
    }

    #[test]
    fn loadaddr_in_range_is_silent() {
        assert!(asm("LOADADDR R1, 0xFF\n").warnings.is_empty());
    }

    // ── predefines ──

    #[test]
    fn predefine_used_in_expression() {
        let output = asm_with("ADD R1, #VERSION\n", &defines(&[("VERSION", 7)]));
        assert_eq!(output.memory[&2], 7);
    }

    #[test]
    fn predefine_overrides_equ() {
        let output = asm_with(".equ X, 10\nADD R1, #X\n", &defines(&[("X", 99)]));
        assert_eq!(output.memory[&2], 99);
        assert_eq!(output.symbols["X"], 99);
    }

    #[test]
    fn predefine_overrides_assignment_sugar() {
        let output = asm_with("X = 10\nADD R1, #X\n", &defines(&[("X", 99)]));
        assert_eq!(output.memory[&2], 99);
    }

    #[test]
    fn label_cannot_shadow_predefine() {
        let error = assemble_str("X:\nRET\n", &defines(&[("X", 1)])).unwrap_err();
        assert!(matches!(error, Error::LabelShadowsPredefine { .. }));
    }

    // ── 6502-style syntax ──

    #[test]
    fn dollar_hex_literals() {
        assert_eq!(flat("ADD R1, $42\n")[2], 0x42);
        assert_eq!(flat("LMAR $1234\n"), [0x2E, 0x12, 0x34]);
        let output = asm(".org $0100\nRET\n");
        assert_eq!(output.memory[&0x100], 0x3E);
    }

    #[test]
    fn constant_assignment_sugar() {
        assert_eq!(flat("COUNT = 7\nADD R1, COUNT\n")[2], 7);
        assert_eq!(flat("MASK = $F0\nADD R2, MASK\n")[2], 0xF0);
        let bytes = flat("BASE = $10\nOFFSET = 4\nLMAR BASE+OFFSET\n");
        assert_eq!(bytes[2], 0x14);
    }

    #[test]
    fn constant_assignment_after_use() {
        let bytes = flat("LMAR DEST\nRET\nDEST = $0080\n");
        assert_eq!(bytes[1], 0x00);
        assert_eq!(bytes[2], 0x80);
    }

    #[test]
    fn both_constant_styles_coexist() {
        let bytes = flat("A = 10\n.equ B, 20\nADD R1, A\nADD R2, B\n");
        assert_eq!(bytes[2], 10);
        assert_eq!(bytes[5], 20);
    }

    #[test]
    fn immediates_do_not_need_hash() {
        assert_eq!(flat("ADD R1, 5\n")[2], 5);
        assert_eq!(flat("N = 3\nADD R1, N*2\n")[2], 6);
        assert_eq!(flat("ADD R1, #$42\n")[2], 0x42);
    }

    // ── user macros end to end ──

    #[test]
    fn user_macro_without_params() {
        let bytes = flat(".macro HALT\nJMP R0\n.endm\nHALT\n");
        assert_eq!(bytes[0], 0x26);
        assert_eq!(bytes[1], 0x00);
    }

    #[test]
    fn user_macro_with_params() {
        let bytes = flat(".macro ZERO \\reg\nXOR \\reg, \\reg, \\reg\n.endm\nZERO R5\n");
        assert_eq!(bytes[0], 0x08);
        assert_eq!(bytes[1], 5 << 2);
        assert_eq!(bytes[2], (5 << 4) | 5);
    }

    #[test]
    fn macro_label_binds_at_invocation() {
        let output = asm(".macro NOP_LIKE\nADD R0, #0\n.endm\nentry: NOP_LIKE\n");
        assert_eq!(output.symbols["entry"], 0);
    }

    // ── errors ──

    #[test]
    fn error_cases() {
        assert!(matches!(asm_err("FOOBAR R1\n"), Error::UnknownMnemonic { .. }));
        assert!(matches!(asm_err("RET R1\n"), Error::OperandCount { .. }));
        assert!(matches!(asm_err("DJN R1\n"), Error::OperandCount { .. }));
        assert!(matches!(asm_err("LMAR 0x10000\n"), Error::AddressRange { .. }));
        assert!(matches!(asm_err("ADD R16, R1\n"), Error::RegisterRange { .. }));
        assert!(matches!(asm_err("JMP X5\n"), Error::OperandSyntax { .. }));
        assert!(matches!(asm_err(".byte 300\n"), Error::ValueRange { .. }));
        assert!(matches!(asm_err("LMAR nowhere\n"), Error::UndefinedSymbol { .. }));
        assert!(matches!(asm_err(".org 1+\n"), Error::ExpressionSyntax { .. }));
    }

    #[test]
    fn error_display_carries_location() {
        let message = asm_err("FOOBAR R1\n").to_string();
        assert!(message.contains("FOOBAR"));
        assert!(message.contains("<string>:1"));
    }

    // ── whole programs ──

    #[test]
    fn sum_loop_program() {
        let source = "\
.org 0x0000
  .equ COUNT, 5

  XOR  R1, R1, R1        ; R1 = 0
  ADD  R1, #COUNT        ; R1 = 5
  XOR  R2, R2, R2        ; R2 = 0
  XOR  R5, R5, R5        ; R5 = 0 (halt address)
  ADD  R3, #lo(loop)     ; R3 = loop address

loop:
  ADD  R2, R1            ; R2 += R1
  DJN  R1, R3            ; R1--; if R1 != 0 jump to loop

done:
  JMP  R5                ; halt (jump to 0)
";
        let output = asm(source);
        let bytes = image::image_bytes(&output.memory);
        assert_eq!(bytes[0], 0x08); // XOR
        assert_eq!(bytes[3], 0x00); // ADD
        assert_eq!(bytes[5], 5); // immediate COUNT
        assert_eq!(output.symbols["loop"], 15);
        assert_eq!(output.symbols["done"], 15 + 3 + 4);
    }

    #[test]
    fn listing_covers_every_line() {
        let output = asm(".org 0x10\nstart:\nRET\n.equ X, 1\n");
        assert_eq!(output.listing.len(), 4);
        assert_eq!(output.listing[0].address, 0); // .org recorded at its own start
        assert_eq!(output.listing[1].address, 0x10); // label-only line
        assert_eq!(output.listing[2].address, 0x10);
        assert_eq!(output.listing[2].bytes, [0x3E, 0x00]);
        assert!(output.listing[3].bytes.is_empty());
    }
}
