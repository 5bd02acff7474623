//! [SourceLine] struct and its parsing utilities

use std::path::{Path, PathBuf};

use crate::assembler::expr::{self, EvalError};
use crate::assembler::{Error, SymbolTable};

/// A single line of assembly after preprocessing: an optional label, an
/// optional uppercased mnemonic and its comma-separated operands, plus the
/// originating file and 1-based line number for diagnostics
#[derive(Debug, Clone)]
pub struct SourceLine {
    file: PathBuf,
    line: usize,
    label: Option<String>,
    mnemonic: Option<String>,
    operands: Vec<String>,
    raw: String,
}

impl SourceLine {
    pub fn new(
        file: PathBuf,
        line: usize,
        label: Option<String>,
        mnemonic: Option<String>,
        operands: Vec<String>,
        raw: String,
    ) -> SourceLine {
        SourceLine { file, line, label, mnemonic, operands, raw }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    /// The uppercased mnemonic, if the line has one
    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref()
    }

    pub fn operands(&self) -> &[String] {
        &self.operands
    }

    pub fn n_operands(&self) -> usize {
        self.operands.len()
    }

    /// The original source text (empty for synthesized expansion lines)
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Get the operand at the given index; the caller must have checked
    /// the operand count
    pub fn operand(&self, index: usize) -> &str {
        &self.operands[index]
    }

    /// Assert that the line has exactly `n` operands
    pub fn assert_n_operands(&self, n: usize) -> Result<(), Error> {
        if self.operands.len() != n {
            return Err(self.operand_count_error());
        }
        Ok(())
    }

    /// Parse the operand at the given index as a register
    pub fn parse_register(&self, index: usize) -> Result<u8, Error> {
        parse_register(self.operand(index), &self.file, self.line)
    }

    /// Evaluate the operand at the given index as an integer expression
    pub fn eval_operand(&self, index: usize, symbols: &SymbolTable) -> Result<i64, Error> {
        self.eval_expr(self.operand(index), symbols)
    }

    /// Evaluate an arbitrary expression string with this line's location
    /// attached to any failure
    pub fn eval_expr(&self, text: &str, symbols: &SymbolTable) -> Result<i64, Error> {
        expr::eval(text, symbols).map_err(|e| self.eval_error(e))
    }

    /// Convert an expression failure into a located assembler error
    pub fn eval_error(&self, error: EvalError) -> Error {
        match error {
            EvalError::UndefinedSymbol(name) => Error::UndefinedSymbol {
                name,
                file: self.file.clone(),
                line: self.line,
            },
            EvalError::Syntax(message) => Error::ExpressionSyntax {
                message,
                file: self.file.clone(),
                line: self.line,
            },
        }
    }

    /// Generate an error for an unexpected number of operands
    pub fn operand_count_error(&self) -> Error {
        Error::OperandCount {
            mnemonic: self.mnemonic.clone().unwrap_or_default(),
            found: self.operands.len(),
            file: self.file.clone(),
            line: self.line,
        }
    }
}

/// Parse `R0`..`R15`, case-insensitive, tolerating surrounding whitespace
pub fn parse_register(token: &str, file: &Path, line: usize) -> Result<u8, Error> {
    let token = token.trim();
    let digits = token
        .strip_prefix('R')
        .or_else(|| token.strip_prefix('r'))
        .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()));
    let digits = digits.ok_or_else(|| Error::OperandSyntax {
        operand: token.to_string(),
        file: file.to_path_buf(),
        line,
    })?;
    let number: u32 = digits.parse().map_err(|_| Error::RegisterRange {
        register: u32::MAX,
        file: file.to_path_buf(),
        line,
    })?;
    if number > 15 {
        return Err(Error::RegisterRange {
            register: number,
            file: file.to_path_buf(),
            line,
        });
    }
    Ok(number as u8)
}

/// Whether a token looks like a register reference (`R` followed by
/// digits). Operands that do not are treated as immediate expressions.
pub fn is_register(token: &str) -> bool {
    let token = token.trim();
    token
        .strip_prefix('R')
        .or_else(|| token.strip_prefix('r'))
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Split a comma-separated operand list, respecting parentheses and
/// double-quoted strings
pub fn split_operands(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut current = String::new();

    for c in text.chars() {
        match c {
            '"' => {
                in_string = !in_string;
                current.push(c);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 && !in_string => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}
