//! Source preprocessing: comment stripping, `.include` resolution, user
//! macro collection and expansion, the built-in `LOADADDR`/`JMP_L`/`CALL_L`
//! macros, and `NAME = expr` constant-assignment rewriting
//!
//! The preprocessor consumes a file and produces the flat [SourceLine]
//! stream the two passes work on. It also captures `.equ` values eagerly
//! so that later `.org` directives can use constants defined above them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::assembler::expr;
use crate::assembler::line::{split_operands, SourceLine};
use crate::assembler::{Error, SymbolTable};

/// A user macro: parameter names and raw body lines, stored pre-parse
#[derive(Debug, Clone)]
struct MacroDef {
    params: Vec<String>,
    body: Vec<String>,
}

/// Expands includes and macros, yielding parsed source lines
pub struct Preprocessor {
    macros: HashMap<String, MacroDef>,
    defines: SymbolTable,
    include_stack: Vec<PathBuf>,
    label_re: Regex,
    mnemonic_re: Regex,
    assign_re: Regex,
    include_re: Regex,
    equ_re: Regex,
}

impl Preprocessor {
    /// Create a preprocessor seeded with the caller's predefined constants
    pub fn new(defines: SymbolTable) -> Preprocessor {
        Preprocessor {
            macros: HashMap::new(),
            defines,
            include_stack: Vec::new(),
            label_re: Regex::new(r"^([A-Za-z_]\w*)\s*:").unwrap(),
            mnemonic_re: Regex::new(r"^([A-Za-z_.]\w*)").unwrap(),
            assign_re: Regex::new(r"^([A-Za-z_]\w*)\s*=\s*(.+)$").unwrap(),
            include_re: Regex::new(r#"(?i)^\.include\s+"([^"]+)""#).unwrap(),
            equ_re: Regex::new(r"(?i)^(?:[A-Za-z_]\w*\s*:\s*)?\.equ\s+([A-Za-z_]\w*)\s*,\s*(.+)$")
                .unwrap(),
        }
    }

    /// Constants known so far: the seed defines plus every `.equ` that
    /// could be evaluated eagerly
    pub fn defines(&self) -> &SymbolTable {
        &self.defines
    }

    /// Preprocess a source file and everything it includes
    pub fn process_file(&mut self, path: &Path) -> Result<Vec<SourceLine>, Error> {
        let abs_path = path.canonicalize().map_err(|_| Error::ReadError {
            path: path.to_path_buf(),
        })?;
        let source = fs::read_to_string(&abs_path).map_err(|_| Error::ReadError {
            path: path.to_path_buf(),
        })?;
        self.include_stack.push(abs_path.clone());
        let result = self.process_lines(&source, &abs_path);
        self.include_stack.pop();
        result
    }

    /// Preprocess a source string (used by tests and `assemble_str`)
    pub fn process_str(&mut self, source: &str, file: &Path) -> Result<Vec<SourceLine>, Error> {
        self.process_lines(source, file)
    }

    fn process_included_file(
        &mut self,
        path: &Path,
        from_file: &Path,
        from_line: usize,
    ) -> Result<Vec<SourceLine>, Error> {
        let not_found = || Error::IncludeNotFound {
            path: path.to_path_buf(),
            file: from_file.to_path_buf(),
            line: from_line,
        };
        let abs_path = path.canonicalize().map_err(|_| not_found())?;
        if self.include_stack.contains(&abs_path) {
            return Err(Error::CircularInclude {
                path: abs_path,
                file: from_file.to_path_buf(),
                line: from_line,
            });
        }
        let source = fs::read_to_string(&abs_path).map_err(|_| not_found())?;
        self.include_stack.push(abs_path.clone());
        let result = self.process_lines(&source, &abs_path);
        self.include_stack.pop();
        result
    }

    fn process_lines(&mut self, source: &str, file: &Path) -> Result<Vec<SourceLine>, Error> {
        let mut out = Vec::new();
        // (name, params, body) while collecting a .macro definition
        let mut in_macro: Option<(String, Vec<String>, Vec<String>)> = None;

        for (index, raw) in source.lines().enumerate() {
            let lineno = index + 1;
            let stripped = strip_comment(raw);
            let line = stripped.trim();
            if line.is_empty() {
                continue;
            }
            let upper = line.to_uppercase();

            if in_macro.is_some() {
                if upper == ".ENDM" {
                    let (name, params, body) = in_macro.take().unwrap();
                    self.macros.insert(name, MacroDef { params, body });
                } else if upper.starts_with(".MACRO") {
                    let (name, _, _) = in_macro.take().unwrap();
                    return Err(Error::NestedMacro {
                        name,
                        file: file.to_path_buf(),
                        line: lineno,
                    });
                } else if let Some((_, _, body)) = in_macro.as_mut() {
                    body.push(line.to_string());
                }
                continue;
            }

            if upper.starts_with(".MACRO") {
                in_macro = Some(self.parse_macro_header(line, file, lineno)?);
                continue;
            }

            if upper == ".ENDM" {
                return Err(Error::StrayEndm {
                    file: file.to_path_buf(),
                    line: lineno,
                });
            }

            if let Some(captures) = self.include_re.captures(line) {
                let mut inc_path = PathBuf::from(&captures[1]);
                if inc_path.is_relative() {
                    if let Some(dir) = file.parent() {
                        inc_path = dir.join(inc_path);
                    }
                }
                out.extend(self.process_included_file(&inc_path, file, lineno)?);
                continue;
            }
            if upper.starts_with(".INCLUDE") {
                return Err(Error::OperandSyntax {
                    operand: line.to_string(),
                    file: file.to_path_buf(),
                    line: lineno,
                });
            }

            out.extend(self.expand_line(line, file, lineno)?);
        }

        if let Some((name, _, _)) = in_macro {
            return Err(Error::UnterminatedMacro {
                name,
                file: file.to_path_buf(),
            });
        }
        Ok(out)
    }

    /// Process one comment-stripped line: constant-assignment rewrite,
    /// eager `.equ` capture, parse, then macro and builtin expansion.
    /// Macro body lines come back through here, so invocations inside a
    /// body expand at invocation time.
    fn expand_line(
        &mut self,
        line: &str,
        file: &Path,
        lineno: usize,
    ) -> Result<Vec<SourceLine>, Error> {
        // NAME = expr is sugar for .equ NAME, expr
        let rewritten = match self.assign_re.captures(line) {
            Some(captures) => format!(".equ {}, {}", &captures[1], captures[2].trim()),
            None => line.to_string(),
        };

        // Eagerly capture .equ values so .org below them can resolve.
        // Failures are left for the passes to retry with the full table.
        if let Some(captures) = self.equ_re.captures(&rewritten) {
            if let Ok(value) = expr::eval(&captures[2], &self.defines) {
                self.defines.insert(captures[1].to_string(), value);
            }
        }

        let parsed = match self.parse_one(&rewritten, file, lineno) {
            Some(parsed) => parsed,
            None => return Ok(Vec::new()),
        };

        if let Some(mnemonic) = parsed.mnemonic() {
            if self.macros.contains_key(mnemonic) {
                return self.expand_macro(&parsed, file, lineno);
            }
            if matches!(mnemonic, "LOADADDR" | "JMP_L" | "CALL_L") {
                return self.expand_builtin(&parsed, file, lineno);
            }
        }
        Ok(vec![parsed])
    }

    fn parse_macro_header(
        &self,
        line: &str,
        file: &Path,
        lineno: usize,
    ) -> Result<(String, Vec<String>, Vec<String>), Error> {
        let rest = line[".macro".len()..].trim();
        let mut pieces = rest.splitn(2, |c: char| c.is_whitespace() || c == ',');
        let name = pieces.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(Error::OperandCount {
                mnemonic: ".MACRO".to_string(),
                found: 0,
                file: file.to_path_buf(),
                line: lineno,
            });
        }
        let params = pieces
            .next()
            .unwrap_or("")
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|p| !p.is_empty())
            .map(|p| p.trim_start_matches('\\').to_string())
            .collect();
        Ok((name.to_uppercase(), params, Vec::new()))
    }

    fn parse_one(&self, line: &str, file: &Path, lineno: usize) -> Option<SourceLine> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut label = None;
        let mut rest = line;
        if let Some(captures) = self.label_re.captures(line) {
            label = Some(captures[1].to_string());
            rest = line[captures.get(0).unwrap().end()..].trim();
        }

        let mnemonic = match self.mnemonic_re.captures(rest) {
            Some(captures) => captures.get(1).unwrap(),
            None => {
                return Some(SourceLine::new(
                    file.to_path_buf(),
                    lineno,
                    label,
                    None,
                    Vec::new(),
                    line.to_string(),
                ));
            }
        };
        let operands = split_operands(rest[mnemonic.end()..].trim());

        Some(SourceLine::new(
            file.to_path_buf(),
            lineno,
            label,
            Some(mnemonic.as_str().to_uppercase()),
            operands,
            line.to_string(),
        ))
    }

    fn expand_macro(
        &mut self,
        invocation: &SourceLine,
        file: &Path,
        lineno: usize,
    ) -> Result<Vec<SourceLine>, Error> {
        let name = invocation.mnemonic().unwrap().to_string();
        let def = self.macros[&name].clone();
        let args = invocation.operands();

        if args.len() != def.params.len() {
            return Err(Error::MacroArity {
                name,
                expected: def.params.len(),
                found: args.len(),
                file: file.to_path_buf(),
                line: lineno,
            });
        }

        let mut result = Vec::new();
        for body_line in &def.body {
            let mut expanded = body_line.clone();
            for (param, arg) in def.params.iter().zip(args) {
                // \param first, then bare whole-word occurrences
                expanded = expanded.replace(&format!("\\{}", param), arg);
                expanded = replace_word(&expanded, param, arg);
            }
            for mut sub in self.expand_line(&expanded, file, lineno)? {
                // the invocation's label lands on the first expanded line
                if result.is_empty() {
                    if let Some(label) = invocation.label() {
                        sub.set_label(Some(label.to_string()));
                    }
                }
                result.push(sub);
            }
        }
        Ok(result)
    }

    fn expand_builtin(
        &mut self,
        invocation: &SourceLine,
        file: &Path,
        lineno: usize,
    ) -> Result<Vec<SourceLine>, Error> {
        let mnemonic = invocation.mnemonic().unwrap();
        invocation.assert_n_operands(2)?;
        let make = |label: Option<String>, mnemonic: &str, operands: Vec<String>| {
            SourceLine::new(
                file.to_path_buf(),
                lineno,
                label,
                Some(mnemonic.to_string()),
                operands,
                String::new(),
            )
        };

        let rn = invocation.operand(0).to_string();
        let target = invocation.operand(1).to_string();
        let label = invocation.label().map(str::to_string);

        let mut out = vec![
            make(label, "XOR", vec![rn.clone(), rn.clone(), rn.clone()]),
            make(None, "ADD", vec![rn.clone(), format!("#lo({})", target)]),
            make(None, "__LOADADDR_HI__", vec![rn.clone(), target]),
        ];
        match mnemonic {
            "LOADADDR" => {}
            "JMP_L" => out.push(make(None, "JMP", vec![rn])),
            "CALL_L" => out.push(make(None, "CALL", vec![rn])),
            _ => unreachable!(),
        }
        Ok(out)
    }
}

/// Remove a `;` comment, respecting double-quoted strings (so that
/// `.include "a;b.asm"` survives)
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

/// Replace whole-word occurrences of `word`, with word boundaries defined
/// over identifier characters
fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut result = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if text[i..].starts_with(word) {
            let before_ok = text[..i].chars().next_back().is_none_or(|c| !is_ident(c));
            let after_ok = text[i + word.len()..].chars().next().is_none_or(|c| !is_ident(c));
            if before_ok && after_ok {
                result.push_str(replacement);
                i += word.len();
                continue;
            }
        }
        let c = text[i..].chars().next().unwrap();
        result.push(c);
        i += c.len_utf8();
    }
    result
}
