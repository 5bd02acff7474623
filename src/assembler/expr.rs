//! Integer expression evaluation against a symbol table
//!
//! Supported atoms are decimal, `0x`/`0b`/`0o` literals, `$` hex literals
//! and identifiers looked up in the symbol table. Operators follow
//! conventional precedence: unary `~` and `-` bind tightest, then
//! `* / %`, then `+ -`, then `<< >>`, then `&`, then `^`, then `|`.
//! `lo(e)` and `hi(e)` extract the low and high byte of a 16-bit value.

use crate::assembler::SymbolTable;

/// A failure while evaluating an expression. Carries no source location;
/// callers attach the file and line of the operand being evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// An identifier was not present in the symbol table
    UndefinedSymbol(String),
    /// The expression text is malformed or cannot be computed
    Syntax(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Caret,
    Pipe,
    Tilde,
    Shl,
    Shr,
    LParen,
    RParen,
}

/// Evaluate `expr` to a signed integer, resolving identifiers from
/// `symbols`.
pub fn eval(expr: &str, symbols: &SymbolTable) -> Result<i64, EvalError> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(EvalError::Syntax("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0, symbols };
    let value = parser.bitor()?;
    if parser.pos != parser.tokens.len() {
        return Err(EvalError::Syntax(format!(
            "unexpected trailing input in \"{}\"", expr.trim()
        )));
    }
    Ok(value)
}

fn tokenize(expr: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '%' => { tokens.push(Token::Percent); i += 1; }
            '&' => { tokens.push(Token::Amp); i += 1; }
            '^' => { tokens.push(Token::Caret); i += 1; }
            '|' => { tokens.push(Token::Pipe); i += 1; }
            '~' => { tokens.push(Token::Tilde); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            '<' | '>' => {
                if i + 1 < chars.len() && chars[i + 1] == c {
                    tokens.push(if c == '<' { Token::Shl } else { Token::Shr });
                    i += 2;
                } else {
                    return Err(EvalError::Syntax(format!("unexpected '{}'", c)));
                }
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_hexdigit() {
                    end += 1;
                }
                if end == start {
                    return Err(EvalError::Syntax(
                        "'$' must be followed by hex digits".to_string(),
                    ));
                }
                let digits: String = chars[start..end].iter().collect();
                let value = i64::from_str_radix(&digits, 16).map_err(|_| {
                    EvalError::Syntax(format!("hex literal ${} out of range", digits))
                })?;
                tokens.push(Token::Int(value));
                i = end;
            }
            '0'..='9' => {
                let start = i;
                let mut end = i;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let text: String = chars[start..end].iter().collect();
                tokens.push(Token::Int(parse_int_literal(&text)?));
                i = end;
            }
            'A'..='Z' | 'a'..='z' | '_' => {
                let start = i;
                let mut end = i;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                tokens.push(Token::Ident(chars[start..end].iter().collect()));
                i = end;
            }
            _ => {
                return Err(EvalError::Syntax(format!("unexpected character '{}'", c)));
            }
        }
    }

    Ok(tokens)
}

/// Parse a bare integer literal, honoring `0x`, `0b` and `0o` prefixes.
pub fn parse_int_literal(text: &str) -> Result<i64, EvalError> {
    let bad = || EvalError::Syntax(format!("invalid integer literal \"{}\"", text));
    let lower = text.to_ascii_lowercase();
    let result = if let Some(digits) = lower.strip_prefix("0x") {
        i64::from_str_radix(digits, 16)
    } else if let Some(digits) = lower.strip_prefix("0b") {
        i64::from_str_radix(digits, 2)
    } else if let Some(digits) = lower.strip_prefix("0o") {
        i64::from_str_radix(digits, 8)
    } else {
        lower.parse::<i64>()
    };
    result.map_err(|_| bad())
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    symbols: &'a SymbolTable,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<(), EvalError> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err(EvalError::Syntax("expected ')'".to_string())),
        }
    }

    fn bitor(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.bitxor()?;
        while let Some(Token::Pipe) = self.peek() {
            self.next();
            lhs |= self.bitxor()?;
        }
        Ok(lhs)
    }

    fn bitxor(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.bitand()?;
        while let Some(Token::Caret) = self.peek() {
            self.next();
            lhs ^= self.bitand()?;
        }
        Ok(lhs)
    }

    fn bitand(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.shift()?;
        while let Some(Token::Amp) = self.peek() {
            self.next();
            lhs &= self.shift()?;
        }
        Ok(lhs)
    }

    fn shift(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.sum()?;
        loop {
            let left = match self.peek() {
                Some(Token::Shl) => true,
                Some(Token::Shr) => false,
                _ => break,
            };
            self.next();
            let rhs = self.sum()?;
            if !(0..64).contains(&rhs) {
                return Err(EvalError::Syntax(format!("shift amount {} out of range", rhs)));
            }
            lhs = if left { lhs.wrapping_shl(rhs as u32) } else { lhs >> rhs };
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.product()?;
        loop {
            let add = match self.peek() {
                Some(Token::Plus) => true,
                Some(Token::Minus) => false,
                _ => break,
            };
            self.next();
            let rhs = self.product()?;
            lhs = if add { lhs.wrapping_add(rhs) } else { lhs.wrapping_sub(rhs) };
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<i64, EvalError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Token::Star,
                Some(Token::Slash) => Token::Slash,
                Some(Token::Percent) => Token::Percent,
                _ => break,
            };
            self.next();
            let rhs = self.unary()?;
            lhs = match op {
                Token::Star => lhs.wrapping_mul(rhs),
                // Truncating toward zero, as in the rest of the toolchain
                Token::Slash if rhs != 0 => lhs.wrapping_div(rhs),
                Token::Percent if rhs != 0 => lhs.wrapping_rem(rhs),
                _ => return Err(EvalError::Syntax("division by zero".to_string())),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<i64, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.next();
                Ok(self.unary()?.wrapping_neg())
            }
            Some(Token::Tilde) => {
                self.next();
                Ok(!self.unary()?)
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<i64, EvalError> {
        match self.next() {
            Some(Token::Int(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.bitor()?;
                self.expect_rparen()?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                // lo/hi are byte extractors when called, symbols otherwise
                let is_call = matches!(self.peek(), Some(Token::LParen));
                if is_call && (name == "lo" || name == "hi") {
                    self.next();
                    let value = self.bitor()?;
                    self.expect_rparen()?;
                    return Ok(if name == "lo" {
                        value & 0xFF
                    } else {
                        (value >> 8) & 0xFF
                    });
                }
                self.symbols
                    .get(&name)
                    .copied()
                    .ok_or(EvalError::UndefinedSymbol(name))
            }
            Some(token) => Err(EvalError::Syntax(format!("unexpected token {:?}", token))),
            None => Err(EvalError::Syntax("unexpected end of expression".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ev(expr: &str) -> i64 {
        eval(expr, &HashMap::new()).unwrap()
    }

    #[test]
    fn literals() {
        assert_eq!(ev("42"), 42);
        assert_eq!(ev("0xFF"), 255);
        assert_eq!(ev("0b1010"), 10);
        assert_eq!(ev("0o17"), 15);
        assert_eq!(ev("$BEEF"), 0xBEEF);
        assert_eq!(ev("$0042"), 0x42);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(ev("3+4"), 7);
        assert_eq!(ev("10-3"), 7);
        assert_eq!(ev("3*4"), 12);
        assert_eq!(ev("12/4"), 3);
        assert_eq!(ev("7%3"), 1);
        assert_eq!(ev("-7/2"), -3); // truncates toward zero
    }

    #[test]
    fn bitwise() {
        assert_eq!(ev("0xF0|0x0F"), 0xFF);
        assert_eq!(ev("0xFF&0x0F"), 0x0F);
        assert_eq!(ev("0xFF^0x0F"), 0xF0);
        assert_eq!(ev("1<<4"), 16);
        assert_eq!(ev("0x80>>3"), 16);
        assert_eq!(ev("~0"), -1);
    }

    #[test]
    fn precedence() {
        assert_eq!(ev("2+3*4"), 14);
        assert_eq!(ev("(2+3)*4"), 20);
        assert_eq!(ev("1<<2+1"), 8); // addition binds tighter than shift
        assert_eq!(ev("0xF0|0x0F&0x03"), 0xF3);
        assert_eq!(ev("-2*3"), -6);
    }

    #[test]
    fn lo_hi() {
        assert_eq!(ev("lo(0x1234)"), 0x34);
        assert_eq!(ev("hi(0x1234)"), 0x12);
        assert_eq!(ev("lo(0x100+5)"), 5);
        assert_eq!(ev("hi(0xABCD)"), 0xAB);
    }

    #[test]
    fn symbols() {
        let mut symbols = HashMap::new();
        symbols.insert("FOO".to_string(), 9);
        symbols.insert("lo".to_string(), 3);
        assert_eq!(eval("FOO+1", &symbols).unwrap(), 10);
        // A symbol named lo is only a byte extractor when called
        assert_eq!(eval("lo+1", &symbols).unwrap(), 4);
    }

    #[test]
    fn undefined_symbol() {
        assert_eq!(
            eval("nope", &HashMap::new()),
            Err(EvalError::UndefinedSymbol("nope".to_string()))
        );
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(eval("", &HashMap::new()), Err(EvalError::Syntax(_))));
        assert!(matches!(eval("1+", &HashMap::new()), Err(EvalError::Syntax(_))));
        assert!(matches!(eval("(1", &HashMap::new()), Err(EvalError::Syntax(_))));
        assert!(matches!(eval("1 2", &HashMap::new()), Err(EvalError::Syntax(_))));
        assert!(matches!(eval("1/0", &HashMap::new()), Err(EvalError::Syntax(_))));
        assert!(matches!(eval("$", &HashMap::new()), Err(EvalError::Syntax(_))));
        assert!(matches!(eval("12ab", &HashMap::new()), Err(EvalError::Syntax(_))));
    }
}
