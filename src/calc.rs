//! Restricted arithmetic for the `calc` command.
//!
//! Accepts digits, `.`, whitespace and `+ - * / % ^ ( )` (`**` is also read as
//! a power). Any other character turns the request into a literal echo of its
//! whitespace-separated tokens instead of an error. `^` is right-associative
//! and binds tighter than unary minus; `%` takes the sign of the divisor.

use crate::error::CalcError;

/// Sentinel sent to the chat when evaluation fails.
pub const ERROR_SENTINEL: &str = "Error";

const MAX_DEPTH: usize = 64;

/// What a `calc` request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CalcOutcome {
    Value(f64),
    /// Input held characters outside the arithmetic alphabet.
    Echo(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    LParen,
    RParen,
}

fn is_arithmetic_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_whitespace() || "+-*/%^().".contains(c)
}

/// Evaluate `expr`.
pub fn evaluate(expr: &str) -> Result<CalcOutcome, CalcError> {
    if !expr.chars().all(is_arithmetic_char) {
        let echo = expr.split_whitespace().collect::<Vec<_>>().join(" ");
        return Ok(CalcOutcome::Echo(echo));
    }
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(CalcError::Empty);
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some((position, token)) = parser.peek_indexed() {
        return Err(CalcError::UnexpectedToken {
            token: format!("{token:?}"),
            position,
        });
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(CalcOutcome::Value(value))
}

/// Text sent back for a `calc` request: the value, the echo, or `Error`.
pub fn calc_reply(expr: &str) -> String {
    match evaluate(expr) {
        Ok(CalcOutcome::Value(v)) => format_number(v),
        Ok(CalcOutcome::Echo(s)) => s,
        Err(e) => {
            tracing::debug!(expr, error = %e, "calc evaluation failed");
            ERROR_SENTINEL.to_string()
        }
    }
}

/// Integers print without a fractional part; everything else uses the
/// shortest round-trip form.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let n = raw
                    .parse::<f64>()
                    .map_err(|_| CalcError::InvalidNumber(raw.clone()))?;
                tokens.push(Token::Num(n));
                continue;
            }
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '%' => tokens.push(Token::Percent),
            '^' => tokens.push(Token::Pow),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            other => {
                return Err(CalcError::UnexpectedToken {
                    token: other.to_string(),
                    position: i,
                });
            }
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_indexed(&self) -> Option<(usize, &Token)> {
        self.peek().map(|t| (self.pos, t))
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn descend(&mut self) -> Result<(), CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        Ok(())
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    acc += self.term()?;
                }
                Token::Minus => {
                    self.pos += 1;
                    acc -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    acc *= self.unary()?;
                }
                Token::Slash => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    acc /= rhs;
                }
                Token::Percent => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(CalcError::DivisionByZero);
                    }
                    acc -= rhs * (acc / rhs).floor();
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let v = -self.unary()?;
                self.depth -= 1;
                Ok(v)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.descend()?;
                let v = self.unary()?;
                self.depth -= 1;
                Ok(v)
            }
            _ => self.power(),
        }
    }

    // power := primary ('^' unary)?
    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if let Some(Token::Pow) = self.peek() {
            self.pos += 1;
            self.descend()?;
            let exp = self.unary()?;
            self.depth -= 1;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    // primary := number | '(' expr ')'
    fn primary(&mut self) -> Result<f64, CalcError> {
        let position = self.pos;
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                self.descend()?;
                let v = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(v),
                    Some(other) => Err(CalcError::UnexpectedToken {
                        token: format!("{other:?}"),
                        position: self.pos - 1,
                    }),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(other) => Err(CalcError::UnexpectedToken {
                token: format!("{other:?}"),
                position,
            }),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_arithmetic() {
        assert_eq!(calc_reply("2 + 2"), "4");
        assert_eq!(calc_reply("2 ^ 3"), "8");
        assert_eq!(calc_reply("2 ** 3"), "8");
        assert_eq!(calc_reply("7 / 2"), "3.5");
        assert_eq!(calc_reply("(1 + 2) * 3"), "9");
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(calc_reply("2 + 3 * 4"), "14");
        assert_eq!(calc_reply("2 ^ 3 ^ 2"), "512");
        assert_eq!(calc_reply("-2 ^ 2"), "-4");
        assert_eq!(calc_reply("2 ^ -1"), "0.5");
        assert_eq!(calc_reply("10 - 4 - 3"), "3");
    }

    #[test]
    fn modulo_takes_divisor_sign() {
        assert_eq!(calc_reply("7 % 3"), "1");
        assert_eq!(calc_reply("-7 % 3"), "2");
        assert_eq!(calc_reply("7 % -3"), "-2");
    }

    #[test]
    fn letters_echo_tokens() {
        assert_eq!(calc_reply("abc + def"), "abc + def");
        assert_eq!(calc_reply("  sqrt(2)   *  x "), "sqrt(2) * x");
        assert_eq!(evaluate("1 + a").unwrap(), CalcOutcome::Echo("1 + a".into()));
    }

    #[test]
    fn failures_become_error_sentinel() {
        assert_eq!(calc_reply("1 / 0"), ERROR_SENTINEL);
        assert_eq!(calc_reply("5 % 0"), ERROR_SENTINEL);
        assert_eq!(calc_reply("2 +"), ERROR_SENTINEL);
        assert_eq!(calc_reply("(1 + 2"), ERROR_SENTINEL);
        assert_eq!(calc_reply("1 2"), ERROR_SENTINEL);
        assert_eq!(calc_reply(""), ERROR_SENTINEL);
        assert_eq!(calc_reply("1.2.3"), ERROR_SENTINEL);
        assert_eq!(calc_reply("10 ^ 1000"), ERROR_SENTINEL);
    }

    #[test]
    fn error_kinds() {
        assert_eq!(evaluate(""), Err(CalcError::Empty));
        assert_eq!(evaluate("1 / 0"), Err(CalcError::DivisionByZero));
        assert_eq!(evaluate("(1"), Err(CalcError::UnexpectedEnd));
        assert!(matches!(
            evaluate(")"),
            Err(CalcError::UnexpectedToken { position: 0, .. })
        ));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&deep), Err(CalcError::TooDeep));
        let unary = format!("{}1", "-".repeat(200));
        assert_eq!(evaluate(&unary), Err(CalcError::TooDeep));
    }

    #[test]
    fn decimals() {
        assert_eq!(calc_reply(".5 + .25"), "0.75");
        assert_eq!(calc_reply("0.1 * 3"), format!("{}", 0.1 * 3.0));
    }

    #[test]
    fn format_number_handles_integers_and_negative_zero() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1e20), "100000000000000000000");
    }
}
