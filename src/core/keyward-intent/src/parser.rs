//! Tokenizer and recursive-descent parser for intent definitions.

use crate::error::IntentError;
use crate::expr::{CmpOp, Expr, Value};

/// Maximum nesting depth accepted by the parser.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Name(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Not,
    AndAnd,
    OrOr,
    Cmp(CmpOp),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

fn err(position: usize, message: impl Into<String>) -> IntentError {
    IntentError::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(src: &str) -> Result<Vec<Spanned>, IntentError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let two = |next: u8| bytes.get(i + 1) == Some(&next);

        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            },
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b',' => Token::Comma,
            b'.' => Token::Dot,
            b'&' if two(b'&') => {
                i += 1;
                Token::AndAnd
            },
            b'|' if two(b'|') => {
                i += 1;
                Token::OrOr
            },
            b'=' if two(b'=') => {
                i += 1;
                Token::Cmp(CmpOp::Eq)
            },
            b'!' if two(b'=') => {
                i += 1;
                Token::Cmp(CmpOp::Ne)
            },
            b'!' => Token::Not,
            b'<' if two(b'=') => {
                i += 1;
                Token::Cmp(CmpOp::Le)
            },
            b'<' => Token::Cmp(CmpOp::Lt),
            b'>' if two(b'=') => {
                i += 1;
                Token::Cmp(CmpOp::Ge)
            },
            b'>' => Token::Cmp(CmpOp::Gt),
            b'"' => {
                let (s, end) = lex_string(src, i)?;
                out.push(Spanned {
                    token: Token::Str(s),
                    pos: start,
                });
                i = end;
                continue;
            },
            b'-' | b'0'..=b'9' => {
                let mut end = i + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let text = &src[i..end];
                if text == "-" {
                    return Err(err(start, "expected digits after '-'"));
                }
                let n = text
                    .parse::<i64>()
                    .map_err(|_| err(start, format!("integer out of range: {text}")))?;
                out.push(Spanned {
                    token: Token::Int(n),
                    pos: start,
                });
                i = end;
                continue;
            },
            c if c == b'_' || c.is_ascii_alphabetic() => {
                let mut end = i + 1;
                while end < bytes.len() && (bytes[end] == b'_' || bytes[end].is_ascii_alphanumeric()) {
                    end += 1;
                }
                out.push(Spanned {
                    token: Token::Name(src[i..end].to_string()),
                    pos: start,
                });
                i = end;
                continue;
            },
            _ => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(err(start, format!("unexpected character '{ch}'")));
            },
        };
        out.push(Spanned { token, pos: start });
        i += 1;
    }

    Ok(out)
}

/// Lexes a double-quoted string starting at `start`; returns it and the
/// offset just past the closing quote.
fn lex_string(src: &str, start: usize) -> Result<(String, usize), IntentError> {
    let mut out = String::new();
    let mut chars = src[start + 1..].char_indices();
    while let Some((off, c)) = chars.next() {
        match c {
            '"' => return Ok((out, start + 1 + off + 1)),
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, 'n')) => out.push('\n'),
                Some((o, other)) => {
                    return Err(err(start + 1 + o, format!("unknown escape '\\{other}'")));
                },
                None => break,
            },
            c => out.push(c),
        }
    }
    Err(err(start, "unterminated string"))
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.pos).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token, what: &str) -> Result<(), IntentError> {
        let at = self.offset();
        match self.bump() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(err(at, format!("expected {what}, found {t:?}"))),
            None => Err(err(at, format!("expected {what}, found end of input"))),
        }
    }

    fn enter(&mut self) -> Result<(), IntentError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(err(self.offset(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, IntentError> {
        self.enter()?;
        let mut left = self.and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.bump();
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth -= 1;
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, IntentError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.bump();
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, IntentError> {
        if self.peek() == Some(&Token::Not) {
            self.bump();
            self.enter()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr, IntentError> {
        let left = self.primary()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.bump();
            let right = self.primary()?;
            return Ok(Expr::Compare(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, IntentError> {
        let at = self.offset();
        match self.bump() {
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            },
            Some(Token::LBracket) => self.list(),
            Some(Token::Name(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "all" if self.peek() == Some(&Token::LParen) => {
                    self.bump();
                    let list = self.expr()?;
                    self.expect(Token::RParen, "')'")?;
                    Ok(Expr::All(Box::new(list)))
                },
                "any" if self.peek() == Some(&Token::LParen) => {
                    self.bump();
                    let threshold = self.expr()?;
                    self.expect(Token::Comma, "','")?;
                    let list = self.expr()?;
                    self.expect(Token::RParen, "')'")?;
                    Ok(Expr::Any(Box::new(threshold), Box::new(list)))
                },
                _ if self.peek() == Some(&Token::LParen) => {
                    Err(err(at, format!("unknown function '{name}'")))
                },
                _ => self.ident(name),
            },
            Some(t) => Err(err(at, format!("unexpected token {t:?}"))),
            None => Err(err(at, "unexpected end of input")),
        }
    }

    fn ident(&mut self, first: String) -> Result<Expr, IntentError> {
        let mut path = first;
        while self.peek() == Some(&Token::Dot) {
            self.bump();
            let at = self.offset();
            match self.bump() {
                Some(Token::Name(part)) => {
                    path.push('.');
                    path.push_str(&part);
                },
                _ => return Err(err(at, "expected identifier after '.'")),
            }
        }
        Ok(Expr::Ident(path))
    }

    fn list(&mut self) -> Result<Expr, IntentError> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.bump();
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.expr()?);
            let at = self.offset();
            match self.bump() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => return Ok(Expr::List(items)),
                _ => return Err(err(at, "expected ',' or ']'")),
            }
        }
    }
}

/// Parses an intent definition into an expression tree.
pub fn parse(src: &str) -> Result<Expr, IntentError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(err(0, "empty intent definition"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
        depth: 0,
    };
    let expr = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(err(parser.offset(), "unexpected trailing input"));
    }
    Ok(expr)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Box<Expr> {
        Box::new(Expr::Ident(s.into()))
    }

    #[test]
    fn test_parse_any_over_owners() {
        let expr = parse("any(1, space.owners)").unwrap();
        assert_eq!(
            expr,
            Expr::Any(Box::new(Expr::Literal(Value::Int(1))), ident("space.owners"))
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a || b && c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(ident("a"), Box::new(Expr::And(ident("b"), ident("c"))))
        );
    }

    #[test]
    fn test_parse_comparison_and_negation() {
        let expr = parse("!(0xanalyzer.amount >= 10)");
        // identifiers cannot start with a digit
        assert!(expr.is_err());

        let expr = parse("!(tx.amount >= -10)").unwrap();
        assert_eq!(
            expr,
            Expr::Not(Box::new(Expr::Compare(
                CmpOp::Ge,
                ident("tx.amount"),
                Box::new(Expr::Literal(Value::Int(-10)))
            )))
        );
    }

    #[test]
    fn test_parse_list_literal() {
        let expr = parse(r#"all(["alice", "bob"])"#).unwrap();
        assert_eq!(
            expr,
            Expr::All(Box::new(Expr::List(vec![
                Expr::Literal(Value::Str("alice".into())),
                Expr::Literal(Value::Str("bob".into())),
            ])))
        );
        assert_eq!(parse("[]").unwrap(), Expr::List(vec![]));
    }

    #[test]
    fn test_parse_errors() {
        for src in ["", "all(", "any(1)", "a &&", "a & b", "\"open", "foo(1)", "a b", "a.", "[1,"] {
            match parse(src) {
                Err(IntentError::Parse { .. }) => {},
                other => panic!("{src:?} should not parse: {other:?}"),
            }
        }
    }

    #[test]
    fn test_error_position() {
        match parse("a && $") {
            Err(IntentError::Parse { position, .. }) => assert_eq!(position, 5),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_depth_limit() {
        let src = format!("{}true{}", "(".repeat(200), ")".repeat(200));
        assert!(parse(&src).is_err());
    }
}
