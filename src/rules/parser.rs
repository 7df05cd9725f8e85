//! Lexer and recursive-descent parser for the audience rule language.
//!
//! The grammar is closed: literals, context field references, lists, dicts, comparison,
//! membership, and boolean operators. Rules compile to a small AST; there is no escape hatch into
//! a general-purpose interpreter, so rule text from configuration cannot execute arbitrary code.
use crate::{ContextValue, RuleSyntaxError};

/// Compiled rule expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(ContextValue),
    /// Dot-delimited context field reference.
    Field(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Minus,
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,
}

fn error(position: usize, message: impl Into<String>) -> RuleSyntaxError {
    RuleSyntaxError {
        position,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, RuleSyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            _ if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((pos, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((pos, Token::RParen));
            }
            '[' => {
                chars.next();
                tokens.push((pos, Token::LBracket));
            }
            ']' => {
                chars.next();
                tokens.push((pos, Token::RBracket));
            }
            '{' => {
                chars.next();
                tokens.push((pos, Token::LBrace));
            }
            '}' => {
                chars.next();
                tokens.push((pos, Token::RBrace));
            }
            ',' => {
                chars.next();
                tokens.push((pos, Token::Comma));
            }
            ':' => {
                chars.next();
                tokens.push((pos, Token::Colon));
            }
            '.' => {
                chars.next();
                tokens.push((pos, Token::Dot));
            }
            '-' => {
                chars.next();
                tokens.push((pos, Token::Minus));
            }
            '=' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push((pos, Token::EqEq));
                    }
                    _ => return Err(error(pos, "expected '==' (assignment is not supported)")),
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push((pos, Token::NotEq));
                    }
                    _ => return Err(error(pos, "expected '!='")),
                }
            }
            '<' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push((pos, Token::Lte));
                } else {
                    tokens.push((pos, Token::Lt));
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push((pos, Token::Gte));
                } else {
                    tokens.push((pos, Token::Gt));
                }
            }
            '"' | '\'' => {
                tokens.push((pos, Token::Str(lex_string(&mut chars, c)?)));
            }
            '0'..='9' => {
                tokens.push((pos, Token::Number(lex_number(&mut chars)?)));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(ident),
                };
                tokens.push((pos, token));
            }
            _ => return Err(error(pos, format!("unexpected character {c:?}"))),
        }
    }

    Ok(tokens)
}

fn lex_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
    quote: char,
) -> Result<String, RuleSyntaxError> {
    let (start, _) = chars.next().expect("caller peeked the opening quote");
    let mut value = String::new();

    loop {
        match chars.next() {
            Some((_, c)) if c == quote => return Ok(value),
            Some((pos, '\\')) => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, c @ ('\\' | '"' | '\''))) => value.push(c),
                Some((pos, c)) => return Err(error(pos, format!("unknown escape {c:?}"))),
                None => return Err(error(pos, "unterminated string")),
            },
            Some((_, c)) => value.push(c),
            None => return Err(error(start, "unterminated string")),
        }
    }
}

fn lex_number(
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
) -> Result<f64, RuleSyntaxError> {
    let mut text = String::new();
    let mut start = 0;

    if let Some(&(pos, _)) = chars.peek() {
        start = pos;
    }
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    // A fractional part requires a digit after the dot; otherwise the dot is left for the parser
    // (where it is a syntax error in this position).
    if let Some(&(_, '.')) = chars.peek() {
        let mut lookahead = chars.clone();
        lookahead.next();
        if matches!(lookahead.peek(), Some(&(_, c)) if c.is_ascii_digit()) {
            text.push('.');
            chars.next();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }

    text.parse()
        .map_err(|_| error(start, format!("invalid number literal {text:?}")))
}

pub(crate) fn parse(source: &str) -> Result<Expr, RuleSyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        end: source.len(),
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(error(parser.position(), "unexpected trailing input")),
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|&(pos, _)| pos)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.index).map(|(_, token)| token);
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), RuleSyntaxError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(error(self.position(), format!("expected {what}")))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, RuleSyntaxError> {
        let mut expr = self.parse_and()?;
        while self.eat(&Token::Or) {
            expr = Expr::Or(Box::new(expr), Box::new(self.parse_and()?));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, RuleSyntaxError> {
        let mut expr = self.parse_not()?;
        while self.eat(&Token::And) {
            expr = Expr::And(Box::new(expr), Box::new(self.parse_not()?));
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr, RuleSyntaxError> {
        if self.eat(&Token::Not) {
            Ok(Expr::Not(Box::new(self.parse_not()?)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, RuleSyntaxError> {
        let lhs = self.parse_primary()?;

        let op = match self.peek() {
            Some(Token::EqEq) => CompareOp::Eq,
            Some(Token::NotEq) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Lte) => CompareOp::Lte,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Gte) => CompareOp::Gte,
            Some(Token::In) => CompareOp::In,
            // `not` after an operand can only start `not in`.
            Some(Token::Not) => {
                self.index += 1;
                self.expect(&Token::In, "'in' after 'not'")?;
                let rhs = self.parse_primary()?;
                return Ok(Expr::Compare(CompareOp::NotIn, Box::new(lhs), Box::new(rhs)));
            }
            _ => return Ok(lhs),
        };
        self.index += 1;

        let rhs = self.parse_primary()?;
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_primary(&mut self) -> Result<Expr, RuleSyntaxError> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(error(position, "expected expression"));
        };

        match token.clone() {
            Token::LParen => {
                let expr = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => self.parse_list(),
            Token::LBrace => self.parse_dict(),
            Token::Str(s) => Ok(Expr::Literal(ContextValue::String(s))),
            Token::Number(n) => Ok(Expr::Literal(ContextValue::Number(n))),
            Token::Minus => {
                let position = self.position();
                match self.advance() {
                    Some(&Token::Number(n)) => Ok(Expr::Literal(ContextValue::Number(-n))),
                    _ => Err(error(position, "expected number after '-'")),
                }
            }
            Token::True => Ok(Expr::Literal(ContextValue::Boolean(true))),
            Token::False => Ok(Expr::Literal(ContextValue::Boolean(false))),
            Token::Null => Ok(Expr::Literal(ContextValue::Null)),
            Token::Ident(first) => {
                let mut path = first;
                while self.eat(&Token::Dot) {
                    let position = self.position();
                    match self.advance() {
                        Some(Token::Ident(segment)) => {
                            path.push('.');
                            path.push_str(segment);
                        }
                        _ => return Err(error(position, "expected field name after '.'")),
                    }
                }
                Ok(Expr::Field(path))
            }
            _ => Err(error(position, "expected expression")),
        }
    }

    fn parse_list(&mut self) -> Result<Expr, RuleSyntaxError> {
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.parse_or()?);
            if self.eat(&Token::Comma) {
                if self.eat(&Token::RBracket) {
                    return Ok(Expr::List(items));
                }
            } else {
                self.expect(&Token::RBracket, "']'")?;
                return Ok(Expr::List(items));
            }
        }
    }

    fn parse_dict(&mut self) -> Result<Expr, RuleSyntaxError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Dict(entries));
        }
        loop {
            let key = self.parse_or()?;
            self.expect(&Token::Colon, "':'")?;
            let value = self.parse_or()?;
            entries.push((key, value));
            if self.eat(&Token::Comma) {
                if self.eat(&Token::RBrace) {
                    return Ok(Expr::Dict(entries));
                }
            } else {
                self.expect(&Token::RBrace, "'}'")?;
                return Ok(Expr::Dict(entries));
            }
        }
    }
}
