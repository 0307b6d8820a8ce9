//! Recursive-descent parser for filter expressions
//!
//! ```text
//! expr      := or
//! or        := and (("or" | "||") and)*
//! and       := unary (("and" | "&&") unary)*
//! unary     := ("not" | "!") unary | primary
//! primary   := "(" expr ")" | predicate
//! predicate := field cmp literal
//!            | field ["not"] "in" "[" [literal ("," literal)*] "]"
//!            | field "exists"
//! ```

use super::lexer::{syntax, tokenize, Spanned, Token};
use super::{Field, FilterExpr};
use quiver_core::{MetadataValue, Result};

/// Maximum nesting of parentheses and negations
pub const MAX_DEPTH: usize = 128;

pub(crate) fn parse(input: &str) -> Result<FilterExpr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(FilterExpr::All);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some((tok, at)) = parser.peek_spanned() {
        return Err(syntax(at, format!("unexpected {}", describe(tok))));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_spanned(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, at)| (t, *at))
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, at)| *at).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        match self.peek() {
            Some(tok) if *tok == expected => {
                self.pos += 1;
                Ok(())
            }
            found => Err(syntax(
                self.position(),
                format!("expected {}, found {}", what, describe_opt(found)),
            )),
        }
    }

    fn enter(&mut self, at: usize) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax(at, "nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    // Chains are collected flat so their length never adds nesting
    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut terms = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            terms.push(self.parse_and()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => FilterExpr::Or(terms),
        })
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut terms = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            terms.push(self.parse_unary()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => FilterExpr::And(terms),
        })
    }

    fn parse_unary(&mut self) -> Result<FilterExpr> {
        if self.peek() == Some(&Token::Not) {
            self.enter(self.position())?;
            self.pos += 1;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(FilterExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterExpr> {
        let at = self.position();
        match self.advance() {
            Some(Token::LParen) => {
                self.enter(at)?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_predicate(Field::from_name(&name)),
            other => Err(syntax(
                at,
                format!("expected field name or '(', found {}", describe_opt(other.as_ref())),
            )),
        }
    }

    fn parse_predicate(&mut self, field: Field) -> Result<FilterExpr> {
        let at = self.position();
        match self.advance() {
            Some(Token::Cmp(op)) => {
                let value = self.parse_literal()?;
                Ok(FilterExpr::Compare { field, op, value })
            }
            Some(Token::In) => Ok(FilterExpr::In {
                field,
                values: self.parse_list()?,
                negated: false,
            }),
            Some(Token::Not) => {
                self.expect(Token::In, "'in' after 'not'")?;
                Ok(FilterExpr::In {
                    field,
                    values: self.parse_list()?,
                    negated: true,
                })
            }
            Some(Token::Exists) => Ok(FilterExpr::Exists(field)),
            other => Err(syntax(
                at,
                format!(
                    "expected comparison, 'in' or 'exists', found {}",
                    describe_opt(other.as_ref())
                ),
            )),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<MetadataValue>> {
        self.expect(Token::LBracket, "'['")?;
        let mut values = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(values);
        }
        loop {
            values.push(self.parse_literal()?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RBracket) => {
                    self.pos += 1;
                    return Ok(values);
                }
                found => {
                    return Err(syntax(
                        self.position(),
                        format!("expected ',' or ']', found {}", describe_opt(found)),
                    ))
                }
            }
        }
    }

    fn parse_literal(&mut self) -> Result<MetadataValue> {
        let at = self.position();
        match self.advance() {
            Some(Token::Str(s)) => Ok(MetadataValue::String(s)),
            Some(Token::Int(i)) => Ok(MetadataValue::Int(i)),
            Some(Token::Float(f)) => Ok(MetadataValue::Float(f)),
            Some(Token::True) => Ok(MetadataValue::Bool(true)),
            Some(Token::False) => Ok(MetadataValue::Bool(false)),
            other => Err(syntax(
                at,
                format!("expected literal, found {}", describe_opt(other.as_ref())),
            )),
        }
    }
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Str(s) => format!("string {:?}", s),
        Token::Int(i) => format!("number {}", i),
        Token::Float(f) => format!("number {}", f),
        Token::True => "'true'".into(),
        Token::False => "'false'".into(),
        Token::And => "'and'".into(),
        Token::Or => "'or'".into(),
        Token::Not => "'not'".into(),
        Token::In => "'in'".into(),
        Token::Exists => "'exists'".into(),
        Token::Cmp(_) => "comparison operator".into(),
        Token::LParen => "'('".into(),
        Token::RParen => "')'".into(),
        Token::LBracket => "'['".into(),
        Token::RBracket => "']'".into(),
        Token::Comma => "','".into(),
    }
}

fn describe_opt(tok: Option<&Token>) -> String {
    tok.map(describe).unwrap_or_else(|| "end of input".to_string())
}
