//! Metadata filter expressions
//!
//! Filters are parsed once, before any record is scanned, so a malformed
//! expression fails with [`Error::InvalidFilterSyntax`] and never a partial
//! result.
//!
//! ## Semantics
//!
//! - `id` addresses the record identifier; every other name addresses a
//!   metadata field.
//! - A predicate on a missing field is false (`not` of it is true).
//! - Ordering comparisons between incompatible types are false. Equality
//!   treats them as unequal, so `!=` and `not in` hold for them.
//! - Integers and floats compare numerically.
//! - An empty expression matches everything.
//!
//! [`Error::InvalidFilterSyntax`]: quiver_core::Error::InvalidFilterSyntax

mod lexer;
mod parser;

pub use lexer::CmpOp;
pub use parser::MAX_DEPTH;

use quiver_core::{MetadataValue, Result, VectorRecord};
use std::cmp::Ordering;

/// Field addressed by a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// The record identifier
    Id,
    /// A metadata key
    Meta(String),
}

impl Field {
    fn from_name(name: &str) -> Self {
        if name == "id" {
            Field::Id
        } else {
            Field::Meta(name.to_string())
        }
    }
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// Matches every record
    All,
    /// Every term matches
    And(Vec<FilterExpr>),
    /// At least one term matches
    Or(Vec<FilterExpr>),
    /// Inner expression does not match
    Not(Box<FilterExpr>),
    /// `field op literal`
    Compare {
        /// Field
        field: Field,
        /// Operator
        op: CmpOp,
        /// Literal operand
        value: MetadataValue,
    },
    /// `field [not] in [..]`
    In {
        /// Field
        field: Field,
        /// Candidate values
        values: Vec<MetadataValue>,
        /// `not in`
        negated: bool,
    },
    /// `field exists`
    Exists(Field),
}

enum Lookup<'a> {
    Id(&'a str),
    Value(&'a MetadataValue),
}

impl Lookup<'_> {
    fn compare(&self, literal: &MetadataValue) -> Option<Ordering> {
        match self {
            Lookup::Id(id) => literal.as_str().map(|s| (*id).cmp(s)),
            Lookup::Value(v) => v.compare(literal),
        }
    }

    fn equals(&self, literal: &MetadataValue) -> bool {
        self.compare(literal) == Some(Ordering::Equal)
    }
}

impl FilterExpr {
    /// Parse a filter expression
    ///
    /// # Errors
    /// `InvalidFilterSyntax` with the byte offset of the offending token.
    pub fn parse(input: &str) -> Result<Self> {
        parser::parse(input)
    }

    /// Parse an optional filter; `None` and blank strings yield `None`
    pub fn parse_optional(input: Option<&str>) -> Result<Option<Self>> {
        match input {
            Some(s) if !s.trim().is_empty() => Self::parse(s).map(Some),
            _ => Ok(None),
        }
    }

    /// Whether this expression matches everything
    pub fn is_all(&self) -> bool {
        matches!(self, FilterExpr::All)
    }

    /// Evaluate against a record
    pub fn matches(&self, record: &VectorRecord) -> bool {
        match self {
            FilterExpr::All => true,
            FilterExpr::And(terms) => terms.iter().all(|t| t.matches(record)),
            FilterExpr::Or(terms) => terms.iter().any(|t| t.matches(record)),
            FilterExpr::Not(inner) => !inner.matches(record),
            FilterExpr::Exists(field) => lookup(field, record).is_some(),
            FilterExpr::Compare { field, op, value } => {
                let Some(found) = lookup(field, record) else {
                    return false;
                };
                match op {
                    CmpOp::Eq => found.equals(value),
                    CmpOp::Ne => !found.equals(value),
                    CmpOp::Lt => found.compare(value) == Some(Ordering::Less),
                    CmpOp::Le => matches!(
                        found.compare(value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    CmpOp::Gt => found.compare(value) == Some(Ordering::Greater),
                    CmpOp::Ge => matches!(
                        found.compare(value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                }
            }
            FilterExpr::In {
                field,
                values,
                negated,
            } => {
                let Some(found) = lookup(field, record) else {
                    return false;
                };
                values.iter().any(|v| found.equals(v)) != *negated
            }
        }
    }
}

fn lookup<'a>(field: &Field, record: &'a VectorRecord) -> Option<Lookup<'a>> {
    match field {
        Field::Id => Some(Lookup::Id(&record.id)),
        Field::Meta(key) => record.metadata.get(key).map(Lookup::Value),
    }
}
