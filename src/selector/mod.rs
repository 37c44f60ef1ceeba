//! # Label Selector Engine
//!
//! A small boolean predicate language over string labels:
//!
//! ```text
//! env = prod and (tier = web or tier in (api, edge)) and not canary exists
//! ```
//!
//! Predicates: `key = v`, `key == v`, `key != v`, `key in (a, b)`,
//! `key notin {a, b}`, `key exists` (or bare `key`), `key !exists` (or
//! `!key`). Combinators: `not`/`!`, `and`/`&&`/`,`, `or`/`||`, parentheses.
//! Keywords are case-insensitive and values may be double-quoted.
//!
//! A [`LabelSelector`] is parsed once and can be evaluated against any
//! number of [`LabelSource`]s.

pub mod ast;
pub mod error;
pub mod parser;

pub use ast::Expression;
pub use error::{SelectorResult, SelectorSyntaxError};

use crate::log_selector_debug;
use crate::sample::Sample;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Anything a selector can be evaluated against.
pub trait LabelSource {
    fn label(&self, key: &str) -> Option<&str>;
}

impl<K> LabelSource for HashMap<K, String>
where
    K: Borrow<str> + Hash + Eq,
{
    fn label(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl<K> LabelSource for BTreeMap<K, String>
where
    K: Borrow<str> + Ord,
{
    fn label(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

/// Samples expose `label`, `success` (`true`/`false`) and `code` when the
/// log carries response codes.
impl LabelSource for Sample {
    fn label(&self, key: &str) -> Option<&str> {
        match key {
            "label" => Some(self.label.as_str()),
            "success" => Some(if self.success { "true" } else { "false" }),
            "code" => self.response_code.as_deref(),
            _ => None,
        }
    }
}

/// A parsed, reusable selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    expression: Expression,
}

impl LabelSelector {
    /// Parse selector text. Nothing is evaluated if this fails.
    pub fn parse(text: &str) -> SelectorResult<Self> {
        let expression = parser::parse_expression(text)?;
        log_selector_debug!("Parsed selector '{}' as '{}'", text, expression);
        Ok(Self { expression })
    }

    /// A selector matching everything that has `key`.
    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            expression: Expression::Exists(key.into()),
        }
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// The empty selector matches nothing.
    pub fn is_empty(&self) -> bool {
        self.expression == Expression::Nothing
    }

    pub fn matches<S: LabelSource + ?Sized>(&self, labels: &S) -> bool {
        self.expression.evaluate(labels)
    }
}

impl From<Expression> for LabelSelector {
    fn from(expression: Expression) -> Self {
        Self { expression }
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}
