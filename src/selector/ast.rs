//! Parsed selector expressions.

use super::LabelSource;
use std::collections::BTreeSet;
use std::fmt;

/// A parsed selector expression.
///
/// `and`/`or` are binary and left-associative, mirroring how the text was
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// The empty selector; matches nothing
    Nothing,
    Equals { key: String, value: String },
    /// False when the key is absent
    NotEquals { key: String, value: String },
    In { key: String, values: BTreeSet<String> },
    /// False when the key is absent
    NotIn { key: String, values: BTreeSet<String> },
    Exists(String),
    NotExists(String),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    pub fn evaluate<S: LabelSource + ?Sized>(&self, labels: &S) -> bool {
        match self {
            Expression::Nothing => false,
            Expression::Equals { key, value } => labels.label(key) == Some(value.as_str()),
            Expression::NotEquals { key, value } => {
                labels.label(key).map_or(false, |v| v != value)
            }
            Expression::In { key, values } => {
                labels.label(key).map_or(false, |v| values.contains(v))
            }
            Expression::NotIn { key, values } => {
                labels.label(key).map_or(false, |v| !values.contains(v))
            }
            Expression::Exists(key) => labels.label(key).is_some(),
            Expression::NotExists(key) => labels.label(key).is_none(),
            Expression::And(left, right) => left.evaluate(labels) && right.evaluate(labels),
            Expression::Or(left, right) => left.evaluate(labels) || right.evaluate(labels),
            Expression::Not(inner) => !inner.evaluate(labels),
        }
    }

    /// Every label key the expression mentions.
    pub fn keys(&self) -> BTreeSet<&str> {
        let mut keys = BTreeSet::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut BTreeSet<&'a str>) {
        match self {
            Expression::Nothing => {}
            Expression::Equals { key, .. }
            | Expression::NotEquals { key, .. }
            | Expression::In { key, .. }
            | Expression::NotIn { key, .. }
            | Expression::Exists(key)
            | Expression::NotExists(key) => {
                keys.insert(key.as_str());
            }
            Expression::And(left, right) | Expression::Or(left, right) => {
                left.collect_keys(keys);
                right.collect_keys(keys);
            }
            Expression::Not(inner) => inner.collect_keys(keys),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Or(..) => 1,
            Expression::And(..) => 2,
            Expression::Not(..) => 3,
            _ => 4,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        if self.precedence() < parent {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | ':' | '*'))
}

fn fmt_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    if needs_quotes(value) {
        write!(f, "\"")?;
        for c in value.chars() {
            if c == '"' || c == '\\' {
                write!(f, "\\")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "\"")
    } else {
        write!(f, "{}", value)
    }
}

fn fmt_set(f: &mut fmt::Formatter<'_>, values: &BTreeSet<String>) -> fmt::Result {
    write!(f, "(")?;
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        fmt_value(f, value)?;
    }
    write!(f, ")")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Nothing => Ok(()),
            Expression::Equals { key, value } => {
                write!(f, "{} = ", key)?;
                fmt_value(f, value)
            }
            Expression::NotEquals { key, value } => {
                write!(f, "{} != ", key)?;
                fmt_value(f, value)
            }
            Expression::In { key, values } => {
                write!(f, "{} in ", key)?;
                fmt_set(f, values)
            }
            Expression::NotIn { key, values } => {
                write!(f, "{} notin ", key)?;
                fmt_set(f, values)
            }
            Expression::Exists(key) => write!(f, "{} exists", key),
            Expression::NotExists(key) => write!(f, "{} !exists", key),
            Expression::And(left, right) => {
                left.fmt_operand(f, 2)?;
                write!(f, " and ")?;
                right.fmt_operand(f, 3)
            }
            Expression::Or(left, right) => {
                left.fmt_operand(f, 1)?;
                write!(f, " or ")?;
                right.fmt_operand(f, 2)
            }
            Expression::Not(inner) => {
                write!(f, "not ")?;
                inner.fmt_operand(f, 4)
            }
        }
    }
}
