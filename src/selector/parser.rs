//! PEST parser for label selector text.
//!
//! Converts selector text into an [`Expression`] tree. Any parse failure is
//! reported as a [`SelectorSyntaxError`] carrying the byte offset pest
//! stopped at.

use super::ast::Expression;
use super::error::{SelectorResult, SelectorSyntaxError};
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::collections::BTreeSet;

/// Parser for the label selector language.
#[derive(Parser)]
#[grammar = "selector/selector.pest"]
pub struct SelectorParser;

/// Parse selector text into an expression tree.
pub fn parse_expression(input: &str) -> SelectorResult<Expression> {
    let mut pairs = SelectorParser::parse(Rule::selector, input).map_err(syntax_error)?;
    let selector = pairs
        .next()
        .ok_or_else(|| SelectorSyntaxError::new(0, "empty parse result"))?;

    match selector.into_inner().find(|p| p.as_rule() == Rule::expr) {
        Some(expr) => build_expr(expr),
        None => Ok(Expression::Nothing),
    }
}

fn syntax_error(error: pest::error::Error<Rule>) -> SelectorSyntaxError {
    let position = match error.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let error = error.renamed_rules(|rule| rule_name(rule).to_string());
    SelectorSyntaxError::new(position, error.variant.message())
}

fn rule_name(rule: &Rule) -> &'static str {
    match rule {
        Rule::EOI => "end of input",
        Rule::expr | Rule::and_expr | Rule::unary => "expression",
        Rule::not_op | Rule::kw_not | Rule::bang_not => "`not`",
        Rule::and_op => "`and`",
        Rule::or_op => "`or`",
        Rule::eq_op => "`=`",
        Rule::kw_in => "`in`",
        Rule::kw_notin => "`notin`",
        Rule::kw_exists => "`exists`",
        Rule::kw_not_exists => "`!exists`",
        Rule::key => "label key",
        Rule::value | Rule::bare | Rule::quoted | Rule::quoted_inner => "value",
        Rule::value_set => "value set",
        Rule::in_pred
        | Rule::notin_pred
        | Rule::eq_pred
        | Rule::neq_pred
        | Rule::not_exists_pred
        | Rule::exists_pred => "predicate",
        _ => "token",
    }
}

fn unexpected(pair: &Pair<Rule>) -> SelectorSyntaxError {
    SelectorSyntaxError::new(
        pair.as_span().start(),
        format!("unexpected {:?}", pair.as_rule()),
    )
}

fn missing(pair_start: usize, what: &str) -> SelectorSyntaxError {
    SelectorSyntaxError::new(pair_start, format!("missing {}", what))
}

/// `and_expr (or and_expr)*`, folded left to right.
fn build_expr(pair: Pair<Rule>) -> SelectorResult<Expression> {
    let start = pair.as_span().start();
    let mut operands = pair.into_inner().filter(|p| p.as_rule() == Rule::and_expr);
    let first = operands.next().ok_or_else(|| missing(start, "operand"))?;
    let mut expr = build_and(first)?;
    for operand in operands {
        expr = Expression::Or(Box::new(expr), Box::new(build_and(operand)?));
    }
    Ok(expr)
}

fn build_and(pair: Pair<Rule>) -> SelectorResult<Expression> {
    let start = pair.as_span().start();
    let mut operands = pair.into_inner().filter(|p| p.as_rule() == Rule::unary);
    let first = operands.next().ok_or_else(|| missing(start, "operand"))?;
    let mut expr = build_unary(first)?;
    for operand in operands {
        expr = Expression::And(Box::new(expr), Box::new(build_unary(operand)?));
    }
    Ok(expr)
}

fn build_unary(pair: Pair<Rule>) -> SelectorResult<Expression> {
    let start = pair.as_span().start();
    let mut negations = 0usize;
    let mut operand = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::not_op => negations += 1,
            _ => operand = Some(build_primary(inner)?),
        }
    }
    let mut expr = operand.ok_or_else(|| missing(start, "operand"))?;
    for _ in 0..negations {
        expr = Expression::Not(Box::new(expr));
    }
    Ok(expr)
}

fn build_primary(pair: Pair<Rule>) -> SelectorResult<Expression> {
    let rule = pair.as_rule();
    if rule == Rule::expr {
        return build_expr(pair);
    }

    let start = pair.as_span().start();
    let mut key = None;
    let mut value = None;
    let mut values = None;
    for inner in pair.clone().into_inner() {
        match inner.as_rule() {
            Rule::key => key = Some(inner.as_str().to_string()),
            Rule::value => value = Some(build_value(inner)?),
            Rule::value_set => values = Some(build_value_set(inner)?),
            _ => {}
        }
    }
    let key = key.ok_or_else(|| missing(start, "label key"))?;

    match rule {
        Rule::eq_pred => Ok(Expression::Equals {
            key,
            value: value.ok_or_else(|| missing(start, "value"))?,
        }),
        Rule::neq_pred => Ok(Expression::NotEquals {
            key,
            value: value.ok_or_else(|| missing(start, "value"))?,
        }),
        Rule::in_pred => Ok(Expression::In {
            key,
            values: values.ok_or_else(|| missing(start, "value set"))?,
        }),
        Rule::notin_pred => Ok(Expression::NotIn {
            key,
            values: values.ok_or_else(|| missing(start, "value set"))?,
        }),
        Rule::exists_pred => Ok(Expression::Exists(key)),
        Rule::not_exists_pred => Ok(Expression::NotExists(key)),
        _ => Err(unexpected(&pair)),
    }
}

fn build_value(pair: Pair<Rule>) -> SelectorResult<String> {
    let start = pair.as_span().start();
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| missing(start, "value"))?;
    match inner.as_rule() {
        Rule::bare => Ok(inner.as_str().to_string()),
        Rule::quoted => Ok(inner
            .into_inner()
            .next()
            .map(|p| unescape(p.as_str()))
            .unwrap_or_default()),
        _ => Err(unexpected(&inner)),
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '"' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn build_value_set(pair: Pair<Rule>) -> SelectorResult<BTreeSet<String>> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::value)
        .map(build_value)
        .collect()
}
