//! Label selector text parsing.
//!
//! Selectors are kube's own [`Selector`]; this module only turns user-typed
//! text into one.

use std::collections::BTreeSet;

pub use kube::core::{Expression, Selector, SelectorExt};

/// Parse selector text such as `app=nginx,tier!=db,release,!canary`.
///
/// Set-based terms `env in (prod,staging)` and `env notin (dev)` are accepted
/// too. Blank terms are skipped; `==` is a synonym of `=`. Blank text parses to
/// the selector matching everything.
pub fn parse(text: &str) -> Selector {
    terms(text).into_iter().map(expression).collect()
}

/// Splits on commas outside of parentheses.
fn terms(text: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let (mut depth, mut start) = (0usize, 0usize);
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&text[start..]);
    terms
        .into_iter()
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .collect()
}

fn expression(term: &str) -> Expression {
    if let Some((key, values)) = set_term(term, " notin ") {
        return Expression::NotIn(key, values);
    }
    if let Some((key, values)) = set_term(term, " in ") {
        return Expression::In(key, values);
    }
    if let Some((key, value)) = term.split_once("!=") {
        Expression::NotEqual(key.trim().into(), value.trim().into())
    } else if let Some((key, value)) = term.split_once("==") {
        Expression::Equal(key.trim().into(), value.trim().into())
    } else if let Some((key, value)) = term.split_once('=') {
        Expression::Equal(key.trim().into(), value.trim().into())
    } else if let Some(key) = term.strip_prefix('!') {
        Expression::DoesNotExist(key.trim().into())
    } else {
        Expression::Exists(term.into())
    }
}

fn set_term(term: &str, op: &str) -> Option<(String, BTreeSet<String>)> {
    let (key, rest) = term.split_once(op)?;
    let values = rest
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')?
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    Some((key.trim().to_string(), values))
}
