use super::{Operator, QueryNode};
use crate::error::{QueryError, Result};
use crate::index::Field;
use crate::tokenizer::analyze;

/// Parse and optimize a query string. `Ok(None)` means every argument was
/// stripped (for example a proximity operator over stopwords only).
pub fn parse_query(query: &str, default_field: Field) -> Result<Option<QueryNode>> {
    let parsed = parse(query, default_field)?;
    let optimized = optimize(parsed);
    match &optimized {
        Some(q) => tracing::debug!(query = %q, "optimized query"),
        None => tracing::debug!(raw = query, "query optimized away"),
    }
    Ok(optimized)
}

/// Exact parse of a fully parenthesized query such as `#and(#near/2(a b) c.title)`.
pub fn parse(query: &str, default_field: Field) -> Result<QueryNode> {
    let query = query.trim();
    let opens = query.matches('(').count();
    if opens == 0
        || opens != query.matches(')').count()
        || balancing_paren(query) != Some(query.len() - 1)
    {
        return Err(QueryError::syntax(format!("missing, unbalanced, or misplaced parentheses in {query:?}")));
    }

    let (head, rest) = query.split_once('(').unwrap_or((query, ""));
    let op = Operator::from_token(head)
        .ok_or_else(|| QueryError::syntax(format!("unknown query operator {:?}", head.trim())))?;
    let mut remaining = rest[..rest.rfind(')').unwrap_or(rest.len())].trim();

    let mut args = Vec::new();
    let mut weights = Vec::new();
    while !remaining.is_empty() {
        let weight = if op.is_weighted() {
            let (token, rest) = pop_term(remaining);
            remaining = rest;
            if remaining.is_empty() {
                return Err(QueryError::syntax(format!("{op} weight {token:?} has no argument")));
            }
            Some(parse_weight(token)?)
        } else {
            None
        };

        let produced = if remaining.starts_with('#') {
            let (sub, rest) = pop_subquery(remaining);
            remaining = rest;
            vec![parse(sub, default_field)?]
        } else {
            let (token, rest) = pop_term(remaining);
            remaining = rest;
            create_terms(token, default_field)
        };

        if let Some(w) = weight {
            weights.extend(std::iter::repeat(w).take(produced.len()));
        }
        args.extend(produced);
    }
    Ok(QueryNode::Op { op, args, weights })
}

/// Remove degenerate nodes depth-first: empty operators disappear and
/// single-argument operators are replaced by their argument.
pub fn optimize(node: QueryNode) -> Option<QueryNode> {
    match node {
        QueryNode::Term { .. } => Some(node),
        QueryNode::Op { op, args, weights } => {
            let mut kept_args = Vec::with_capacity(args.len());
            let mut kept_weights = Vec::new();
            for (i, arg) in args.into_iter().enumerate() {
                if let Some(arg) = optimize(arg) {
                    kept_args.push(arg);
                    if let Some(&w) = weights.get(i) {
                        kept_weights.push(w);
                    }
                }
            }
            match kept_args.len() {
                0 => None,
                1 => kept_args.pop(),
                _ => Some(QueryNode::Op { op, args: kept_args, weights: kept_weights }),
            }
        }
    }
}

fn parse_weight(token: &str) -> Result<f64> {
    match token.parse::<f64>() {
        Ok(w) if w.is_finite() && w > 0.0 => Ok(w),
        _ => Err(QueryError::syntax(format!("malformed weight {token:?}"))),
    }
}

/// Split `apple.title` into stems and a field. Only the text after the last
/// dot can name a field; an unknown suffix stays part of the term and the
/// default field applies.
fn create_terms(token: &str, default_field: Field) -> Vec<QueryNode> {
    let (text, field) = match token.rsplit_once('.') {
        Some((text, suffix)) => match Field::parse(suffix) {
            Some(field) => (text, field),
            None => (token, default_field),
        },
        None => (token, default_field),
    };
    analyze(text)
        .into_iter()
        .map(|stem| QueryNode::Term { term: stem, field })
        .collect()
}

/// Index of the parenthesis closing the left-most open one.
fn balancing_paren(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn pop_subquery(s: &str) -> (&str, &str) {
    // An unbalanced subquery is passed through whole; the recursive parse reports it.
    let end = balancing_paren(s).map_or(s.len(), |i| i + 1);
    (&s[..end], s[end..].trim_start())
}

fn pop_term(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim_start()),
        None => (s, ""),
    }
}
