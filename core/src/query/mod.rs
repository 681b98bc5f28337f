//! The structured query language: `#OP(arg ...)` in prefix notation.
//!
//! Parsing produces a [`QueryNode`] tree which is optimized and then compiled
//! into an arena-backed [`QueryTree`] for document-at-a-time evaluation.

pub mod iop;
pub mod parser;
pub mod sop;
pub mod tree;

use crate::index::Field;
use std::fmt;

pub use parser::{optimize, parse, parse_query};
pub use tree::{NodeId, QueryTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Or,
    And,
    Sum,
    WAnd,
    WSum,
    Syn,
    Near(u32),
    Window(u32),
}

impl Operator {
    /// Map an operator token such as `#NEAR/3` to its kind. Names are case-insensitive.
    pub fn from_token(token: &str) -> Option<Operator> {
        let lower = token.trim().to_ascii_lowercase();
        let (name, distance) = match lower.split_once('/') {
            Some((name, d)) => (name.to_string(), Some(d.trim().parse::<u32>().ok()?)),
            None => (lower, None),
        };
        let op = match (name.as_str(), distance) {
            ("#or", None) => Operator::Or,
            ("#and", None) => Operator::And,
            ("#sum", None) => Operator::Sum,
            ("#wand", None) => Operator::WAnd,
            ("#wsum", None) => Operator::WSum,
            ("#syn", None) => Operator::Syn,
            ("#near", Some(d)) => Operator::Near(d),
            ("#window", Some(d)) => Operator::Window(d),
            _ => return None,
        };
        Some(op)
    }

    pub fn name(self) -> &'static str {
        match self {
            Operator::Or => "#or",
            Operator::And => "#and",
            Operator::Sum => "#sum",
            Operator::WAnd => "#wand",
            Operator::WSum => "#wsum",
            Operator::Syn => "#syn",
            Operator::Near(_) => "#near",
            Operator::Window(_) => "#window",
        }
    }

    /// Posting operators synthesize an inverted list; the rest combine scores.
    pub fn is_posting(self) -> bool {
        matches!(self, Operator::Syn | Operator::Near(_) | Operator::Window(_))
    }

    pub fn is_weighted(self) -> bool {
        matches!(self, Operator::WAnd | Operator::WSum)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Near(d) | Operator::Window(d) => write!(f, "{}/{}", self.name(), d),
            _ => f.write_str(self.name()),
        }
    }
}

/// Parsed query before compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Term { term: String, field: Field },
    Op { op: Operator, args: Vec<QueryNode>, weights: Vec<f64> },
}

impl QueryNode {
    pub fn term(term: &str, field: Field) -> Self {
        QueryNode::Term { term: term.to_string(), field }
    }

    pub fn is_posting(&self) -> bool {
        match self {
            QueryNode::Term { .. } => true,
            QueryNode::Op { op, .. } => op.is_posting(),
        }
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Term { term, field } => write!(f, "{term}.{field}"),
            QueryNode::Op { op, args, weights } => {
                write!(f, "{op}(")?;
                for (i, arg) in args.iter().enumerate() {
                    match weights.get(i) {
                        Some(w) => write!(f, " {w} {arg}")?,
                        None => write!(f, " {arg}")?,
                    }
                }
                f.write_str(" )")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_tokens() {
        assert_eq!(Operator::from_token("#NEAR/2"), Some(Operator::Near(2)));
        assert_eq!(Operator::from_token("#Window/10"), Some(Operator::Window(10)));
        assert_eq!(Operator::from_token("#wand"), Some(Operator::WAnd));
        assert_eq!(Operator::from_token("#near"), None);
        assert_eq!(Operator::from_token("#near/x"), None);
        assert_eq!(Operator::from_token("#and/2"), None);
        assert_eq!(Operator::from_token("#phrase"), None);
    }

    #[test]
    fn display_round_trips_structure() {
        let q = QueryNode::Op {
            op: Operator::WAnd,
            args: vec![QueryNode::term("appl", Field::Body), QueryNode::term("pie", Field::Title)],
            weights: vec![0.7, 0.3],
        };
        assert_eq!(q.to_string(), "#wand( 0.7 appl.body 0.3 pie.title )");
    }
}
