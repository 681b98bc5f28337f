use super::iop::PostingNode;
use super::{Operator, QueryNode};
use crate::error::{QueryError, Result};
use crate::index::Field;

/// Index of a node in a [`QueryTree`] arena.
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringKind {
    And,
    Or,
    Sum,
    WAnd,
    WSum,
    /// Leaf wrapping exactly one posting operator.
    Score,
}

impl ScoringKind {
    pub fn name(self) -> &'static str {
        match self {
            ScoringKind::And => "#and",
            ScoringKind::Or => "#or",
            ScoringKind::Sum => "#sum",
            ScoringKind::WAnd => "#wand",
            ScoringKind::WSum => "#wsum",
            ScoringKind::Score => "#score",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoringNode {
    pub kind: ScoringKind,
    pub args: Vec<NodeId>,
    pub weights: Vec<f64>,
    pub weight_sum: f64,
}

#[derive(Debug, Clone)]
pub enum Node {
    Posting(PostingNode),
    Scoring(ScoringNode),
}

/// A compiled operator tree. Children always have smaller ids than their
/// parent, so ascending id order is a valid bottom-up evaluation order.
#[derive(Debug, Clone)]
pub struct QueryTree {
    pub(crate) nodes: Vec<Node>,
    root: NodeId,
}

impl QueryTree {
    /// Compile an optimized query. Posting arguments of scoring operators are
    /// wrapped in SCORE leaves, and so is a posting root.
    pub fn compile(query: &QueryNode) -> Result<QueryTree> {
        let mut tree = QueryTree { nodes: Vec::new(), root: 0 };
        let top = tree.push(query)?;
        tree.root = if query.is_posting() { tree.wrap_score(top) } else { top };
        Ok(tree)
    }

    pub fn root(&self) -> NodeId { self.root }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn node(&self, id: NodeId) -> &Node { &self.nodes[id] }

    pub(crate) fn posting(&self, id: NodeId) -> Option<&PostingNode> {
        match &self.nodes[id] {
            Node::Posting(p) => Some(p),
            Node::Scoring(_) => None,
        }
    }

    pub(crate) fn posting_mut(&mut self, id: NodeId) -> Option<&mut PostingNode> {
        match &mut self.nodes[id] {
            Node::Posting(p) => Some(p),
            Node::Scoring(_) => None,
        }
    }

    fn push(&mut self, query: &QueryNode) -> Result<NodeId> {
        let node = match query {
            QueryNode::Term { term, field } => Node::Posting(PostingNode::term(term, *field)),
            QueryNode::Op { op, args, weights } if op.is_posting() => {
                let mut ids = Vec::with_capacity(args.len());
                let mut field: Option<Field> = None;
                for arg in args {
                    if !arg.is_posting() {
                        return Err(QueryError::ScoringArgument { operator: op.name() });
                    }
                    let id = self.push(arg)?;
                    let arg_field = self.posting(id).map(|p| p.field);
                    match (field, arg_field) {
                        (Some(first), Some(other)) if first != other => {
                            return Err(QueryError::FieldMismatch {
                                operator: op.name(),
                                first: first.as_str(),
                                other: other.as_str(),
                            });
                        }
                        (None, f) => field = f,
                        _ => {}
                    }
                    ids.push(id);
                }
                debug_assert!(weights.is_empty());
                Node::Posting(PostingNode::operator(*op, field.unwrap_or(Field::Body), ids))
            }
            QueryNode::Op { op, args, weights } => {
                let kind = match op {
                    Operator::And => ScoringKind::And,
                    Operator::Or => ScoringKind::Or,
                    Operator::Sum => ScoringKind::Sum,
                    Operator::WAnd => ScoringKind::WAnd,
                    Operator::WSum => ScoringKind::WSum,
                    Operator::Syn | Operator::Near(_) | Operator::Window(_) => unreachable!("posting operators handled above"),
                };
                if op.is_weighted() && weights.len() != args.len() {
                    return Err(QueryError::syntax(format!(
                        "{op} has {} weights for {} arguments",
                        weights.len(),
                        args.len()
                    )));
                }
                let mut ids = Vec::with_capacity(args.len());
                for arg in args {
                    let id = self.push(arg)?;
                    ids.push(if arg.is_posting() { self.wrap_score(id) } else { id });
                }
                Node::Scoring(ScoringNode {
                    kind,
                    args: ids,
                    weights: weights.clone(),
                    weight_sum: weights.iter().sum(),
                })
            }
        };
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }

    fn wrap_score(&mut self, child: NodeId) -> NodeId {
        self.nodes.push(Node::Scoring(ScoringNode {
            kind: ScoringKind::Score,
            args: vec![child],
            weights: Vec::new(),
            weight_sum: 0.0,
        }));
        self.nodes.len() - 1
    }
}
