//! Posting operators: TERM, SYN, NEAR/k and WINDOW/k.
//!
//! Each operator is fully evaluated when the tree is initialized: its
//! arguments' lists are merged into a synthesized [`InvertedList`], which the
//! scoring layer then walks with a forward-only cursor.

use super::tree::{Node, NodeId, QueryTree};
use super::Operator;
use crate::error::{QueryError, Result};
use crate::index::{DocId, Field, Index, InvertedList, Posting};

#[derive(Debug, Clone, PartialEq)]
pub enum PostingKind {
    Term(String),
    Syn,
    Near(u32),
    Window(u32),
}

impl PostingKind {
    pub fn name(&self) -> &'static str {
        match self {
            PostingKind::Term(_) => "#term",
            PostingKind::Syn => "#syn",
            PostingKind::Near(_) => "#near",
            PostingKind::Window(_) => "#window",
        }
    }

    fn min_args(&self) -> usize {
        match self {
            PostingKind::Term(_) => 0,
            PostingKind::Syn => 1,
            PostingKind::Near(_) | PostingKind::Window(_) => 2,
        }
    }
}

/// Cursor over an operator's postings.
pub trait PostingIterator {
    fn has_match(&self) -> bool { self.current_doc_id().is_some() }
    fn current_doc_id(&self) -> Option<DocId>;
    fn current_posting(&self) -> Option<&Posting>;
    /// Move forward to the first posting with a doc id greater than `doc_id`.
    fn advance_past(&mut self, doc_id: DocId);
}

#[derive(Debug, Clone)]
pub struct PostingNode {
    pub kind: PostingKind,
    pub field: Field,
    pub args: Vec<NodeId>,
    pub list: InvertedList,
    pub cursor: usize,
}

impl PostingNode {
    pub fn term(term: &str, field: Field) -> Self {
        Self::new(PostingKind::Term(term.to_string()), field, Vec::new())
    }

    pub fn operator(op: Operator, field: Field, args: Vec<NodeId>) -> Self {
        let kind = match op {
            Operator::Near(k) => PostingKind::Near(k),
            Operator::Window(k) => PostingKind::Window(k),
            _ => PostingKind::Syn,
        };
        Self::new(kind, field, args)
    }

    fn new(kind: PostingKind, field: Field, args: Vec<NodeId>) -> Self {
        Self { kind, field, args, list: InvertedList::new(), cursor: 0 }
    }
}

impl PostingIterator for PostingNode {
    fn current_doc_id(&self) -> Option<DocId> {
        self.list.postings.get(self.cursor).map(|p| p.doc_id)
    }

    fn current_posting(&self) -> Option<&Posting> {
        self.list.postings.get(self.cursor)
    }

    fn advance_past(&mut self, doc_id: DocId) {
        while self.current_doc_id().is_some_and(|d| d <= doc_id) {
            self.cursor += 1;
        }
    }
}

impl QueryTree {
    /// Build every posting operator's list, bottom-up.
    pub fn initialize(&mut self, index: &dyn Index) -> Result<()> {
        for id in 0..self.nodes.len() {
            let Node::Posting(node) = &self.nodes[id] else { continue };
            let kind = node.kind.clone();
            let field = node.field;
            let args = node.args.clone();
            if args.len() < kind.min_args() {
                return Err(QueryError::Arity { operator: kind.name(), min: kind.min_args(), got: args.len() });
            }
            let list = match &kind {
                PostingKind::Term(term) => index.postings(field, term).cloned().unwrap_or_default(),
                PostingKind::Syn => self.merge_union(&args),
                PostingKind::Near(k) => self.merge_proximity(&args, |positions| near_matches(positions, *k)),
                PostingKind::Window(k) => self.merge_proximity(&args, |positions| window_matches(positions, *k)),
            };
            if let Some(node) = self.posting_mut(id) {
                node.list = list;
                node.cursor = 0;
            }
        }
        Ok(())
    }

    pub(crate) fn posting_doc(&self, id: NodeId) -> Option<DocId> {
        self.posting(id).and_then(|p| p.current_doc_id())
    }

    fn advance_posting(&mut self, id: NodeId, doc_id: DocId) {
        if let Some(p) = self.posting_mut(id) {
            p.advance_past(doc_id);
        }
    }

    /// Synonym union: one posting per document any argument matches, with the
    /// sorted union of the matching arguments' positions.
    fn merge_union(&mut self, args: &[NodeId]) -> InvertedList {
        let mut list = InvertedList::new();
        while let Some(doc) = args.iter().filter_map(|&a| self.posting_doc(a)).min() {
            let mut positions: Vec<u32> = args
                .iter()
                .filter(|&&a| self.posting_doc(a) == Some(doc))
                .filter_map(|&a| self.posting(a).and_then(|p| p.current_posting()))
                .flat_map(|p| p.positions.iter().copied())
                .collect();
            positions.sort_unstable();
            positions.dedup();
            list.append_posting(doc, positions);
            for &a in args {
                self.advance_posting(a, doc);
            }
        }
        list
    }

    /// Lock-step document alignment followed by per-document position
    /// matching. The operator's list ends as soon as any argument is exhausted.
    fn merge_proximity<F>(&mut self, args: &[NodeId], matcher: F) -> InvertedList
    where
        F: Fn(&[&[u32]]) -> Vec<u32>,
    {
        let mut list = InvertedList::new();
        loop {
            let docs: Option<Vec<DocId>> = args.iter().map(|&a| self.posting_doc(a)).collect();
            let Some(docs) = docs else { break };
            let first = docs[0];
            if docs.iter().all(|&d| d == first) {
                let positions: Vec<&[u32]> = args
                    .iter()
                    .filter_map(|&a| self.posting(a).and_then(|p| p.current_posting()))
                    .map(|p| p.positions.as_slice())
                    .collect();
                let hits = matcher(&positions);
                if !hits.is_empty() {
                    list.append_posting(first, hits);
                }
                for &a in args {
                    self.advance_posting(a, first);
                }
            } else {
                // Lowest doc id moves; ties go to the lowest argument index.
                let (slot, &doc) = docs
                    .iter()
                    .enumerate()
                    .min_by_key(|&(i, d)| (*d, i))
                    .unwrap_or((0, &first));
                self.advance_posting(args[slot], doc);
            }
        }
        list
    }
}

/// Ordered proximity: argument `i` must occur at most `k` positions after
/// argument `i - 1`. Returns the first argument's position for each match.
pub fn near_matches(positions: &[&[u32]], k: u32) -> Vec<u32> {
    scan_positions(positions, |at| {
        at.windows(2).all(|w| w[1] >= w[0] && w[1] - w[0] <= k)
    })
    .into_iter()
    .map(|at| at[0])
    .collect()
}

/// Unordered proximity: all arguments within a span of `k` positions.
/// Returns the start of each matching span.
pub fn window_matches(positions: &[&[u32]], k: u32) -> Vec<u32> {
    scan_positions(positions, |at| {
        let lo = at.iter().min().copied().unwrap_or(0);
        let hi = at.iter().max().copied().unwrap_or(0);
        hi - lo <= k
    })
    .into_iter()
    .map(|at| at.iter().min().copied().unwrap_or(0))
    .collect()
}

/// Walk one cursor per argument. On a match every cursor moves forward by
/// one; otherwise the cursor on the smallest position moves (ties to the
/// lowest argument index). Stops when any cursor runs out.
fn scan_positions<P>(positions: &[&[u32]], matches: P) -> Vec<Vec<u32>>
where
    P: Fn(&[u32]) -> bool,
{
    let mut hits = Vec::new();
    if positions.is_empty() || positions.iter().any(|p| p.is_empty()) {
        return hits;
    }
    let mut cursors = vec![0usize; positions.len()];
    loop {
        let at: Vec<u32> = cursors.iter().zip(positions).map(|(&c, p)| p[c]).collect();
        if matches(&at) {
            hits.push(at);
            for (c, p) in cursors.iter_mut().zip(positions) {
                *c += 1;
                if *c >= p.len() {
                    return hits;
                }
            }
        } else {
            let (slot, _) = at
                .iter()
                .enumerate()
                .min_by_key(|&(i, pos)| (*pos, i))
                .unwrap_or((0, &at[0]));
            cursors[slot] += 1;
            if cursors[slot] >= positions[slot].len() {
                return hits;
            }
        }
    }
}
