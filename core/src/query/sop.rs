//! Scoring operators. Match rules and scores both depend on the active
//! retrieval model; each (operator, model) pair is resolved in one `match`.

use super::iop::PostingIterator;
use super::tree::{Node, NodeId, QueryTree, ScoringKind, ScoringNode};
use crate::error::{QueryError, Result};
use crate::index::{DocId, Index};
use crate::model::{bm25_term_score, collection_mle, indri_term_score, RetrievalModel};

fn unsupported(kind: ScoringKind, model: &RetrievalModel) -> QueryError {
    QueryError::UnsupportedOperator { operator: kind.name(), model: model.name() }
}

impl QueryTree {
    fn scoring(&self, id: NodeId) -> Option<&ScoringNode> {
        match &self.nodes[id] {
            Node::Scoring(s) => Some(s),
            Node::Posting(_) => None,
        }
    }

    /// The document this node matches at its current cursor position, if any.
    /// Conjunctive boolean AND advances its arguments to find a common document.
    pub fn has_match(&mut self, id: NodeId, model: &RetrievalModel) -> Option<DocId> {
        let (kind, args) = match &self.nodes[id] {
            Node::Posting(p) => return p.current_doc_id(),
            Node::Scoring(s) => (s.kind, s.args.clone()),
        };
        match kind {
            ScoringKind::Score => self.posting_doc(args[0]),
            ScoringKind::And if !matches!(model, RetrievalModel::Indri(_)) => self.match_all(&args, model),
            _ => self.match_min(&args, model),
        }
    }

    fn match_min(&mut self, args: &[NodeId], model: &RetrievalModel) -> Option<DocId> {
        args.iter().filter_map(|&a| self.has_match(a, model)).min()
    }

    fn match_all(&mut self, args: &[NodeId], model: &RetrievalModel) -> Option<DocId> {
        loop {
            let mut target: Option<DocId> = None;
            let mut aligned = true;
            for &a in args {
                let doc = self.has_match(a, model)?;
                if let Some(t) = target {
                    aligned &= t == doc;
                }
                target = Some(target.map_or(doc, |t| t.max(doc)));
            }
            let target = target?;
            if aligned {
                return Some(target);
            }
            for &a in args {
                if target > 0 {
                    self.advance_past(a, target - 1);
                }
            }
        }
    }

    /// Advance every cursor under `id` beyond `doc_id`.
    pub fn advance_past(&mut self, id: NodeId, doc_id: DocId) {
        let args = match &mut self.nodes[id] {
            Node::Posting(p) => return p.advance_past(doc_id),
            Node::Scoring(s) => s.args.clone(),
        };
        for a in args {
            self.advance_past(a, doc_id);
        }
    }

    fn matches_doc(&mut self, id: NodeId, model: &RetrievalModel, doc_id: DocId) -> bool {
        self.has_match(id, model) == Some(doc_id)
    }

    /// Score of the document `doc_id` that `has_match` just returned for `id`.
    pub fn score(&mut self, id: NodeId, model: &RetrievalModel, index: &dyn Index, doc_id: DocId) -> Result<f64> {
        let Some(node) = self.scoring(id).cloned() else {
            return Err(QueryError::ScoringArgument { operator: "#score" });
        };
        let n = node.args.len() as f64;
        match (node.kind, model) {
            (ScoringKind::Score, _) => self.score_leaf(node.args[0], model, index, doc_id),

            (_, RetrievalModel::UnrankedBoolean) if matches!(node.kind, ScoringKind::And | ScoringKind::Or) => Ok(1.0),

            (ScoringKind::And, RetrievalModel::RankedBoolean) => {
                let mut score = f64::MAX;
                for &a in &node.args {
                    if self.matches_doc(a, model, doc_id) {
                        score = score.min(self.score(a, model, index, doc_id)?);
                    }
                }
                Ok(if score == f64::MAX { 0.0 } else { score })
            }
            (ScoringKind::Or, RetrievalModel::RankedBoolean) => {
                let mut score = 0.0f64;
                for &a in &node.args {
                    if self.matches_doc(a, model, doc_id) {
                        score = score.max(self.score(a, model, index, doc_id)?);
                    }
                }
                Ok(score)
            }

            (ScoringKind::Sum, RetrievalModel::Bm25(_)) => {
                let mut score = 0.0;
                for &a in &node.args {
                    if let Some(child) = self.scoring(a) {
                        if matches!(child.kind, ScoringKind::And | ScoringKind::Or) {
                            return Err(unsupported(child.kind, model));
                        }
                    }
                    if self.matches_doc(a, model, doc_id) {
                        score += self.score(a, model, index, doc_id)?;
                    }
                }
                Ok(score)
            }
            (ScoringKind::WSum, RetrievalModel::Bm25(_)) => {
                let mut score = 0.0;
                for (i, &a) in node.args.iter().enumerate() {
                    if self.matches_doc(a, model, doc_id) {
                        score += node.weights[i] / node.weight_sum * self.score(a, model, index, doc_id)?;
                    }
                }
                Ok(score)
            }

            (ScoringKind::And, RetrievalModel::Indri(_)) => {
                let mut score = 1.0;
                for &a in &node.args {
                    score *= self.score_or_default(a, model, index, doc_id)?.powf(1.0 / n);
                }
                Ok(score)
            }
            (ScoringKind::WAnd, RetrievalModel::Indri(_)) => {
                let mut score = 1.0;
                for (i, &a) in node.args.iter().enumerate() {
                    let exponent = node.weights[i] / node.weight_sum;
                    score *= self.score_or_default(a, model, index, doc_id)?.powf(exponent);
                }
                Ok(score)
            }
            (ScoringKind::WSum, RetrievalModel::Indri(_)) => {
                let mut score = 0.0;
                for (i, &a) in node.args.iter().enumerate() {
                    score += node.weights[i] / node.weight_sum * self.score_or_default(a, model, index, doc_id)?;
                }
                Ok(score)
            }

            (kind, _) => Err(unsupported(kind, model)),
        }
    }

    fn score_or_default(&mut self, id: NodeId, model: &RetrievalModel, index: &dyn Index, doc_id: DocId) -> Result<f64> {
        if self.matches_doc(id, model, doc_id) {
            self.score(id, model, index, doc_id)
        } else {
            self.default_score(id, model, index, doc_id)
        }
    }

    /// Score `doc_id` would receive from `id` if none of its terms occurred in it.
    /// Nested AND and WAND defaults are the plain product of their children's
    /// defaults; WSUM keeps its weighted sum.
    pub fn default_score(&mut self, id: NodeId, model: &RetrievalModel, index: &dyn Index, doc_id: DocId) -> Result<f64> {
        let Some(node) = self.scoring(id).cloned() else {
            return Err(QueryError::ScoringArgument { operator: "#score" });
        };
        let RetrievalModel::Indri(params) = model else {
            return Ok(0.0);
        };
        match node.kind {
            ScoringKind::Score => {
                let Some(leaf) = self.posting(node.args[0]) else { return Ok(0.0) };
                let mle = collection_mle(leaf.list.ctf(), index.sum_of_field_lengths(leaf.field));
                let doc_len = index.field_length(leaf.field, doc_id) as f64;
                Ok(indri_term_score(params.mu, params.lambda, 0.0, mle, doc_len))
            }
            ScoringKind::And | ScoringKind::WAnd => {
                let mut score = 1.0;
                for &a in &node.args {
                    score *= self.default_score(a, model, index, doc_id)?;
                }
                Ok(score)
            }
            ScoringKind::WSum => {
                let mut score = 0.0;
                for (i, &a) in node.args.iter().enumerate() {
                    score += node.weights[i] / node.weight_sum * self.default_score(a, model, index, doc_id)?;
                }
                Ok(score)
            }
            ScoringKind::Or | ScoringKind::Sum => Ok(0.0),
        }
    }

    fn score_leaf(&self, posting: NodeId, model: &RetrievalModel, index: &dyn Index, doc_id: DocId) -> Result<f64> {
        let Some(leaf) = self.posting(posting) else {
            return Err(QueryError::ScoringArgument { operator: "#score" });
        };
        let tf = match leaf.current_posting() {
            Some(p) if p.doc_id == doc_id => p.tf as f64,
            _ => return Ok(0.0),
        };
        let score = match model {
            RetrievalModel::UnrankedBoolean => 1.0,
            RetrievalModel::RankedBoolean => tf,
            RetrievalModel::Bm25(params) => bm25_term_score(
                params,
                tf,
                leaf.list.df() as f64,
                index.num_docs() as f64,
                index.field_length(leaf.field, doc_id) as f64,
                index.avg_field_length(leaf.field),
            ),
            RetrievalModel::Indri(params) => {
                let mle = collection_mle(leaf.list.ctf(), index.sum_of_field_lengths(leaf.field));
                let doc_len = index.field_length(leaf.field, doc_id) as f64;
                indri_term_score(params.mu, params.lambda, tf, mle, doc_len)
            }
        };
        Ok(score)
    }
}
