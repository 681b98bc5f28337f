//! Retrieval models and the per-term scoring formulas they attach to SCORE leaves.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub k3: f64,
}

/// Pseudo-relevance feedback settings (Indri only).
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackParams {
    /// Number of top-ranked documents mined for expansion terms.
    pub docs: usize,
    /// Number of expansion terms kept.
    pub terms: usize,
    /// Dirichlet prior used while scoring candidate terms.
    pub mu: f64,
    /// Weight of the original query in the combined query.
    pub orig_weight: f64,
    pub expansion_query_file: PathBuf,
    pub initial_ranking_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndriParams {
    pub mu: f64,
    pub lambda: f64,
    pub feedback: Option<FeedbackParams>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalModel {
    UnrankedBoolean,
    RankedBoolean,
    Bm25(Bm25Params),
    Indri(IndriParams),
}

impl RetrievalModel {
    pub fn name(&self) -> &'static str {
        match self {
            RetrievalModel::UnrankedBoolean => "UnrankedBoolean",
            RetrievalModel::RankedBoolean => "RankedBoolean",
            RetrievalModel::Bm25(_) => "BM25",
            RetrievalModel::Indri(_) => "Indri",
        }
    }

    /// Operator wrapped around a query line before parsing.
    pub fn default_operator(&self) -> &'static str {
        match self {
            RetrievalModel::Bm25(_) => "#sum",
            RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean | RetrievalModel::Indri(_) => "#and",
        }
    }

    /// Wrap a raw query line in the model's default operator.
    pub fn wrap_query(&self, query: &str) -> String {
        format!("{}({})", self.default_operator(), query)
    }
}

/// Okapi BM25 weight of one term in one document, with the query-term weight fixed at 1.
pub fn bm25_term_score(p: &Bm25Params, tf: f64, df: f64, num_docs: f64, doc_len: f64, avg_doc_len: f64) -> f64 {
    let idf = ((num_docs - df + 0.5) / (df + 0.5)).log10();
    let tf_weight = tf * (p.k1 + 1.0) / (tf + p.k1 * (1.0 - p.b + p.b * (doc_len / avg_doc_len)));
    let qtf = 1.0;
    let user_weight = (p.k3 + 1.0) * qtf / (p.k3 + qtf);
    idf * tf_weight * user_weight
}

/// Dirichlet-smoothed, Jelinek-Mercer-interpolated term probability.
///
/// The default score of an absent term is this same function at `tf = 0`.
/// An empty document under `mu = 0` has no Dirichlet estimate and keeps only
/// the collection part.
pub fn indri_term_score(mu: f64, lambda: f64, tf: f64, mle: f64, doc_len: f64) -> f64 {
    let smoothed = if doc_len + mu > 0.0 { (tf + mu * mle) / (doc_len + mu) } else { 0.0 };
    (1.0 - lambda) * smoothed + lambda * mle
}

/// Collection probability of a term; zero when the field holds no tokens at all.
pub fn collection_mle(ctf: u64, field_length: u64) -> f64 {
    if field_length == 0 {
        0.0
    } else {
        ctf as f64 / field_length as f64
    }
}
