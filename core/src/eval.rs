//! Document-at-a-time evaluation and ranked result lists.

use crate::error::Result;
use crate::index::{DocId, Field, Index};
use crate::model::RetrievalModel;
use crate::query::{parse_query, QueryTree};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// (doc, score) pairs in insertion order until [`ScoreList::sort`] is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreList {
    entries: Vec<ScoredDoc>,
}

impl ScoreList {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, doc_id: DocId, score: f64) {
        self.entries.push(ScoredDoc { doc_id, score });
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&self, i: usize) -> Option<&ScoredDoc> { self.entries.get(i) }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredDoc> { self.entries.iter() }

    /// Descending score, ties broken by ascending external id.
    pub fn sort(&mut self, index: &dyn Index) {
        self.entries.sort_by(|a, b| {
            b.score.total_cmp(&a.score).then_with(|| {
                let ea = index.external_id(a.doc_id).unwrap_or("");
                let eb = index.external_id(b.doc_id).unwrap_or("");
                ea.cmp(eb)
            })
        });
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

impl FromIterator<ScoredDoc> for ScoreList {
    fn from_iter<I: IntoIterator<Item = ScoredDoc>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

/// Initialize the tree, then advance / test / score / advance-past until the
/// root runs out of matches.
pub fn evaluate(tree: &mut QueryTree, index: &dyn Index, model: &RetrievalModel) -> Result<ScoreList> {
    tree.initialize(index)?;
    let root = tree.root();
    let mut results = ScoreList::new();
    while let Some(doc_id) = tree.has_match(root, model) {
        let score = tree.score(root, model, index, doc_id)?;
        results.add(doc_id, score);
        tree.advance_past(root, doc_id);
    }
    Ok(results)
}

/// Wrap a query line in the model's default operator, parse, optimize and
/// evaluate it. A query optimized away yields an empty list.
pub fn run_query(query: &str, default_field: Field, index: &dyn Index, model: &RetrievalModel) -> Result<ScoreList> {
    let wrapped = model.wrap_query(query);
    let Some(node) = parse_query(&wrapped, default_field)? else {
        return Ok(ScoreList::new());
    };
    let mut tree = QueryTree::compile(&node)?;
    let results = evaluate(&mut tree, index, model)?;
    tracing::debug!(query = %node, matches = results.len(), model = model.name(), "query evaluated");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{CorpusStats, InvertedIndex};
    use crate::model::{bm25_term_score, indri_term_score, Bm25Params, IndriParams};
    use crate::QueryError;

    fn analyzed(pairs: &[(&str, usize)]) -> Vec<(String, usize)> {
        pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    fn body_index(docs: &[&[(&str, usize)]]) -> InvertedIndex {
        let mut index = InvertedIndex::new();
        for (i, tokens) in docs.iter().enumerate() {
            index.add_analyzed(&format!("doc{i}"), vec![(Field::Body, analyzed(tokens))]);
        }
        index
    }

    fn scores(list: &ScoreList) -> Vec<(DocId, f64)> {
        list.iter().map(|s| (s.doc_id, s.score)).collect()
    }

    fn indri() -> RetrievalModel {
        RetrievalModel::Indri(IndriParams { mu: 2500.0, lambda: 0.4, feedback: None })
    }

    fn bm25() -> RetrievalModel {
        RetrievalModel::Bm25(Bm25Params { k1: 1.2, b: 0.75, k3: 0.0 })
    }

    /// alpha tf 3, beta tf 7, gamma tf 2 in doc0; doc1 has only alpha.
    fn ranked_fixture() -> InvertedIndex {
        body_index(&[
            &[("alpha", 0), ("alpha", 1), ("alpha", 2), ("beta", 3), ("beta", 4), ("beta", 5), ("beta", 6),
              ("beta", 7), ("beta", 8), ("beta", 9), ("gamma", 10), ("gamma", 11)],
            &[("alpha", 0)],
        ])
    }

    #[test]
    fn ranked_boolean_and_takes_the_minimum() {
        let index = ranked_fixture();
        let got = run_query("alpha beta gamma", Field::Body, &index, &RetrievalModel::RankedBoolean).unwrap();
        assert_eq!(scores(&got), vec![(0, 2.0)]);
    }

    #[test]
    fn ranked_boolean_or_takes_the_maximum() {
        let index = ranked_fixture();
        let got = run_query("#or(alpha beta gamma)", Field::Body, &index, &RetrievalModel::RankedBoolean).unwrap();
        assert_eq!(scores(&got), vec![(0, 7.0), (1, 1.0)]);
    }

    #[test]
    fn unranked_boolean_scores_one() {
        let index = ranked_fixture();
        let got = run_query("#or(beta #and(alpha gamma))", Field::Body, &index, &RetrievalModel::UnrankedBoolean).unwrap();
        assert_eq!(scores(&got), vec![(0, 1.0)]);
        let got = run_query("#or(alpha beta)", Field::Body, &index, &RetrievalModel::UnrankedBoolean).unwrap();
        assert_eq!(scores(&got), vec![(0, 1.0), (1, 1.0)]);
    }

    #[test]
    fn boolean_and_skips_to_common_documents() {
        let index = body_index(&[
            &[("alpha", 0)],
            &[("beta", 0)],
            &[("alpha", 0), ("beta", 1)],
            &[("beta", 0)],
            &[("alpha", 0), ("beta", 3)],
        ]);
        let got = run_query("#and(alpha beta)", Field::Body, &index, &RetrievalModel::RankedBoolean).unwrap();
        assert_eq!(scores(&got), vec![(2, 1.0), (4, 1.0)]);
    }

    #[test]
    fn bm25_sum_adds_term_scores() {
        let index = ranked_fixture();
        let model = bm25();
        let RetrievalModel::Bm25(params) = &model else { unreachable!() };
        let got = run_query("alpha gamma", Field::Body, &index, &model).unwrap();
        let avg = index.avg_field_length(Field::Body);
        let alpha0 = bm25_term_score(params, 3.0, 2.0, 2.0, 12.0, avg);
        let gamma0 = bm25_term_score(params, 2.0, 1.0, 2.0, 12.0, avg);
        let alpha1 = bm25_term_score(params, 1.0, 2.0, 2.0, 1.0, avg);
        let got = scores(&got);
        assert_eq!(got.len(), 2);
        assert!((got[0].1 - (alpha0 + gamma0)).abs() < 1e-12);
        assert!((got[1].1 - alpha1).abs() < 1e-12);
    }

    #[test]
    fn bm25_rejects_boolean_arguments_under_sum() {
        let index = ranked_fixture();
        let err = run_query("#and(alpha beta) gamma", Field::Body, &index, &bm25()).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperator { operator: "#and", model: "BM25" }));
    }

    #[test]
    fn unsupported_operator_names_the_model() {
        let index = ranked_fixture();
        let err = run_query("#wand(1 alpha 2 beta)", Field::Body, &index, &RetrievalModel::RankedBoolean).unwrap_err();
        assert_eq!(err.to_string(), "the RankedBoolean retrieval model doesn't support the #wand operator");
    }

    #[test]
    fn indri_and_uses_default_scores_for_missing_terms() {
        let index = ranked_fixture();
        let got = run_query("alpha gamma", Field::Body, &index, &indri()).unwrap();
        let sum_len = index.sum_of_field_lengths(Field::Body) as f64;
        let alpha_mle = 4.0 / sum_len;
        let gamma_mle = 2.0 / sum_len;

        let doc1_alpha = indri_term_score(2500.0, 0.4, 1.0, alpha_mle, 1.0);
        let doc1_gamma = indri_term_score(2500.0, 0.4, 0.0, gamma_mle, 1.0);
        let expected = doc1_alpha.powf(0.5) * doc1_gamma.powf(0.5);

        let got = scores(&got);
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].0, 1);
        assert!((got[1].1 - expected).abs() < 1e-15);
    }

    #[test]
    fn indri_wand_weights_the_geometric_mean() {
        let index = ranked_fixture();
        let and = run_query("#and(alpha gamma)", Field::Body, &index, &indri()).unwrap();
        let wand = run_query("#wand(1 alpha 1 gamma)", Field::Body, &index, &indri()).unwrap();
        for (a, w) in and.iter().zip(wand.iter()) {
            assert_eq!(a.doc_id, w.doc_id);
            assert!((a.score - w.score).abs() < 1e-12);
        }
        let skewed = run_query("#wand(3 alpha 1 gamma)", Field::Body, &index, &indri()).unwrap();
        // doc1 lacks gamma, so leaning on alpha helps it.
        assert!(skewed.get(1).unwrap().score > wand.get(1).unwrap().score);
    }

    #[test]
    fn indri_wsum_is_a_weighted_average() {
        let index = ranked_fixture();
        let got = run_query("#wsum(1 alpha 3 gamma)", Field::Body, &index, &indri()).unwrap();
        let sum_len = index.sum_of_field_lengths(Field::Body) as f64;
        let a = indri_term_score(2500.0, 0.4, 3.0, 4.0 / sum_len, 12.0);
        let g = indri_term_score(2500.0, 0.4, 2.0, 2.0 / sum_len, 12.0);
        assert!((got.get(0).unwrap().score - (0.25 * a + 0.75 * g)).abs() < 1e-15);
    }

    #[test]
    fn indri_default_matches_zero_tf_score_in_nested_and() {
        let index = ranked_fixture();
        let got = run_query("#and(alpha #and(beta gamma))", Field::Body, &index, &indri()).unwrap();
        let sum_len = index.sum_of_field_lengths(Field::Body) as f64;
        let a = indri_term_score(2500.0, 0.4, 1.0, 4.0 / sum_len, 1.0);
        let b = indri_term_score(2500.0, 0.4, 0.0, 7.0 / sum_len, 1.0);
        let g = indri_term_score(2500.0, 0.4, 0.0, 2.0 / sum_len, 1.0);
        // An absent nested AND contributes the product of its leaves' defaults.
        let inner = b * g;
        let expected = a.powf(0.5) * inner.powf(0.5);
        let doc1 = got.iter().find(|s| s.doc_id == 1).unwrap();
        assert!((doc1.score - expected).abs() < 1e-15);
    }

    #[test]
    fn indri_nested_wand_default_is_the_product_of_leaf_defaults() {
        let index = body_index(&[
            &[("kiwi", 0), ("pie", 1)],
            &[("banana", 0)],
        ]);
        let got = run_query("#wand(0.5 #and(kiwi pie) 0.5 banana)", Field::Body, &index, &indri()).unwrap();
        let sum_len = index.sum_of_field_lengths(Field::Body) as f64;
        let kiwi = indri_term_score(2500.0, 0.4, 0.0, 1.0 / sum_len, 1.0);
        let pie = indri_term_score(2500.0, 0.4, 0.0, 1.0 / sum_len, 1.0);
        let banana = indri_term_score(2500.0, 0.4, 1.0, 1.0 / sum_len, 1.0);
        let expected = (kiwi * pie).powf(0.5) * banana.powf(0.5);
        let doc1 = got.iter().find(|s| s.doc_id == 1).unwrap();
        assert!((doc1.score - expected).abs() < 1e-15);
    }

    #[test]
    fn bm25_wsum_scales_matching_children_by_weight_share() {
        let index = ranked_fixture();
        let model = bm25();
        let RetrievalModel::Bm25(params) = &model else { unreachable!() };
        let got = run_query("#wsum(1 alpha 3 gamma)", Field::Body, &index, &model).unwrap();
        let avg = index.avg_field_length(Field::Body);
        let alpha0 = bm25_term_score(params, 3.0, 2.0, 2.0, 12.0, avg);
        let gamma0 = bm25_term_score(params, 2.0, 1.0, 2.0, 12.0, avg);
        let alpha1 = bm25_term_score(params, 1.0, 2.0, 2.0, 1.0, avg);
        let got = scores(&got);
        assert_eq!(got.len(), 2);
        assert!((got[0].1 - (0.25 * alpha0 + 0.75 * gamma0)).abs() < 1e-12);
        assert!((got[1].1 - 0.25 * alpha1).abs() < 1e-12);
    }

    #[test]
    fn indri_without_prior_sorts_documents_missing_the_field() {
        let mut index = InvertedIndex::new();
        for i in 0..60 {
            let ext = format!("d{i:02}");
            if i % 5 < 2 {
                index.add_document(&ext, &[(Field::Body, "apple pie")]);
            } else {
                index.add_document(&ext, &[(Field::Body, "apple"), (Field::Title, "pie crust")]);
            }
        }
        let model = RetrievalModel::Indri(IndriParams { mu: 0.0, lambda: 0.4, feedback: None });
        let mut got = run_query("apple pie.title", Field::Body, &index, &model).unwrap();
        assert_eq!(got.len(), 60);
        assert!(got.iter().all(|s| s.score.is_finite()));
        got.sort(&index);
        assert!(got.iter().zip(got.iter().skip(1)).all(|(a, b)| a.score >= b.score));
    }

    #[test]
    fn query_on_a_field_absent_from_the_collection_scores_finitely() {
        let index = ranked_fixture();
        let got = run_query("alpha alpha.inlink", Field::Body, &index, &indri()).unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|s| s.score.is_finite()));
    }

    #[test]
    fn sort_orders_not_a_number_without_panicking() {
        let mut index = InvertedIndex::new();
        for ext in ["a", "b", "c", "d"] {
            index.add_document(ext, &[(Field::Body, "x")]);
        }
        let mut list = ScoreList::new();
        list.add(0, 0.5);
        list.add(1, f64::NAN);
        list.add(2, 2.0);
        list.add(3, 1.0);
        list.sort(&index);
        let order: Vec<DocId> = list.iter().map(|s| s.doc_id).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn syn_round_trip_over_surface_forms() {
        let mut index = InvertedIndex::new();
        index.add_document("d1", &[(Field::Body, "apple")]);
        index.add_document("d2", &[(Field::Body, "apples")]);
        let node = parse_query("#syn(apple apples)", Field::Body).unwrap().unwrap();
        let mut tree = QueryTree::compile(&node).unwrap();
        let got = evaluate(&mut tree, &index, &RetrievalModel::RankedBoolean).unwrap();
        assert_eq!(scores(&got), vec![(0, 1.0), (1, 1.0)]);
    }

    #[test]
    fn empty_query_yields_no_results() {
        let index = ranked_fixture();
        let got = run_query("the of", Field::Body, &index, &indri()).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn sort_breaks_ties_on_external_id() {
        let mut index = InvertedIndex::new();
        index.add_document("zeta", &[(Field::Body, "x")]);
        index.add_document("alpha", &[(Field::Body, "x")]);
        index.add_document("mid", &[(Field::Body, "x")]);
        let mut list = ScoreList::new();
        list.add(0, 1.0);
        list.add(1, 1.0);
        list.add(2, 2.0);
        list.sort(&index);
        let order: Vec<DocId> = list.iter().map(|s| s.doc_id).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }
}
