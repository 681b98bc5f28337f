//! Pseudo-relevance feedback for the Indri model.
//!
//! Candidate terms come from the body vocabulary of the top-ranked documents.
//! Each candidate is scored against every feedback document: first with its
//! collection-only (tf = 0) estimate, then the documents that contain it add
//! their own estimate minus that baseline.

use crate::eval::ScoreList;
use crate::index::{Field, Index};
use crate::model::{collection_mle, FeedbackParams};
use std::collections::HashMap;

const FEEDBACK_FIELD: Field = Field::Body;

/// Smallest weight that still prints as a positive `{:.4}` number.
const MIN_PRINTED_WEIGHT: f64 = 0.00005;

#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    /// Selected terms, best first.
    pub terms: Vec<(String, f64)>,
    /// `#wand( w term ... )` over the selected terms.
    pub expansion_query: String,
    /// The original query and the expansion combined by `fbOrigWeight`.
    pub combined_query: String,
}

/// Build an expansion from a ranking that is already sorted best-first.
pub fn expand(query: &str, ranking: &ScoreList, index: &dyn Index, params: &FeedbackParams) -> Expansion {
    let top: Vec<_> = ranking.iter().take(params.docs).copied().collect();
    let total_len = index.sum_of_field_lengths(FEEDBACK_FIELD);
    let mu = params.mu;

    let mut candidates: HashMap<String, f64> = HashMap::new();
    for doc in &top {
        if let Some(vector) = index.term_vector(doc.doc_id, FEEDBACK_FIELD) {
            for term in vector.keys() {
                candidates.entry(term.clone()).or_insert(0.0);
            }
        }
    }
    let mle: HashMap<String, f64> = candidates
        .keys()
        .map(|t| (t.clone(), collection_mle(index.total_term_freq(FEEDBACK_FIELD, t), total_len)))
        .collect();

    for doc in &top {
        let doc_len = index.field_length(FEEDBACK_FIELD, doc.doc_id) as f64;
        if doc_len + mu <= 0.0 {
            continue;
        }
        for (term, score) in candidates.iter_mut() {
            let p = mle[term];
            if p <= 0.0 { continue; }
            let idf = (1.0 / p).ln();
            *score += doc.score * idf * (mu * p) / (doc_len + mu);
        }
        let Some(vector) = index.term_vector(doc.doc_id, FEEDBACK_FIELD) else { continue };
        for (term, &tf) in vector {
            let p = mle[term];
            if p <= 0.0 { continue; }
            let idf = (1.0 / p).ln();
            let with_doc = doc.score * idf * (tf as f64 + mu * p) / (doc_len + mu);
            let baseline = doc.score * idf * (mu * p) / (doc_len + mu);
            if let Some(score) = candidates.get_mut(term) {
                *score += with_doc - baseline;
            }
        }
    }

    let mut ranked: Vec<(String, f64)> = candidates.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    ranked.retain(|(_, w)| *w >= MIN_PRINTED_WEIGHT);
    ranked.truncate(params.terms);

    let mut expansion_query = String::from("#wand(");
    for (term, weight) in &ranked {
        expansion_query.push_str(&format!(" {weight:.4} {term}"));
    }
    expansion_query.push_str(" )");

    let orig_weight = params.orig_weight;
    let combined_query = if 1.0 - orig_weight < MIN_PRINTED_WEIGHT || ranked.is_empty() {
        format!("#and( {query} )")
    } else if orig_weight < MIN_PRINTED_WEIGHT {
        expansion_query.clone()
    } else {
        format!("#wand( {:.4} #and( {} ) {:.4} {} )", orig_weight, query, 1.0 - orig_weight, expansion_query)
    };
    tracing::debug!(expansion = %expansion_query, "feedback expansion built");
    Expansion { terms: ranked, expansion_query, combined_query }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{CorpusStats, InvertedIndex};
    use std::path::PathBuf;

    fn params(docs: usize, terms: usize) -> FeedbackParams {
        FeedbackParams {
            docs,
            terms,
            mu: 0.0,
            orig_weight: 0.5,
            expansion_query_file: PathBuf::from("expansion.qry"),
            initial_ranking_file: None,
        }
    }

    fn fixture() -> InvertedIndex {
        let mut index = InvertedIndex::new();
        index.add_document("d0", &[(Field::Body, "jaguar cat jaguar speed habitat")]);
        index.add_document("d1", &[(Field::Body, "jaguar car engine")]);
        index.add_document("d2", &[(Field::Body, "unrelated filler text")]);
        index
    }

    fn ranking() -> ScoreList {
        let mut list = ScoreList::new();
        list.add(0, 0.9);
        list.add(1, 0.5);
        list.add(2, 0.1);
        list
    }

    #[test]
    fn keeps_the_requested_number_of_terms_best_first() {
        let index = fixture();
        let expansion = expand("jaguar", &ranking(), &index, &params(1, 2));
        // d0 has five tokens and four distinct candidates; only two survive.
        assert_eq!(expansion.terms.len(), 2);
        assert!(expansion.terms[0].1 >= expansion.terms[1].1);
        assert_eq!(expansion.terms[0].0, "jaguar");
    }

    #[test]
    fn scores_reduce_to_the_closed_form() {
        let index = fixture();
        let p = FeedbackParams { mu: 10.0, ..params(2, 100) };
        let expansion = expand("jaguar", &ranking(), &index, &p);
        let total = index.sum_of_field_lengths(Field::Body) as f64;

        let score = |term: &str| {
            let mle = index.total_term_freq(Field::Body, term) as f64 / total;
            let idf = (1.0 / mle).ln();
            [(0u32, 0.9), (1, 0.5)]
                .iter()
                .map(|&(doc, doc_score)| {
                    let tf = index.term_vector(doc, Field::Body).and_then(|v| v.get(term)).copied().unwrap_or(0);
                    let len = index.field_length(Field::Body, doc) as f64;
                    doc_score * idf * (tf as f64 + 10.0 * mle) / (len + 10.0)
                })
                .sum::<f64>()
        };
        assert_eq!(expansion.terms.len(), 6);
        for (term, got) in &expansion.terms {
            assert!((got - score(term.as_str())).abs() < 1e-9, "{term}");
        }
        assert!(expansion.terms.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn ties_prefer_the_larger_term() {
        let mut index = InvertedIndex::new();
        index.add_document("d0", &[(Field::Body, "delta omega")]);
        let mut list = ScoreList::new();
        list.add(0, 1.0);
        let expansion = expand("delta", &list, &index, &params(1, 2));
        let terms: Vec<&str> = expansion.terms.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["omega", "delta"]);
    }

    #[test]
    fn query_strings_are_formatted_for_reparsing() {
        let mut index = InvertedIndex::new();
        index.add_document("d0", &[(Field::Body, "delta omega")]);
        let mut list = ScoreList::new();
        list.add(0, 1.0);
        let p = FeedbackParams { orig_weight: 0.7, ..params(1, 1) };
        let expansion = expand("#and(delta)", &list, &index, &p);
        let w = expansion.terms[0].1;
        assert_eq!(expansion.expansion_query, format!("#wand( {w:.4} omega )"));
        assert_eq!(
            expansion.combined_query,
            format!("#wand( 0.7000 #and( #and(delta) ) 0.3000 #wand( {w:.4} omega ) )")
        );
        assert!(crate::query::parse(&expansion.combined_query, Field::Body).is_ok());
    }

    #[test]
    fn full_original_weight_keeps_only_the_original_query() {
        let index = fixture();
        let p = FeedbackParams { orig_weight: 1.0, ..params(1, 2) };
        let expansion = expand("jaguar", &ranking(), &index, &p);
        assert_eq!(expansion.combined_query, "#and( jaguar )");

        let p = FeedbackParams { orig_weight: 0.0, ..params(1, 2) };
        let expansion = expand("jaguar", &ranking(), &index, &p);
        assert_eq!(expansion.combined_query, expansion.expansion_query);
        assert!(crate::query::parse(&expansion.combined_query, Field::Body).is_ok());
    }

    #[test]
    fn empty_feedback_documents_without_prior_are_skipped() {
        let mut index = InvertedIndex::new();
        index.add_document("d0", &[(Field::Title, "jaguar")]);
        index.add_document("d1", &[(Field::Body, "jaguar cat")]);
        let mut list = ScoreList::new();
        list.add(0, 0.9);
        list.add(1, 0.5);
        let expansion = expand("jaguar", &list, &index, &params(2, 5));
        assert_eq!(expansion.terms.len(), 2);
        assert!(expansion.terms.iter().all(|(_, w)| w.is_finite() && *w > 0.0));
        assert!(crate::query::parse(&expansion.combined_query, Field::Body).is_ok());
    }
}
