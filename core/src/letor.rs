//! Learning-to-rank feature extraction.
//!
//! Feature ids:
//!
//! | id | feature |
//! |----|---------|
//! | 1 | spam score (`score` attribute) |
//! | 2 | URL depth, the number of `/` in `rawUrl` |
//! | 3 | 1 if `rawUrl` contains `wikipedia.org` |
//! | 4 | page rank |
//! | 5, 8, 11, 14 | BM25 over body, title, url, inlink |
//! | 6, 9, 12, 15 | Indri over body, title, url, inlink |
//! | 7, 10, 13, 16 | query term overlap over body, title, url, inlink |
//! | 17 | body length |
//! | 18 | max minus min body frequency of the matched query terms |

use crate::index::{DocId, Field, Index};
use crate::model::{bm25_term_score, collection_mle, indri_term_score, Bm25Params};
use crate::tokenizer;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type FeatureId = usize;

/// Highest defined feature id.
pub const MAX_FEATURE: FeatureId = 18;

/// Slot 0 of the min/max arrays is unused.
const SLOTS: usize = MAX_FEATURE + 1;

const CONTENT_FIELDS: [Field; 4] = [Field::Body, Field::Title, Field::Url, Field::Inlink];

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub bm25: Bm25Params,
    pub mu: f64,
    pub lambda: f64,
    pub disabled: BTreeSet<FeatureId>,
}

impl FeatureConfig {
    pub fn enabled(&self, id: FeatureId) -> bool {
        !self.disabled.contains(&id)
    }
}

/// Raw or normalized feature values of one document, keyed by feature id.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub doc_id: DocId,
    pub values: BTreeMap<FeatureId, f64>,
}

/// All feature vectors of one query with the running per-feature range.
#[derive(Debug, Clone)]
pub struct QueryFeatures {
    pub vectors: Vec<FeatureVector>,
    min: [f64; SLOTS],
    max: [f64; SLOTS],
}

impl Default for QueryFeatures {
    fn default() -> Self {
        Self { vectors: Vec::new(), min: [f64::MAX; SLOTS], max: [f64::MIN; SLOTS] }
    }
}

impl QueryFeatures {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, vector: FeatureVector) {
        for (&id, &value) in &vector.values {
            self.min[id] = self.min[id].min(value);
            self.max[id] = self.max[id].max(value);
        }
        self.vectors.push(vector);
    }

    pub fn range(&self, id: FeatureId) -> Option<(f64, f64)> {
        (id < SLOTS && self.min[id] <= self.max[id]).then(|| (self.min[id], self.max[id]))
    }

    /// Rescale every value to [0, 1] by its feature's range in this query.
    /// A feature with the same value for every document becomes 0.
    pub fn normalize(&mut self) {
        for vector in &mut self.vectors {
            for (&id, value) in vector.values.iter_mut() {
                let (min, max) = (self.min[id], self.max[id]);
                *value = if max != min { (*value - min) / (max - min) } else { 0.0 };
            }
        }
    }
}

/// Computes feature vectors against one index.
pub struct FeatureExtractor<'a> {
    index: &'a dyn Index,
    config: &'a FeatureConfig,
    page_rank: &'a HashMap<String, f64>,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(index: &'a dyn Index, config: &'a FeatureConfig, page_rank: &'a HashMap<String, f64>) -> Self {
        Self { index, config, page_rank }
    }

    /// Features of `query` (plain text) for each document, in the order given.
    pub fn extract(&self, query: &str, docs: &[DocId]) -> QueryFeatures {
        let stems = tokenizer::analyze(query);
        let mut features = QueryFeatures::new();
        for &doc_id in docs {
            features.push(self.features(&stems, doc_id));
        }
        tracing::debug!(query, docs = docs.len(), "features extracted");
        features
    }

    pub fn features(&self, stems: &[String], doc_id: DocId) -> FeatureVector {
        let mut values = BTreeMap::new();
        let mut put = |id: FeatureId, compute: &dyn Fn() -> f64| {
            if self.config.enabled(id) {
                values.insert(id, compute());
            }
        };

        put(1, &|| self.spam_score(doc_id));
        put(2, &|| self.raw_url(doc_id).map_or(0.0, |url| url.matches('/').count() as f64));
        put(3, &|| match self.raw_url(doc_id) {
            Some(url) if url.to_lowercase().contains("wikipedia.org") => 1.0,
            _ => 0.0,
        });
        put(4, &|| self.page_rank(doc_id));

        for (j, &field) in CONTENT_FIELDS.iter().enumerate() {
            let base = 4 + 3 * j;
            put(base + 1, &|| self.bm25(stems, doc_id, field));
            put(base + 2, &|| self.indri(stems, doc_id, field));
            put(base + 3, &|| self.overlap(stems, doc_id, field));
        }

        put(17, &|| self.index.field_length(Field::Body, doc_id) as f64);
        put(18, &|| self.tf_range(stems, doc_id));
        FeatureVector { doc_id, values }
    }

    fn spam_score(&self, doc_id: DocId) -> f64 {
        match self.index.attribute(doc_id, "score").map(|s| s.trim().parse::<f64>()) {
            Some(Ok(score)) => score,
            Some(Err(_)) | None => {
                tracing::warn!(doc_id, "missing or malformed spam score, using 0");
                0.0
            }
        }
    }

    fn raw_url(&self, doc_id: DocId) -> Option<&str> {
        let url = self.index.attribute(doc_id, "rawUrl");
        if url.is_none() {
            tracing::warn!(doc_id, "document has no rawUrl attribute");
        }
        url
    }

    fn page_rank(&self, doc_id: DocId) -> f64 {
        let ext = self.index.external_id(doc_id).unwrap_or_default();
        match self.page_rank.get(ext) {
            Some(&score) => score,
            None => {
                tracing::warn!(doc = ext, "no page rank entry, using 0");
                0.0
            }
        }
    }

    fn tf(&self, doc_id: DocId, field: Field, stem: &str) -> Option<u32> {
        self.index.term_vector(doc_id, field).and_then(|v| v.get(stem)).copied()
    }

    fn bm25(&self, stems: &[String], doc_id: DocId, field: Field) -> f64 {
        let doc_len = self.index.field_length(field, doc_id) as f64;
        let avg_len = self.index.avg_field_length(field);
        let num_docs = self.index.num_docs() as f64;
        stems
            .iter()
            .filter_map(|stem| {
                let tf = self.tf(doc_id, field, stem)?;
                let df = self.index.doc_freq(field, stem) as f64;
                Some(bm25_term_score(&self.config.bm25, tf as f64, df, num_docs, doc_len, avg_len))
            })
            .sum()
    }

    /// Geometric mean of the smoothed term probabilities, or 0 if no query
    /// term occurs in the field.
    fn indri(&self, stems: &[String], doc_id: DocId, field: Field) -> f64 {
        if stems.is_empty() {
            return 0.0;
        }
        let total = self.index.sum_of_field_lengths(field);
        let doc_len = self.index.field_length(field, doc_id) as f64;
        let mut matched = false;
        let mut product = 1.0;
        for stem in stems {
            let mle = collection_mle(self.index.total_term_freq(field, stem), total);
            let tf = self.tf(doc_id, field, stem).unwrap_or(0);
            matched |= tf > 0;
            product *= indri_term_score(self.config.mu, self.config.lambda, tf as f64, mle, doc_len);
        }
        if matched { product.powf(1.0 / stems.len() as f64) } else { 0.0 }
    }

    fn overlap(&self, stems: &[String], doc_id: DocId, field: Field) -> f64 {
        if stems.is_empty() {
            return 0.0;
        }
        let hits = stems.iter().filter(|s| self.tf(doc_id, field, s).is_some()).count();
        hits as f64 / stems.len() as f64
    }

    fn tf_range(&self, stems: &[String], doc_id: DocId) -> f64 {
        let freqs: Vec<u32> = stems.iter().filter_map(|s| self.tf(doc_id, Field::Body, s)).collect();
        match (freqs.iter().max(), freqs.iter().min()) {
            (Some(max), Some(min)) => (max - min) as f64,
            _ => 0.0,
        }
    }
}

/// One SVM-rank line: `rel qid:Q id:value ... #externalId`.
pub fn svm_rank_line(relevance: i32, qid: &str, vector: &FeatureVector, external_id: &str) -> String {
    let mut line = format!("{relevance} qid:{qid}");
    for (id, value) in &vector.values {
        line.push_str(&format!(" {id}:{value:.6}"));
    }
    line.push_str(&format!(" #{external_id}"));
    line
}
