use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub type DocId = u32;

/// Document fields the query language can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Url,
    Keywords,
    Title,
    Body,
    Inlink,
}

impl Field {
    pub const ALL: [Field; 5] = [Field::Url, Field::Keywords, Field::Title, Field::Body, Field::Inlink];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Url => "url",
            Field::Keywords => "keywords",
            Field::Title => "title",
            Field::Body => "body",
            Field::Inlink => "inlink",
        }
    }

    /// Case-insensitive lookup of a field suffix such as `title` in `apple.title`.
    pub fn parse(name: &str) -> Option<Field> {
        let lower = name.to_ascii_lowercase();
        Field::ALL.into_iter().find(|f| f.as_str() == lower)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One document's occurrences of a term (or of a synthesized proximity match).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
    /// Strictly increasing token offsets.
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc_id: DocId, positions: Vec<u32>) -> Self {
        debug_assert!(positions.windows(2).all(|w| w[0] < w[1]), "positions must be strictly increasing");
        Self { doc_id, tf: positions.len() as u32, positions }
    }
}

/// Postings sorted by doc id, plus the aggregate statistics scoring needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedList {
    pub postings: Vec<Posting>,
    ctf: u64,
}

impl InvertedList {
    pub fn new() -> Self { Self::default() }

    /// Append a posting for a document strictly after the last one.
    pub fn append_posting(&mut self, doc_id: DocId, positions: Vec<u32>) {
        debug_assert!(
            self.postings.last().map_or(true, |p| p.doc_id < doc_id),
            "doc ids must be strictly increasing"
        );
        let posting = Posting::new(doc_id, positions);
        self.ctf += posting.tf as u64;
        self.postings.push(posting);
    }

    /// Document frequency.
    pub fn df(&self) -> u32 { self.postings.len() as u32 }

    /// Collection term frequency.
    pub fn ctf(&self) -> u64 { self.ctf }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }
}

/// A document field's vocabulary with in-document frequencies.
pub type TermVector = BTreeMap<String, u32>;

/// The statistics scoring formulas are allowed to depend on.
pub trait CorpusStats {
    fn num_docs(&self) -> u32;
    /// Documents with a non-empty `field`.
    fn doc_count(&self, field: Field) -> u32;
    fn sum_of_field_lengths(&self, field: Field) -> u64;
    fn field_length(&self, field: Field, doc_id: DocId) -> u32;
    fn doc_freq(&self, field: Field, term: &str) -> u32;
    fn total_term_freq(&self, field: Field, term: &str) -> u64;

    fn avg_field_length(&self, field: Field) -> f64 {
        self.sum_of_field_lengths(field) as f64 / self.doc_count(field) as f64
    }
}

/// Read-only view of the index collaborator.
pub trait Index: CorpusStats {
    fn postings(&self, field: Field, term: &str) -> Option<&InvertedList>;
    fn term_vector(&self, doc_id: DocId, field: Field) -> Option<&TermVector>;
    fn external_id(&self, doc_id: DocId) -> Option<&str>;
    fn internal_id(&self, external_id: &str) -> Option<DocId>;
    fn attribute(&self, doc_id: DocId, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMeta {
    pub external_id: String,
    pub attributes: HashMap<String, String>,
    pub field_lengths: HashMap<Field, u32>,
    pub vectors: HashMap<Field, TermVector>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct FieldTotals {
    sum_lengths: u64,
    doc_count: u32,
}

/// In-memory positional index. Internal doc ids are assigned in insertion order.
#[derive(Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: HashMap<Field, HashMap<String, InvertedList>>,
    docs: Vec<DocMeta>,
    doc_id_map: HashMap<String, DocId>,
    totals: HashMap<Field, FieldTotals>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Add a document whose fields are raw text, analyzed with [`tokenize`].
    pub fn add_document(&mut self, external_id: &str, fields: &[(Field, &str)]) -> DocId {
        let analyzed = fields.iter().map(|(field, text)| (*field, tokenize(text))).collect();
        self.add_analyzed(external_id, analyzed)
    }

    /// Add a document from already analyzed (stem, position) streams.
    pub fn add_analyzed(&mut self, external_id: &str, fields: Vec<(Field, Vec<(String, usize)>)>) -> DocId {
        let doc_id = self.docs.len() as DocId;
        let mut meta = DocMeta { external_id: external_id.to_string(), ..DocMeta::default() };
        for (field, tokens) in fields {
            if tokens.is_empty() { continue; }
            let mut by_term: BTreeMap<String, Vec<u32>> = BTreeMap::new();
            for (stem, pos) in &tokens {
                by_term.entry(stem.clone()).or_default().push(*pos as u32);
            }
            let lists = self.postings.entry(field).or_default();
            let vector = meta.vectors.entry(field).or_default();
            for (term, mut positions) in by_term {
                positions.sort_unstable();
                positions.dedup();
                vector.insert(term.clone(), positions.len() as u32);
                lists.entry(term).or_default().append_posting(doc_id, positions);
            }
            let len = tokens.len() as u32;
            meta.field_lengths.insert(field, len);
            let totals = self.totals.entry(field).or_default();
            totals.sum_lengths += len as u64;
            totals.doc_count += 1;
        }
        self.doc_id_map.insert(external_id.to_string(), doc_id);
        self.docs.push(meta);
        doc_id
    }

    pub fn set_attribute(&mut self, doc_id: DocId, name: &str, value: &str) {
        if let Some(meta) = self.docs.get_mut(doc_id as usize) {
            meta.attributes.insert(name.to_string(), value.to_string());
        }
    }
}

impl CorpusStats for InvertedIndex {
    fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    fn doc_count(&self, field: Field) -> u32 {
        self.totals.get(&field).map_or(0, |t| t.doc_count)
    }

    fn sum_of_field_lengths(&self, field: Field) -> u64 {
        self.totals.get(&field).map_or(0, |t| t.sum_lengths)
    }

    fn field_length(&self, field: Field, doc_id: DocId) -> u32 {
        self.docs
            .get(doc_id as usize)
            .and_then(|d| d.field_lengths.get(&field).copied())
            .unwrap_or(0)
    }

    fn doc_freq(&self, field: Field, term: &str) -> u32 {
        self.postings(field, term).map_or(0, |l| l.df())
    }

    fn total_term_freq(&self, field: Field, term: &str) -> u64 {
        self.postings(field, term).map_or(0, |l| l.ctf())
    }
}

impl Index for InvertedIndex {
    fn postings(&self, field: Field, term: &str) -> Option<&InvertedList> {
        self.postings.get(&field).and_then(|m| m.get(term))
    }

    fn term_vector(&self, doc_id: DocId, field: Field) -> Option<&TermVector> {
        self.docs.get(doc_id as usize).and_then(|d| d.vectors.get(&field))
    }

    fn external_id(&self, doc_id: DocId) -> Option<&str> {
        self.docs.get(doc_id as usize).map(|d| d.external_id.as_str())
    }

    fn internal_id(&self, external_id: &str) -> Option<DocId> {
        self.doc_id_map.get(external_id).copied()
    }

    fn attribute(&self, doc_id: DocId, name: &str) -> Option<&str> {
        self.docs
            .get(doc_id as usize)
            .and_then(|d| d.attributes.get(name))
            .map(String::as_str)
    }
}
