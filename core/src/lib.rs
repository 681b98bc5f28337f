//! Query evaluation core: structured queries over a positional inverted
//! index, scored with unranked/ranked boolean, BM25 or Indri, plus
//! pseudo-relevance feedback and learning-to-rank feature extraction.

pub mod error;
pub mod eval;
pub mod feedback;
pub mod index;
pub mod letor;
pub mod model;
pub mod persist;
pub mod query;
pub mod tokenizer;

pub use error::QueryError;
pub use eval::{evaluate, run_query, ScoreList, ScoredDoc};
pub use index::{CorpusStats, DocId, Field, Index, InvertedIndex, InvertedList, Posting};
pub use model::{Bm25Params, FeedbackParams, IndriParams, RetrievalModel};
