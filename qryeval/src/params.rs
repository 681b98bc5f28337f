//! Parameter file loading and run configuration.

use crate::letor::LetorConfig;
use anyhow::{anyhow, bail, Context, Result};
use qryeval_core::{Bm25Params, FeedbackParams, IndriParams, RetrievalModel};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_OUTPUT_LENGTH: usize = 100;
pub const DEFAULT_RUN_TAG: &str = "qryeval";
pub const DEFAULT_EXPANSION_FILE: &str = "queries.expansion.txt";

/// Raw `key = value` pairs from a parameter file.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading parameter file {}", path.display()))?;
        text.parse().with_context(|| format!("parsing parameter file {}", path.display()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn required(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| anyhow!("missing required parameter {key}"))
    }

    pub fn path(&self, key: &str) -> Result<PathBuf> {
        self.required(key).map(PathBuf::from)
    }

    pub fn parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.required(key)?;
        raw.parse().map_err(|e| anyhow!("parameter {key}: cannot parse {raw:?}: {e}"))
    }

    pub fn parsed_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(_) => self.parsed(key),
            None => Ok(default),
        }
    }
}

impl FromStr for Params {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut params = Params::default();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("line {}: expected key = value, got {line:?}", n + 1);
            };
            params.set(key.trim(), value.trim());
        }
        Ok(params)
    }
}

/// What a query line does to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// The first malformed query fails the run.
    #[default]
    Abort,
    /// Malformed queries are logged and produce no results.
    Skip,
}

impl FromStr for ErrorPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(ErrorPolicy::Abort),
            "skip" => Ok(ErrorPolicy::Skip),
            other => bail!("unknown queryErrorPolicy {other:?} (expected abort or skip)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub length: usize,
    pub run_tag: String,
}

#[derive(Debug, Clone)]
pub enum Pipeline {
    Rank(RetrievalModel),
    Letor(LetorConfig),
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub index_path: PathBuf,
    pub query_file: PathBuf,
    pub output: OutputConfig,
    pub pipeline: Pipeline,
    pub error_policy: ErrorPolicy,
}

impl RunConfig {
    pub fn from_params(params: &Params) -> Result<Self> {
        let algorithm = params.required("retrievalAlgorithm")?.to_ascii_lowercase();
        let pipeline = match algorithm.as_str() {
            "unrankedboolean" => Pipeline::Rank(RetrievalModel::UnrankedBoolean),
            "rankedboolean" => Pipeline::Rank(RetrievalModel::RankedBoolean),
            "bm25" => Pipeline::Rank(RetrievalModel::Bm25(bm25_params(params)?)),
            "indri" => Pipeline::Rank(RetrievalModel::Indri(indri_params(params)?)),
            "letor" => Pipeline::Letor(LetorConfig::from_params(params)?),
            other => bail!("unknown retrievalAlgorithm {other:?}"),
        };
        Ok(RunConfig {
            index_path: params.path("indexPath")?,
            query_file: params.path("queryFilePath")?,
            output: OutputConfig {
                path: params.path("trecEvalOutputPath")?,
                length: params.parsed_or("trecEvalOutputLength", DEFAULT_OUTPUT_LENGTH)?,
                run_tag: params.get("trecEvalRunTag").unwrap_or(DEFAULT_RUN_TAG).to_string(),
            },
            pipeline,
            error_policy: params.parsed_or("queryErrorPolicy", ErrorPolicy::Abort)?,
        })
    }
}

pub fn bm25_params(params: &Params) -> Result<Bm25Params> {
    let p = Bm25Params {
        k1: params.parsed("BM25:k_1")?,
        b: params.parsed("BM25:b")?,
        k3: params.parsed("BM25:k_3")?,
    };
    if p.k1 < 0.0 || !(0.0..=1.0).contains(&p.b) || p.k3 < 0.0 {
        bail!("BM25 parameters out of range: k_1 >= 0, 0 <= b <= 1, k_3 >= 0");
    }
    Ok(p)
}

pub fn indri_params(params: &Params) -> Result<IndriParams> {
    let mu: f64 = params.parsed("Indri:mu")?;
    let lambda: f64 = params.parsed("Indri:lambda")?;
    if mu < 0.0 || !(0.0..=1.0).contains(&lambda) {
        bail!("Indri parameters out of range: mu >= 0, 0 <= lambda <= 1");
    }
    let feedback = match params.get("fb") {
        Some(fb) if fb.eq_ignore_ascii_case("true") => Some(feedback_params(params)?),
        Some(fb) if fb.eq_ignore_ascii_case("false") => None,
        Some(other) => bail!("parameter fb: expected true or false, got {other:?}"),
        None => None,
    };
    Ok(IndriParams { mu, lambda, feedback })
}

fn feedback_params(params: &Params) -> Result<FeedbackParams> {
    let orig_weight: f64 = params.parsed("fbOrigWeight")?;
    if !(0.0..=1.0).contains(&orig_weight) {
        bail!("fbOrigWeight must lie in [0, 1]");
    }
    Ok(FeedbackParams {
        docs: params.parsed("fbDocs")?,
        terms: params.parsed("fbTerms")?,
        mu: params.parsed("fbMu")?,
        orig_weight,
        expansion_query_file: PathBuf::from(params.get("fbExpansionQueryFile").unwrap_or(DEFAULT_EXPANSION_FILE)),
        initial_ranking_file: params.get("fbInitialRankingFile").filter(|s| !s.is_empty()).map(PathBuf::from),
    })
}
