//! Learning-to-rank train/test pipeline around an external SVM-rank solver.

use crate::params::{bm25_params, indri_params, ErrorPolicy, Params};
use crate::{read_queries, skip_or_abort};
use anyhow::{anyhow, bail, Context, Result};
use qryeval_core::letor::{svm_rank_line, FeatureConfig, FeatureExtractor, FeatureId, MAX_FEATURE};
use qryeval_core::{run_query, DocId, Field, Index, RetrievalModel, ScoreList};
use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Candidates reranked per test query.
pub const CANDIDATES: usize = 100;

#[derive(Debug, Clone)]
pub struct LetorConfig {
    pub training_qrels: PathBuf,
    pub training_queries: PathBuf,
    pub training_features: PathBuf,
    pub page_rank: PathBuf,
    pub features: FeatureConfig,
    pub learn_path: PathBuf,
    pub classify_path: PathBuf,
    pub param_c: f64,
    pub model_file: PathBuf,
    pub testing_features: PathBuf,
    pub testing_scores: PathBuf,
}

impl LetorConfig {
    pub fn from_params(params: &Params) -> Result<Self> {
        let indri = indri_params(params)?;
        Ok(LetorConfig {
            training_qrels: params.path("letor:trainingQrelsFile")?,
            training_queries: params.path("letor:trainingQueryFile")?,
            training_features: params.path("letor:trainingFeatureVectorsFile")?,
            page_rank: params.path("letor:pageRankFile")?,
            features: FeatureConfig {
                bm25: bm25_params(params)?,
                mu: indri.mu,
                lambda: indri.lambda,
                disabled: parse_disabled(params.get("letor:featureDisable").unwrap_or(""))?,
            },
            learn_path: params.path("letor:svmRankLearnPath")?,
            classify_path: params.path("letor:svmRankClassifyPath")?,
            param_c: params.parsed("letor:svmRankParamC")?,
            model_file: params.path("letor:svmRankModelFile")?,
            testing_features: params.path("letor:testingFeatureVectorsFile")?,
            testing_scores: params.path("letor:testingDocumentScores")?,
        })
    }
}

fn parse_disabled(list: &str) -> Result<BTreeSet<FeatureId>> {
    let mut disabled = BTreeSet::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id: FeatureId = item.parse().map_err(|_| anyhow!("letor:featureDisable: bad feature id {item:?}"))?;
        if id == 0 || id > MAX_FEATURE {
            bail!("letor:featureDisable: feature id {id} outside 1..={MAX_FEATURE}");
        }
        disabled.insert(id);
    }
    Ok(disabled)
}

/// Judged documents per query, in file order.
pub fn read_qrels(path: &Path, index: &dyn Index) -> Result<HashMap<String, Vec<(DocId, i32)>>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading qrels {}", path.display()))?;
    let mut qrels: HashMap<String, Vec<(DocId, i32)>> = HashMap::new();
    for (n, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let (qid, ext, rel) = match fields.as_slice() {
            [qid, _, ext, rel, ..] => (*qid, *ext, *rel),
            _ => {
                tracing::warn!(line = n + 1, "skipping malformed qrels line");
                continue;
            }
        };
        let Ok(rel) = rel.parse::<i32>() else {
            tracing::warn!(line = n + 1, "skipping qrels line with bad relevance");
            continue;
        };
        let Some(doc_id) = index.internal_id(ext) else {
            tracing::debug!(doc = ext, "judged document not in index");
            continue;
        };
        qrels.entry(qid.to_string()).or_default().push((doc_id, rel));
    }
    Ok(qrels)
}

/// `externalId<TAB>score` per line.
pub fn read_page_rank(path: &Path) -> Result<HashMap<String, f64>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading page rank {}", path.display()))?;
    let mut scores = HashMap::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (ext, score) = line
            .split_once('\t')
            .ok_or_else(|| anyhow!("{}:{}: expected externalId<TAB>score", path.display(), n + 1))?;
        let score: f64 = score
            .trim()
            .parse()
            .with_context(|| format!("{}:{}: bad page rank {score:?}", path.display(), n + 1))?;
        scores.insert(ext.trim().to_string(), score);
    }
    Ok(scores)
}

/// Extract normalized training features for every judged query and fit the model.
pub fn train(config: &LetorConfig, index: &dyn Index, page_rank: &HashMap<String, f64>) -> Result<()> {
    let qrels = read_qrels(&config.training_qrels, index)?;
    let queries = read_queries(&config.training_queries)?;
    let extractor = FeatureExtractor::new(index, &config.features, page_rank);

    let file = File::create(&config.training_features)
        .with_context(|| format!("creating {}", config.training_features.display()))?;
    let mut out = BufWriter::new(file);
    for (qid, query) in &queries {
        let Some(judged) = qrels.get(qid) else {
            tracing::warn!(qid = %qid, "training query has no judgments");
            continue;
        };
        let docs: Vec<DocId> = judged.iter().map(|&(doc, _)| doc).collect();
        let mut features = extractor.extract(query, &docs);
        features.normalize();
        for (vector, &(_, rel)) in features.vectors.iter().zip(judged) {
            let ext = index.external_id(vector.doc_id).unwrap_or_default();
            writeln!(out, "{}", svm_rank_line(rel, qid, vector, ext))?;
        }
    }
    out.flush()?;
    tracing::info!(queries = queries.len(), "training features written");

    let c = config.param_c.to_string();
    run_solver(
        &config.learn_path,
        &[OsStr::new("-c"), OsStr::new(&c), config.training_features.as_os_str(), config.model_file.as_os_str()],
    )
}

/// Rerank the BM25 body candidates of each query with the trained model.
pub fn test(
    config: &LetorConfig,
    index: &dyn Index,
    page_rank: &HashMap<String, f64>,
    queries: &[(String, String)],
    policy: ErrorPolicy,
) -> Result<Vec<(String, ScoreList)>> {
    let bm25 = RetrievalModel::Bm25(config.features.bm25);
    let extractor = FeatureExtractor::new(index, &config.features, page_rank);

    let file = File::create(&config.testing_features)
        .with_context(|| format!("creating {}", config.testing_features.display()))?;
    let mut out = BufWriter::new(file);
    let mut candidates: Vec<(String, Vec<DocId>)> = Vec::with_capacity(queries.len());
    for (qid, query) in queries {
        let mut initial = match run_query(query, Field::Body, index, &bm25) {
            Ok(list) => list,
            Err(err) => {
                skip_or_abort(policy, qid, err)?;
                continue;
            }
        };
        initial.sort(index);
        let docs: Vec<DocId> = initial.iter().take(CANDIDATES).map(|d| d.doc_id).collect();
        let mut features = extractor.extract(query, &docs);
        features.normalize();
        for vector in &features.vectors {
            let ext = index.external_id(vector.doc_id).unwrap_or_default();
            writeln!(out, "{}", svm_rank_line(0, qid, vector, ext))?;
        }
        candidates.push((qid.clone(), docs));
    }
    out.flush()?;

    run_solver(
        &config.classify_path,
        &[config.testing_features.as_os_str(), config.model_file.as_os_str(), config.testing_scores.as_os_str()],
    )?;

    let scores = read_scores(&config.testing_scores)?;
    let expected: usize = candidates.iter().map(|(_, docs)| docs.len()).sum();
    if scores.len() != expected {
        bail!(
            "{} has {} scores for {expected} test documents",
            config.testing_scores.display(),
            scores.len()
        );
    }
    let mut scores = scores.into_iter();
    let mut ranked = Vec::with_capacity(candidates.len());
    for (qid, docs) in candidates {
        let mut list: ScoreList = ScoreList::new();
        for (doc_id, score) in docs.into_iter().zip(scores.by_ref()) {
            list.add(doc_id, score);
        }
        list.sort(index);
        ranked.push((qid, list));
    }
    Ok(ranked)
}

fn read_scores(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading solver scores {}", path.display()))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(n, l)| {
            l.trim()
                .parse::<f64>()
                .with_context(|| format!("{}:{}: bad score {l:?}", path.display(), n + 1))
        })
        .collect()
}

/// Run the solver to completion. A non-zero exit status is an error.
fn run_solver(program: &Path, args: &[&OsStr]) -> Result<()> {
    tracing::info!(program = %program.display(), "running solver");
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("starting {}", program.display()))?;
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        tracing::debug!(target: "solver", "{line}");
    }
    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qryeval_core::InvertedIndex;

    #[test]
    fn disabled_feature_list() {
        assert_eq!(parse_disabled("").unwrap(), BTreeSet::new());
        assert_eq!(parse_disabled(" 4, 17 ,").unwrap(), BTreeSet::from([4, 17]));
        assert!(parse_disabled("19").is_err());
        assert!(parse_disabled("0").is_err());
        assert!(parse_disabled("x").is_err());
    }

    #[test]
    fn qrels_skip_unknown_documents() {
        let mut index = InvertedIndex::new();
        index.add_document("clueweb09-a", &[(Field::Body, "text")]);
        index.add_document("clueweb09-b", &[(Field::Body, "text")]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrels.txt");
        fs::write(&path, "7 0 clueweb09-b 2\n7 0 clueweb09-zz 1\n7 0 clueweb09-a 0\n8 0 clueweb09-a 1\n").unwrap();
        let qrels = read_qrels(&path, &index).unwrap();
        assert_eq!(qrels["7"], vec![(1, 2), (0, 0)]);
        assert_eq!(qrels["8"], vec![(0, 1)]);
    }

    #[test]
    fn page_rank_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pr.txt");
        fs::write(&path, "clueweb09-a\t0.25\nclueweb09-b\t3\n").unwrap();
        let pr = read_page_rank(&path).unwrap();
        assert_eq!(pr["clueweb09-a"], 0.25);
        assert_eq!(pr["clueweb09-b"], 3.0);

        fs::write(&path, "clueweb09-a 0.25\n").unwrap();
        assert!(read_page_rank(&path).is_err());
    }

    #[test]
    fn failing_solver_is_an_error() {
        assert!(run_solver(Path::new("/nonexistent/svm_rank_learn"), &[]).is_err());
    }
}
