//! Batch query evaluation: reads a parameter file's worth of configuration,
//! evaluates every query line and writes trec_eval results.

pub mod letor;
pub mod params;
pub mod trec;

use anyhow::{bail, Context, Result};
use params::{ErrorPolicy, Pipeline, RunConfig};
use qryeval_core::feedback::expand;
use qryeval_core::persist::{load_index, IndexPaths};
use qryeval_core::{run_query, FeedbackParams, Field, Index, QueryError, RetrievalModel, ScoreList};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// `qid:query` lines, in file order. Blank lines are ignored.
pub fn read_queries(path: &Path) -> Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading queries {}", path.display()))?;
    let mut queries = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((qid, query)) = line.split_once(':') else {
            bail!("{}:{}: missing ':' in query line", path.display(), n + 1);
        };
        queries.push((qid.trim().to_string(), query.trim().to_string()));
    }
    Ok(queries)
}

pub fn run(config: &RunConfig) -> Result<()> {
    let index = load_index(&IndexPaths::new(&config.index_path))?;
    let queries = read_queries(&config.query_file)?;
    let file = File::create(&config.output.path)
        .with_context(|| format!("creating {}", config.output.path.display()))?;
    let mut out = BufWriter::new(file);

    match &config.pipeline {
        Pipeline::Rank(model) => {
            let mut ranker = Ranker::new(&index, model)?;
            for (qid, query) in &queries {
                let mut results = match ranker.rank(qid, query)? {
                    Ok(results) => results,
                    Err(err) => {
                        skip_or_abort(config.error_policy, qid, err)?;
                        continue;
                    }
                };
                results.sort(&index);
                tracing::info!(qid = %qid, hits = results.len(), "query done");
                trec::write_results(&mut out, qid, &results, &index, &config.output)?;
            }
        }
        Pipeline::Letor(letor_config) => {
            let page_rank = letor::read_page_rank(&letor_config.page_rank)?;
            letor::train(letor_config, &index, &page_rank)?;
            let ranked = letor::test(letor_config, &index, &page_rank, &queries, config.error_policy)?;
            for (qid, results) in &ranked {
                trec::write_results(&mut out, qid, results, &index, &config.output)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Log and drop a bad query under `Skip`; fail the run under `Abort`.
pub(crate) fn skip_or_abort(policy: ErrorPolicy, qid: &str, err: QueryError) -> Result<()> {
    match policy {
        ErrorPolicy::Skip => {
            tracing::warn!(qid, error = %err, "skipping query");
            Ok(())
        }
        ErrorPolicy::Abort => Err(anyhow::Error::new(err).context(format!("query {qid}"))),
    }
}

struct Feedback<'a> {
    params: &'a FeedbackParams,
    initial: Option<HashMap<String, ScoreList>>,
    expansions: BufWriter<File>,
}

/// Evaluates query lines under one model, expanding them first when the model
/// carries feedback settings.
struct Ranker<'a> {
    index: &'a dyn Index,
    model: &'a RetrievalModel,
    feedback: Option<Feedback<'a>>,
}

impl<'a> Ranker<'a> {
    fn new(index: &'a dyn Index, model: &'a RetrievalModel) -> Result<Self> {
        let feedback = match model {
            RetrievalModel::Indri(p) => p.feedback.as_ref(),
            _ => None,
        };
        let feedback = match feedback {
            Some(params) => {
                let initial = match &params.initial_ranking_file {
                    Some(path) => Some(trec::read_initial_ranking(path, index)?),
                    None => None,
                };
                let file = File::create(&params.expansion_query_file)
                    .with_context(|| format!("creating {}", params.expansion_query_file.display()))?;
                Some(Feedback { params, initial, expansions: BufWriter::new(file) })
            }
            None => None,
        };
        Ok(Ranker { index, model, feedback })
    }

    /// The outer error is I/O; the inner one is a problem with the query itself.
    fn rank(&mut self, qid: &str, query: &str) -> Result<std::result::Result<ScoreList, QueryError>> {
        let Some(fb) = self.feedback.as_mut() else {
            return Ok(run_query(query, Field::Body, self.index, self.model));
        };

        let mut initial = match fb.initial.as_ref().map(|rankings| rankings.get(qid)) {
            Some(Some(ranking)) => ranking.clone(),
            Some(None) => ScoreList::new(),
            None => match run_query(query, Field::Body, self.index, self.model) {
                Ok(list) => list,
                Err(err) => return Ok(Err(err)),
            },
        };
        initial.sort(self.index);
        if initial.is_empty() {
            tracing::warn!(qid, "no feedback documents, using the original query");
            return Ok(run_query(query, Field::Body, self.index, self.model));
        }

        let expansion = expand(query, &initial, self.index, fb.params);
        writeln!(fb.expansions, "{qid}: {}", expansion.expansion_query)?;
        fb.expansions.flush()?;
        if expansion.terms.is_empty() {
            return Ok(run_query(query, Field::Body, self.index, self.model));
        }
        Ok(run_query(&expansion.combined_query, Field::Body, self.index, self.model))
    }
}
