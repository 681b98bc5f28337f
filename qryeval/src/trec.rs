//! trec_eval result files and initial rankings in the same format.

use crate::params::OutputConfig;
use anyhow::{bail, Context, Result};
use qryeval_core::{Index, ScoreList};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Write the first `output.length` entries of a sorted result list as
/// `qid Q0 externalId rank score runTag` lines.
pub fn write_results<W: Write>(
    out: &mut W,
    qid: &str,
    results: &ScoreList,
    index: &dyn Index,
    output: &OutputConfig,
) -> Result<()> {
    for (i, doc) in results.iter().take(output.length).enumerate() {
        let ext = index.external_id(doc.doc_id).unwrap_or_default();
        writeln!(out, "{qid} Q0 {ext} {} {:.6} {}", i + 1, doc.score, output.run_tag)?;
    }
    Ok(())
}

/// Read a ranking file into per-query score lists. Documents unknown to the
/// index are skipped.
pub fn read_initial_ranking(path: &Path, index: &dyn Index) -> Result<HashMap<String, ScoreList>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading initial ranking {}", path.display()))?;
    let mut rankings: HashMap<String, ScoreList> = HashMap::new();
    for (n, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 5 {
            bail!("{}:{}: expected `qid Q0 docid rank score tag`", path.display(), n + 1);
        }
        let score: f64 = fields[4]
            .parse()
            .with_context(|| format!("{}:{}: bad score {:?}", path.display(), n + 1, fields[4]))?;
        let Some(doc_id) = index.internal_id(fields[2]) else {
            tracing::warn!(doc = fields[2], "initial ranking names an unknown document");
            continue;
        };
        rankings.entry(fields[0].to_string()).or_default().add(doc_id, score);
    }
    tracing::info!(queries = rankings.len(), path = %path.display(), "initial ranking loaded");
    Ok(rankings)
}
