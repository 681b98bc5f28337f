use anyhow::Result;
use clap::Parser;
use qryeval::params::{Params, RunConfig};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "qryeval")]
#[command(about = "Evaluate structured queries against a positional index", long_about = None)]
struct Args {
    /// Parameter file (`key = value` per line)
    param_file: PathBuf,
    /// Run tag written in the last column of the results, overrides trecEvalRunTag
    #[arg(long)]
    run_tag: Option<String>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut params = Params::load(&args.param_file)?;
    if let Some(tag) = args.run_tag {
        params.set("trecEvalRunTag", tag);
    }
    let config = RunConfig::from_params(&params)?;

    let started = Instant::now();
    qryeval::run(&config)?;
    tracing::info!(elapsed_s = started.elapsed().as_secs_f64(), output = %config.output.path.display(), "run finished");
    Ok(())
}
