

use std::path::PathBuf;

use anyhow::{bail, Context};
use shopsense::{ExplicitFilter, Orchestrator, PipelineConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "usage: shopsense [--config PATH] [--budget MS] [--filter FIELD:OP:VALUE]... [--execute] QUERY";

struct Args {
    config: Option<PathBuf>,
    budget_ms: Option<u64>,
    filters: Vec<ExplicitFilter>,
    execute: bool,
    query: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        budget_ms: None,
        filters: Vec::new(),
        execute: false,
        query: String::new(),
    };
    let mut words = Vec::new();
    let mut raw = std::env::args().skip(1);

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--config" => {
                args.config = Some(raw.next().context("--config needs a path")?.into());
            }
            "--budget" => {
                let value = raw.next().context("--budget needs milliseconds")?;
                args.budget_ms = Some(value.parse().context("--budget must be an integer")?);
            }
            "--filter" => {
                let value = raw.next().context("--filter needs FIELD:OP:VALUE")?;
                let filter = value.parse::<ExplicitFilter>().map_err(anyhow::Error::msg)?;
                args.filters.push(filter);
            }
            "--execute" => args.execute = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            _ => words.push(arg),
        }
    }

    if words.is_empty() {
        bail!("missing QUERY\n{USAGE}");
    }
    args.query = words.join(" ");
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("shopsense=info".parse()?))
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => PipelineConfig::load(Some(path))?,
        None => PipelineConfig::from_env(),
    };
    let budget_ms = args.budget_ms.unwrap_or(config.overall_budget_ms);
    let orchestrator = Orchestrator::from_config(config)?;

    let output = if args.execute {
        let outcome = orchestrator.search(&args.query, &args.filters, budget_ms).await?;
        serde_json::to_string_pretty(&outcome)?
    } else {
        let query = orchestrator
            .understand_and_build(&args.query, &args.filters, budget_ms)
            .await?;
        serde_json::to_string_pretty(&query)?
    };
    println!("{output}");
    Ok(())
}
