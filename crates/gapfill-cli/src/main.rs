use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use gapfill_core::provider::MockProvider;
use gapfill_core::{
    DocumentId, DocumentRegistry, EngineConfig, GapResolutionEngine, GapToken, GuessProvider,
    MergePolicy, ResolutionReport, TextDocument,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill every gap in a template
    Fill {
        /// Path to the template file
        #[arg(short, long)]
        template: PathBuf,

        /// Output file path (optional, prints to stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Guess provider to use
        #[arg(long, value_enum, default_value_t = ProviderType::Openai)]
        provider: ProviderType,

        /// Model name (optional, uses provider default if not specified)
        #[arg(short, long)]
        model: Option<String>,

        /// Merge policy: single, merge or merge_all
        #[arg(long)]
        policy: Option<MergePolicy>,

        /// Number of resolution rounds
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Per-gap guess timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write a JSON report of every gap to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List the gaps a template contains
    Scan {
        /// Path to the template file
        #[arg(short, long)]
        template: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum ProviderType {
    Openai,
    Ollama,
    /// Echo `<id>` for every gap without calling a model
    Mock,
}

#[derive(Serialize)]
struct FillReport<'a> {
    rounds: u32,
    complete: bool,
    gaps: Vec<&'a GapToken>,
    pending: &'a [GapToken],
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();

    match cli.command {
        Commands::Fill {
            template,
            output,
            provider,
            model,
            policy,
            max_rounds,
            timeout,
            report,
        } => {
            let mut config = EngineConfig::from_env();
            if let Some(policy) = policy {
                config = config.with_policy(policy);
            }
            if let Some(rounds) = max_rounds {
                config = config.with_max_rounds(rounds);
            }
            if let Some(ms) = timeout {
                config = config.with_guess_timeout(Duration::from_millis(ms));
            }

            info!("Initializing guess provider: {:?}", provider);

            let job = FillJob {
                registry: DocumentRegistry::global(),
                template,
                output,
                report,
                config,
            };

            match provider {
                ProviderType::Openai => {
                    let p = match model.as_deref() {
                        Some(m) => gapfill_ai::openai(m)?,
                        None => gapfill_ai::OpenAiProvider::from_env()?,
                    };
                    job.run(p).await?;
                }
                ProviderType::Ollama => {
                    let p = match model.as_deref() {
                        Some(m) => gapfill_ai::ollama(m)?,
                        None => gapfill_ai::OllamaProvider::from_env()?,
                    };
                    job.run(p).await?;
                }
                ProviderType::Mock => job.run(MockProvider::new()).await?,
            }
        }
        Commands::Scan { template } => {
            let text = read_template(&template).await?;
            let mut doc = TextDocument::new(text);
            let gaps = doc.discover_gaps();
            info!("Found {} gap(s) in {:?}", gaps.len(), template);
            println!("{}", serde_json::to_string_pretty(&gaps)?);
        }
    }

    Ok(())
}

struct FillJob {
    registry: Arc<DocumentRegistry>,
    template: PathBuf,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
    config: EngineConfig,
}

impl FillJob {
    async fn run<P>(self, provider: P) -> Result<()>
    where
        P: GuessProvider + 'static,
    {
        let text = read_template(&self.template).await?;

        let doc = self.registry.create_document(text);
        let result = self.fill(doc, provider).await;

        // release the document whether or not the fill succeeded
        if let Err(e) = self.registry.force_destroy(doc) {
            debug!("Document {} already released: {}", doc, e);
        }
        result
    }

    async fn fill<P>(&self, doc: DocumentId, provider: P) -> Result<()>
    where
        P: GuessProvider + 'static,
    {
        let gaps = self.registry.discover_gaps(doc)?;
        info!("Filling {} gap(s) with {}", gaps.len(), provider.name());
        debug!("Engine config: {:?}", self.config);

        let engine = GapResolutionEngine::new(provider, self.registry.clone())
            .with_config(self.config.clone());
        let result = engine
            .resolve_document(doc)
            .await
            .context("Gap resolution failed")?;

        log_outcomes(&result);

        if let Some(path) = &self.report {
            let report = FillReport {
                rounds: result.rounds,
                complete: result.is_complete(),
                gaps: result.outcomes.iter().map(|o| &o.token).collect(),
                pending: &result.pending,
            };
            tokio::fs::write(path, serde_json::to_string_pretty(&report)?)
                .await
                .context("Failed to write report file")?;
            info!("Report written to {:?}", path);
        }

        if let Some(out_path) = &self.output {
            tokio::fs::write(out_path, &result.text)
                .await
                .context("Failed to write output file")?;
            info!("Success! Output written to {:?}", out_path);
        } else {
            println!("{}", result.text);
        }

        Ok(())
    }
}

async fn read_template(path: &Path) -> Result<String> {
    info!("Reading template from {:?}", path);
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to load template file {:?}", path))
}

fn log_outcomes(report: &ResolutionReport) {
    let filled = report.filled().count();
    info!(
        "{} gap(s) filled in {} round(s)",
        filled, report.rounds
    );

    for outcome in report.failed() {
        match &outcome.error {
            Some(err) => warn!("Gap {} failed: {}", outcome.gap(), err),
            None => warn!("Gap {} failed", outcome.gap()),
        }
    }

    for token in &report.pending {
        warn!("Gap {} left open in state {:?}", token.id, token.state());
    }
}
