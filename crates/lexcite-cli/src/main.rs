mod display;
#[cfg(feature = "onnx")]
mod embed;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lexcite_core::{ArticleKey, Citation, QueryPlan};
use lexcite_engine::{CiteOutcome, CiteRequest, Collaborators, Engine, EngineConfig};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "lexcite",
    version,
    about = "Hybrid statute retrieval and citation validation for labour law"
)]
struct Cli {
    /// Engine config file (TOML). Paths inside it are relative to the file.
    #[arg(long, global = true, env = "LEXCITE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory with the standard layout, used when no config is given.
    #[arg(long, global = true, env = "LEXCITE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Base URL of a remote embedding service.
    #[cfg(feature = "http")]
    #[arg(long, global = true, env = "LEXCITE_EMBED_URL")]
    embed_url: Option<String>,

    /// Base URL of a remote cross-encoder service.
    #[cfg(feature = "http")]
    #[arg(long, global = true, env = "LEXCITE_RERANK_URL")]
    rerank_url: Option<String>,

    /// Directory with `model.onnx` and `tokenizer.json` for local query encoding.
    #[cfg(feature = "onnx")]
    #[arg(long, global = true, env = "LEXCITE_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what the engine loaded.
    Info,

    /// Match a query against the topic guide table.
    Topics {
        query: String,

        #[arg(long, default_value = "3")]
        max: usize,
    },

    /// Retrieve candidate articles for a query.
    Retrieve {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Rerank the head of the fused list with the cross-encoder.
        #[arg(long)]
        rerank: bool,

        /// Query plan (JSON). Switches to multi-path retrieval.
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Restrict results to this law.
        #[arg(long)]
        law: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Retrieve, enhance, and validate a citation set in one pass.
    Cite {
        query: String,

        /// Query plan (JSON). Switches to multi-path retrieval.
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Use this topic instead of matching one.
        #[arg(long)]
        topic: Option<String>,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        rerank: bool,

        #[arg(long)]
        json: bool,
    },

    /// Validate citations from a JSON file.
    Validate {
        query: String,

        /// JSON array of `{law, article, heading, text}` objects.
        #[arg(long)]
        citations: PathBuf,

        #[arg(long)]
        topic: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Walk the knowledge graph from an article, e.g. `勞動基準法第22條`.
    Graph {
        id: String,

        #[arg(long, default_value = "2")]
        depth: usize,
    },

    /// Encode every corpus chunk and write the embedding store.
    #[cfg(feature = "onnx")]
    Embed {
        /// Output Parquet path. Defaults to the configured embedding store.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    #[cfg(feature = "onnx")]
    if let Commands::Embed { out } = &cli.command {
        return run_embed(&cli, &config, out.as_deref()).await;
    }

    let collaborators = collaborators(&cli, &config)?;
    let engine = Engine::open_with(config, collaborators).context("opening engine")?;

    let code = match cli.command {
        Commands::Info => {
            display::print_info(&engine.info());
            ExitCode::SUCCESS
        }

        Commands::Topics { query, max } => {
            display::print_topics(&engine.topics().match_topics(&query, max));
            ExitCode::SUCCESS
        }

        Commands::Retrieve {
            query,
            top_k,
            rerank,
            plan,
            law,
            json,
        } => {
            let mut opts = engine.options().rerank(rerank);
            if let Some(k) = top_k {
                opts = opts.top_k(k);
            }
            let candidates = match plan {
                Some(path) => {
                    let plan = read_json::<QueryPlan>(&path)?;
                    let planned = engine
                        .retrieve_with_plan(&query, Some(plan), None, opts.top_k, rerank)
                        .await?;
                    if let Some(label) = &planned.harmonized.label {
                        info!(label = %label, "plan harmonised");
                    }
                    planned.candidates
                }
                None => {
                    if let Some(law) = law {
                        opts = opts.preferred(vec![law]);
                        opts.strict_whitelist = true;
                    }
                    engine.retrieve(&query, &opts).await?
                }
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else {
                display::print_candidates(&candidates);
            }
            ExitCode::SUCCESS
        }

        Commands::Cite {
            query,
            plan,
            topic,
            top_k,
            rerank,
            json,
        } => {
            let mut request = CiteRequest::new(query);
            request.plan = plan.as_deref().map(read_json::<QueryPlan>).transpose()?;
            request.topic = topic;
            request.top_k = top_k;
            request.use_rerank = rerank;

            let outcome = engine.cite(request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
            match outcome {
                CiteOutcome::Accepted(cited) => {
                    if !json {
                        display::print_cited(&cited);
                    }
                    ExitCode::SUCCESS
                }
                CiteOutcome::Rejected { rejection, report } => {
                    if !json {
                        display::print_report(&report);
                        println!();
                        display::print_rejection(&rejection);
                    }
                    ExitCode::from(2)
                }
            }
        }

        Commands::Validate {
            query,
            citations,
            topic,
            json,
        } => {
            let citations = read_json::<Vec<Citation>>(&citations)?;
            let report = engine.validate(&query, &citations, topic.as_deref());
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                display::print_report(&report);
            }
            if report.is_blocked() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }

        Commands::Graph { id, depth } => {
            let graph = engine
                .graph()
                .context("no knowledge graph configured")?;
            let id = match ArticleKey::parse_reference(&id) {
                Ok(key) => key.normalized().graph_id(),
                Err(_) => id,
            };
            display::print_related(&id, &graph.related_articles(&id, depth, None));
            ExitCode::SUCCESS
        }

        #[cfg(feature = "onnx")]
        Commands::Embed { .. } => ExitCode::SUCCESS, // handled before the engine opens
    };

    engine.close();
    Ok(code)
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::with_data_dir(&cli.data_dir)),
    }
}

#[allow(unused_variables, unused_mut)]
fn collaborators(cli: &Cli, config: &EngineConfig) -> Result<Collaborators> {
    let mut out = Collaborators::default();

    #[cfg(feature = "onnx")]
    if let Some(dir) = &cli.model_dir {
        let encoder = lexcite_ai::OnnxEncoder::load(dir, config.embedding_model.clone())
            .context("loading ONNX query encoder")?;
        out.encoder = Some(Arc::new(encoder));
    }

    #[cfg(feature = "http")]
    {
        if let (None, Some(url)) = (&out.encoder, &cli.embed_url) {
            out.encoder = Some(Arc::new(lexcite_ai::HttpEncoder::new(
                url.clone(),
                config.embedding_model.clone(),
            )));
        }
        if let Some(url) = &cli.rerank_url {
            out.reranker = Some(Arc::new(lexcite_ai::HttpCrossEncoder::new(url.clone())));
        }
    }

    Ok(out)
}

#[cfg(feature = "onnx")]
async fn run_embed(cli: &Cli, config: &EngineConfig, out: Option<&Path>) -> Result<ExitCode> {
    let dir = cli
        .model_dir
        .as_deref()
        .context("--model-dir is required for embedding")?;
    let out = out
        .map(Path::to_path_buf)
        .or_else(|| config.embeddings.clone())
        .unwrap_or_else(|| config.corpus.with_file_name("embeddings.parquet"));

    let encoder = lexcite_ai::OnnxEncoder::load(dir, config.embedding_model.clone())
        .context("loading ONNX encoder")?;
    eprintln!("Embedding corpus with {}", config.embedding_model);
    let stats = embed::run_embed_pipeline(&config.corpus, &encoder, &out).await?;
    eprintln!(
        "Wrote {} rows ({}-dim) to {} in {:.1}s",
        stats.total_rows,
        stats.dim,
        out.display(),
        stats.elapsed_secs
    );
    Ok(ExitCode::SUCCESS)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
