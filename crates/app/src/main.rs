use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use medimate_core::compose::{DEFAULT_CHAT_MODEL, OPENAI_BASE_URL};
use medimate_core::config::default_max_pages;
use medimate_core::embeddings::{UPSTAGE_BASE_URL, UPSTAGE_PASSAGE_MODEL};
use medimate_core::{
    check_emergency_keywords, compose_answer, render_context, CharacterNgramEmbedder,
    ChatCompletionsComposer, Collector, CollectorOptions, DataPaths, DocumentAssembler, Embedder,
    HybridRetriever, IndexStore, KfdaRegistry, LiveRegistrySearch, OpenAiEmbedder, ProgressStore,
    RetrievalOptions, DEFAULT_REGISTRY_URL, DISCLAIMER,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LIVE_TIMEOUT: Duration = Duration::from_secs(10);
const BUILD_TIMEOUT: Duration = Duration::from_secs(30);
const EMERGENCY_FOOTER: &str = "전문 의료진의 진료가 필요합니다.";

#[derive(Parser)]
#[command(name = "medimate", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the index, documents and ingestion checkpoint.
    #[arg(long, env = "MEDIMATE_DATA_DIR", default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Drug registry list endpoint
    #[arg(long, default_value = DEFAULT_REGISTRY_URL, global = true)]
    registry_url: String,

    /// Decoded registry service key
    #[arg(long, env = "KFDA_API_KEY", hide_env_values = true, global = true)]
    registry_key: Option<String>,

    /// OpenAI-compatible embeddings base URL
    #[arg(long, default_value = UPSTAGE_BASE_URL, global = true)]
    embedding_url: String,

    #[arg(long, default_value = UPSTAGE_PASSAGE_MODEL, global = true)]
    embedding_model: String,

    /// Width of the vectors the embedding model returns.
    #[arg(long, default_value = "4096", global = true)]
    embedding_dimensions: usize,

    #[arg(long, env = "UPSTAGE_API_KEY", hide_env_values = true, global = true)]
    embedding_key: Option<String>,

    /// Use the offline character n-gram embedder instead of the remote model.
    #[arg(long, default_value_t = false, global = true)]
    local_embedder: bool,

    /// Vector scores below this send the query to the live registry.
    #[arg(long, default_value_t = 0.7, global = true)]
    similarity_threshold: f32,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    llm_key: Option<String>,

    #[arg(long, default_value = OPENAI_BASE_URL, global = true)]
    llm_url: String,

    #[arg(long, default_value = DEFAULT_CHAT_MODEL, global = true)]
    llm_model: String,
}

#[derive(Subcommand)]
enum Command {
    /// Collect the registry into a corpus, embed it and save the index.
    Build {
        #[arg(long, default_value = "5000")]
        target_documents: usize,
        /// Page cap; defaults to max(100, target / 100 + 10).
        #[arg(long)]
        max_pages: Option<u32>,
        /// Pause between registry pages in milliseconds.
        #[arg(long, default_value = "500")]
        page_delay_ms: u64,
        /// Discard the checkpoint and start collecting from page 1.
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Run hybrid retrieval and print the ranked results.
    Search {
        #[arg(long)]
        query: String,
    },
    /// Retrieve, then compose an answer when a language model is configured.
    Ask {
        #[arg(long)]
        query: String,
    },
    /// List the drug names in the saved index.
    Drugs,
    /// Show ingestion checkpoint, index metadata and file sizes.
    Status,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let paths = DataPaths::new(&cli.data_dir);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %paths.root().display(),
        "medimate boot"
    );

    match &cli.command {
        Command::Build {
            target_documents,
            max_pages,
            page_delay_ms,
            fresh,
        } => {
            let options = CollectorOptions {
                max_pages: max_pages.unwrap_or_else(|| default_max_pages(*target_documents)),
                page_delay: Duration::from_millis(*page_delay_ms),
                ..CollectorOptions::for_target(*target_documents)
            };
            run_build(&cli, &paths, options, *fresh)?;
        }
        Command::Search { query } => run_search(&cli, &paths, query)?,
        Command::Ask { query } => run_ask(&cli, &paths, query)?,
        Command::Drugs => {
            let store = load_index(&paths)?;
            for name in store.drug_names() {
                println!("{name}");
            }
        }
        Command::Status => run_status(&paths),
    }

    Ok(())
}

fn run_build(
    cli: &Cli,
    paths: &DataPaths,
    options: CollectorOptions,
    fresh: bool,
) -> anyhow::Result<()> {
    paths.ensure_dir().context("cannot create data directory")?;

    let key = cli
        .registry_key
        .as_deref()
        .context("building requires a registry key (--registry-key or KFDA_API_KEY)")?;
    let registry = KfdaRegistry::new(&cli.registry_url, key, BUILD_TIMEOUT)?;
    let embedder = select_embedder(cli)?;

    let collector = Collector::new(registry, DocumentAssembler::new()?, options, paths);
    if fresh {
        collector.reset()?;
        info!("checkpoint cleared, collecting from page 1");
    }

    let corpus = collector.collect()?;
    if corpus.is_empty() {
        bail!("registry produced no usable documents");
    }

    let mut store = IndexStore::new(paths.clone());
    store.build(corpus, embedder.as_ref())?;
    store.save()?;

    println!(
        "{} documents indexed with {} at {}",
        store.len(),
        embedder.model_id(),
        Utc::now().to_rfc3339()
    );
    Ok(())
}

fn run_search(cli: &Cli, paths: &DataPaths, query: &str) -> anyhow::Result<()> {
    let store = open_index(paths);
    let embedder = select_embedder(cli)?;
    warn_on_model_change(&store, embedder.as_ref());
    let live = live_source(cli)?;

    let retriever =
        HybridRetriever::with_options(&store, embedder.as_ref(), &live, retrieval_options(cli));
    let outcome = retriever.retrieve(query);

    println!("query: {query}");
    if outcome.is_empty() {
        println!("no results");
    }
    for result in &outcome.results {
        let document = &result.document;
        println!(
            "[{}] score={:.4} origin={:?} {} ({})",
            result.rank,
            result.similarity_score,
            result.origin,
            document.product_name,
            document.company_name
        );
        println!("  category={} drug={}", document.category, document.drug_name);
        println!("  {}", document.content());
        println!("  {}", document.url);
    }
    println!(
        "vector={} live={} fallback={}",
        outcome.vector_count, outcome.live_count, outcome.fallback_triggered
    );
    Ok(())
}

fn run_ask(cli: &Cli, paths: &DataPaths, query: &str) -> anyhow::Result<()> {
    let warnings = check_emergency_keywords(query);
    if let Some(emergency) = warnings.iter().find(|warning| warning.is_emergency()) {
        println!("{emergency}\n\n{EMERGENCY_FOOTER}");
        return Ok(());
    }
    for warning in &warnings {
        println!("{warning}");
    }

    let store = open_index(paths);
    let embedder = select_embedder(cli)?;
    warn_on_model_change(&store, embedder.as_ref());
    let live = live_source(cli)?;

    let retriever =
        HybridRetriever::with_options(&store, embedder.as_ref(), &live, retrieval_options(cli));
    let outcome = retriever.retrieve(query);

    let Some(key) = cli.llm_key.as_deref() else {
        warn!("no language model key configured, printing retrieved context");
        if outcome.is_empty() {
            println!("{}", medimate_core::compose::NOT_FOUND_RESPONSE);
        } else {
            println!("{}", render_context(&outcome.results));
            println!("{DISCLAIMER}");
        }
        return Ok(());
    };

    let composer = ChatCompletionsComposer::new(key, &cli.llm_url, cli.llm_model.clone())?;
    let answer = compose_answer(&composer, query, &outcome.results);

    println!("{}", answer.response);
    for source in &answer.sources {
        println!(
            "[{}] {} ({}) similarity={:.3} {}",
            source.rank, source.drug_name, source.category, source.similarity, source.url
        );
    }
    if let Some(usage) = answer.usage {
        info!(
            model = %answer.model_used,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "answer composed"
        );
    }
    Ok(())
}

fn run_status(paths: &DataPaths) {
    let progress = ProgressStore::new(paths.progress_path()).load();
    println!("data_dir: {}", paths.root().display());
    println!(
        "checkpoint: last_page={} total_documents={} last_update={}",
        progress.last_page,
        progress.total_documents,
        progress
            .last_update
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );

    let store = open_index(paths);
    match store.metadata() {
        Some(metadata) => println!(
            "index: documents={} model={} built={}",
            metadata.total_documents,
            metadata.embedding_model,
            metadata.build_date.to_rfc3339()
        ),
        None => println!("index: not built"),
    }

    for path in [
        paths.index_path(),
        paths.documents_path(),
        paths.progress_path(),
        paths.journal_path(),
    ] {
        println!("  {}: {}", path.display(), describe_size(&path));
    }
}

fn describe_size(path: &Path) -> String {
    match fs::metadata(path) {
        Ok(metadata) => format!("{:.1} KiB", metadata.len() as f64 / 1024.0),
        Err(_) => "missing".to_string(),
    }
}

fn open_index(paths: &DataPaths) -> IndexStore {
    let mut store = IndexStore::new(paths.clone());
    if !store.load() {
        warn!("no usable index, queries rely on the live registry only");
    }
    store
}

fn load_index(paths: &DataPaths) -> anyhow::Result<IndexStore> {
    let mut store = IndexStore::new(paths.clone());
    if !store.load() {
        bail!(
            "no usable index under {}; run `medimate build` first",
            paths.root().display()
        );
    }
    Ok(store)
}

fn select_embedder(cli: &Cli) -> anyhow::Result<Box<dyn Embedder>> {
    if cli.local_embedder {
        return Ok(Box::new(CharacterNgramEmbedder::default()));
    }

    let key = cli.embedding_key.as_deref().context(
        "remote embedding requires --embedding-key or UPSTAGE_API_KEY (or pass --local-embedder)",
    )?;
    Ok(Box::new(OpenAiEmbedder::new(
        key,
        &cli.embedding_url,
        cli.embedding_model.clone(),
        cli.embedding_dimensions,
    )?))
}

fn warn_on_model_change(store: &IndexStore, embedder: &dyn Embedder) {
    if let Some(metadata) = store.metadata() {
        if metadata.embedding_model != embedder.model_id() {
            warn!(
                indexed_with = %metadata.embedding_model,
                querying_with = embedder.model_id(),
                "query embedder differs from the one the index was built with"
            );
        }
    }
}

fn live_source(cli: &Cli) -> anyhow::Result<Option<LiveRegistrySearch<KfdaRegistry>>> {
    let Some(key) = cli.registry_key.as_deref() else {
        warn!("no registry key configured, live fallback disabled");
        return Ok(None);
    };
    let registry = KfdaRegistry::new(&cli.registry_url, key, LIVE_TIMEOUT)?;
    Ok(Some(LiveRegistrySearch::new(
        registry,
        DocumentAssembler::new()?,
    )))
}

fn retrieval_options(cli: &Cli) -> RetrievalOptions {
    RetrievalOptions {
        similarity_threshold: cli.similarity_threshold,
        ..RetrievalOptions::default()
    }
}
