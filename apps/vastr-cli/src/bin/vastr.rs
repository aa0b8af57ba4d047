use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vastr_core::catalog::JsonCatalog;
use vastr_core::config::{Config, Settings};
use vastr_core::types::SearchFilters;
use vastr_embed::ImageInput;
use vastr_hybrid::{SearchRequest, SearchService, ServiceError};
use vastr_vector::{merge_stores, MergePolicy, StoreMetadata, VectorStore};

#[derive(Parser)]
#[command(name = "vastr", version, about = "Hybrid text and image search over a fashion catalog")]
struct Cli {
    /// Directory holding config.toml and config.<env>.toml
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,
    /// Catalog file or directory, overrides catalog.path
    #[arg(long, global = true)]
    catalog: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge vector store files into one, de-duplicating product ids.
    /// Writes npz unless the output ends in `.safetensors`.
    MergeStores {
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value_t = MergePolicy::FirstWins)]
        policy: MergePolicy,
    },
    #[command(flatten)]
    Query(QueryCommand),
}

// Commands that need a built search service.
#[derive(Subcommand)]
enum QueryCommand {
    /// Hybrid BM25 + TF-IDF text search
    Search(SearchArgs),
    /// Products whose stored image embedding is closest to the given image
    ImageSearch(ImageArgs),
    /// Title and product type completions for a fragment
    Suggest {
        fragment: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Products similar to a catalog product
    Similar {
        product_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Index and readiness summary
    Stats,
}

#[derive(Args)]
struct SearchArgs {
    query: String,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long)]
    product_type: Option<String>,
    #[arg(long)]
    available_only: bool,
    #[arg(long)]
    bm25_weight: Option<f32>,
    #[arg(long)]
    cosine_weight: Option<f32>,
}

#[derive(Args)]
#[group(required = true, multiple = false, id = "source")]
struct ImageSource {
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    base64: Option<String>,
}

#[derive(Args)]
struct ImageArgs {
    #[command(flatten)]
    source: ImageSource,
    #[arg(long)]
    limit: Option<usize>,
}

impl ImageSource {
    fn into_input(self) -> Result<ImageInput> {
        match (self.file, self.url, self.base64) {
            (Some(path), _, _) => {
                let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
                Ok(ImageInput::Bytes(bytes))
            }
            (_, Some(url), _) => Ok(ImageInput::Url(url)),
            (_, _, Some(data)) => Ok(ImageInput::Base64(data)),
            _ => anyhow::bail!("one of --file, --url or --base64 is required"),
        }
    }
}

#[derive(Serialize)]
struct MergeSummary {
    output: PathBuf,
    policy: String,
    rows: usize,
    dim: usize,
    dropped: usize,
    duplicated: Vec<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn emit<T: Serialize>(result: Result<T, ServiceError>) -> Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            eprintln!("Error ({}): {}", e.status_code(), e);
            std::process::exit(1);
        }
    }
}

fn build_service(cli_catalog: Option<String>, config_dir: &std::path::Path, mut settings: Settings, with_image: bool) -> SearchService {
    if let Some(path) = cli_catalog { settings.catalog.path = path; }
    settings.resolve_paths(config_dir);
    let catalog = JsonCatalog::new(&settings.catalog.path);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Building search index from {}", catalog.path().display()));
    let service = if with_image {
        SearchService::start(Arc::new(catalog), settings)
    } else {
        SearchService::new(Arc::new(catalog), settings)
    };
    spinner.finish_and_clear();
    service
}

fn merge(output: PathBuf, inputs: Vec<PathBuf>, policy: MergePolicy) -> Result<()> {
    tracing::info!(inputs = inputs.len(), %policy, "merging vector stores");
    let mut stores = Vec::with_capacity(inputs.len());
    for path in &inputs {
        stores.push(VectorStore::read(path).with_context(|| format!("reading {}", path.display()))?);
    }
    let mut outcome = merge_stores(&stores, policy)?;
    outcome.store.metadata = StoreMetadata::stamped(inputs.iter().map(|p| p.display().to_string()).collect());
    outcome.store.write(&output)?;
    print_json(&MergeSummary {
        output,
        policy: policy.to_string(),
        rows: outcome.store.len(),
        dim: outcome.store.dim(),
        dropped: outcome.dropped,
        duplicated: outcome.duplicated,
    })
}

fn main() -> Result<()> {
    init_tracing();
    let Cli { config_dir, catalog, command } = Cli::parse();
    let command = match command {
        Command::MergeStores { output, inputs, policy } => return merge(output, inputs, policy),
        Command::Query(query) => query,
    };

    let config = Config::load_from(&config_dir).map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let with_image = matches!(command, QueryCommand::ImageSearch(_) | QueryCommand::Stats);
    let service = build_service(catalog, &config_dir, settings, with_image);

    match command {
        QueryCommand::Search(args) => {
            let filters = SearchFilters {
                brand_id: args.brand,
                min_price: args.min_price,
                max_price: args.max_price,
                product_type: args.product_type,
                available_only: args.available_only,
            };
            let request = SearchRequest {
                query: args.query,
                limit: args.limit,
                bm25_weight: args.bm25_weight,
                cosine_weight: args.cosine_weight,
                filters,
            };
            emit(service.search(&request))
        }
        QueryCommand::ImageSearch(args) => {
            let input = args.source.into_input()?;
            let service = Arc::new(service);
            let result = tokio::runtime::Runtime::new()?.block_on(service.image_search_async(input, args.limit));
            emit(result)
        }
        QueryCommand::Suggest { fragment, limit } => emit(service.suggest(&fragment, limit)),
        QueryCommand::Similar { product_id, limit } => emit(service.similar(&product_id, limit)),
        QueryCommand::Stats => print_json(&service.stats()),
    }
}
