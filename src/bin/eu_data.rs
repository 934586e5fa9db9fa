use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use eu_data_tool::app::EuDataClient;
use eu_data_tool::config::{ClientConfig, ConfigLoader};
use eu_data_tool::domain::{SortBy, SortOrder};
use eu_data_tool::error::EuDataError;
use eu_data_tool::output::JsonOutput;
use eu_data_tool::search::SearchQuery;

#[derive(Parser)]
#[command(name = "eu-data")]
#[command(about = "Metadata, distributions and content of data.europa.eu datasets")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to ./eu-data.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    cache_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    no_cache: bool,

    /// Bypass cached entries and refetch
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show normalized dataset metadata")]
    Metadata(MetadataArgs),
    #[command(about = "List dataset distributions")]
    Formats(UriArgs),
    #[command(about = "Download the best matching distribution")]
    Content(ContentArgs),
    #[command(about = "Search datasets via SPARQL")]
    Search(SearchArgs),
    #[command(about = "Clear cached entries for a dataset, or everything")]
    ClearCache(ClearArgs),
}

#[derive(Args)]
struct UriArgs {
    uri: String,
}

#[derive(Args)]
struct MetadataArgs {
    uri: String,

    #[arg(long)]
    locale: Option<String>,
}

#[derive(Args)]
struct ContentArgs {
    uri: String,

    /// Preferred formats in order, e.g. --format CSV --format JSON
    #[arg(long = "format")]
    formats: Vec<String>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    keyword: Option<String>,

    #[arg(long)]
    topic: Option<String>,

    #[arg(long)]
    publisher: Option<String>,

    #[arg(long)]
    date_from: Option<String>,

    #[arg(long)]
    date_to: Option<String>,

    #[arg(long)]
    language: Option<String>,

    #[arg(long, value_enum, default_value_t = SortBy::Date)]
    sort_by: SortBy,

    #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
    sort_order: SortOrder,

    #[arg(long = "format")]
    formats: Vec<String>,

    #[arg(long, default_value_t = 10)]
    limit: usize,

    #[arg(long, default_value_t = 0)]
    offset: usize,
}

#[derive(Args)]
struct ClearArgs {
    uri: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<EuDataError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EuDataError) -> u8 {
    match error {
        error if error.is_not_found() => 2,
        EuDataError::Http(_)
        | EuDataError::HttpStatus { .. }
        | EuDataError::SparqlFallback(_)
        | EuDataError::AllStrategiesFailed { .. }
        | EuDataError::MetadataUnavailable(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = cache_dir;
    } else if config.cache_dir == ClientConfig::default().cache_dir {
        if let Ok(user_dir) = ClientConfig::user_cache_dir() {
            config.cache_dir = user_dir;
        }
    }
    if cli.no_cache {
        config.cache_enabled = false;
    }

    let client = EuDataClient::from_config(config)?;
    let force = cli.force;

    match cli.command {
        Commands::Metadata(args) => {
            let metadata = client.get_dataset_metadata(&args.uri, args.locale.as_deref(), force)?;
            JsonOutput::print_metadata(&metadata).into_diagnostic()
        }
        Commands::Formats(args) => {
            let distributions = client.get_distribution_formats(&args.uri, force);
            JsonOutput::print_formats(&distributions).into_diagnostic()
        }
        Commands::Content(args) => {
            let formats = normalize_formats(args.formats);
            let content = client.get_dataset_content(&args.uri, formats.as_deref(), force)?;
            JsonOutput::print_content(&content, args.output.as_deref()).into_diagnostic()
        }
        Commands::Search(args) => {
            let query = SearchQuery {
                keyword: args.keyword,
                topic: args.topic,
                publisher: args.publisher,
                date_from: args.date_from,
                date_to: args.date_to,
                language: args.language,
                sort_by: args.sort_by,
                sort_order: args.sort_order,
                preferred_formats: normalize_formats(args.formats),
                limit: args.limit,
                offset: args.offset,
            };
            let results = client.search_datasets(&query, force)?;
            JsonOutput::print_search(&results).into_diagnostic()
        }
        Commands::ClearCache(args) => {
            let result = client.clear_cache(args.uri.as_deref());
            JsonOutput::print_clear(&result).into_diagnostic()
        }
    }
}

fn normalize_formats(formats: Vec<String>) -> Option<Vec<String>> {
    let formats: Vec<String> = formats
        .into_iter()
        .map(|format| format.trim().to_uppercase())
        .filter(|format| !format.is_empty())
        .collect();
    (!formats.is_empty()).then_some(formats)
}
