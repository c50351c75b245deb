//! A3S Image Search CLI - image meta search server and command line client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use a3s_image_search::{server, sources, ApiKeys, AppConfig, ResilientFetcher, Search, TokenCodec};

/// A3S Image Search - image meta search engine
#[derive(Parser)]
#[command(name = "a3s-image-search")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Run one aggregated search and print the results
    Search(SearchArgs),

    /// List available image sources
    Sources,
}

#[derive(Args)]
struct ConfigArgs {
    /// Unsplash access key
    #[arg(long, env = "UNSPLASH_ACCESS_KEY", hide_env_values = true)]
    unsplash_key: Option<String>,

    /// Pexels API key
    #[arg(long, env = "PEXELS_API_KEY", hide_env_values = true)]
    pexels_key: Option<String>,

    /// Pixabay API key
    #[arg(long, env = "PIXABAY_API_KEY", hide_env_values = true)]
    pixabay_key: Option<String>,

    /// Secret for opaque result tokens
    #[arg(long, env = "IMAGE_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// Per-source timeout in seconds
    #[arg(long, default_value = "30")]
    source_timeout: u64,
}

impl ConfigArgs {
    fn into_config(self) -> AppConfig {
        let mut config = AppConfig {
            api_keys: ApiKeys {
                unsplash: self.unsplash_key,
                pexels: self.pexels_key,
                pixabay: self.pixabay_key,
            },
            source_timeout_secs: self.source_timeout,
            ..Default::default()
        };
        if let Some(secret) = self.token_secret {
            config.token_secret = secret;
        }
        config
    }
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Address to listen on
    #[arg(short, long, env = "IMAGE_SEARCH_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Hide internal error detail from clients
    #[arg(long, env = "IMAGE_SEARCH_PRODUCTION")]
    production: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Search query
    query: String,

    /// Overall result limit used to size per-source quotas
    #[arg(short, long, default_value = "100")]
    limit: usize,

    /// Sources to use (comma-separated shortcuts, see `sources`)
    #[arg(short, long, value_delimiter = ',')]
    sources: Option<Vec<String>>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Seed for a reproducible result order
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output with results and summary
    Json,
    /// Compact single-line output
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Search(args) => run_search(args).await,
        Commands::Sources => list_sources(),
    }
}

fn warn_if_development_secret(config: &AppConfig) {
    if config.uses_development_secret() {
        warn!("No IMAGE_TOKEN_SECRET set; using the built-in development secret");
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = args.config.into_config();
    config.bind = args.bind;
    config.production = args.production;
    warn_if_development_secret(&config);

    server::serve(config).await?;
    Ok(())
}

fn list_sources() -> Result<()> {
    let config = AppConfig::default();
    let fetcher = Arc::new(ResilientFetcher::new()?);
    let client = reqwest::Client::builder().build()?;
    let all = sources::default_sources(&config, client, fetcher);

    println!("Available image sources:\n");
    for source in &all {
        println!(
            "  {:<10} - {:<18} {:?}, {:?} tier (quota for 100: {})",
            source.shortcut(),
            source.name(),
            source.config().kind,
            source.tier(),
            source.tier().quota(100)
        );
    }
    println!();
    println!("Unsplash, Pexels and Pixabay need API keys (see --help).");
    println!("Usage: a3s-image-search search \"query\" -s unsplash,wikimedia,ddgimg");
    Ok(())
}

async fn run_search(args: SearchArgs) -> Result<()> {
    let config = args.config.into_config();
    config.validate()?;

    let codec = Arc::new(TokenCodec::new(&config.token_secret));
    let fetcher = Arc::new(ResilientFetcher::new()?);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.source_timeout_secs))
        .build()?;

    let mut search = Search::new(&config, codec);
    if let Some(seed) = args.seed {
        search = search.with_seed(seed);
    }

    for source in sources::default_sources(&config, client, fetcher) {
        let selected = match &args.sources {
            Some(wanted) => wanted.iter().any(|s| s == source.shortcut()),
            None => true,
        };
        if selected {
            search.add_shared_source(source);
        }
    }

    if search.source_count() == 0 {
        anyhow::bail!("No valid sources specified");
    }

    let response = search.search(&args.query, args.limit).await?;

    match args.format {
        OutputFormat::Text => {
            let summary = &response.summary;
            println!(
                "\nImage results for \"{}\" ({} unique of {} found, {}ms):\n",
                summary.query,
                summary.deduplication.after_dedup,
                summary.deduplication.before_dedup,
                summary.timing.total_ms
            );

            for (i, result) in response.items().iter().enumerate() {
                println!("{}. {}", i + 1, result.title);
                println!("   URL: {}", result.download_url);
                println!(
                    "   {}x{} | {} | {:?} | by {}",
                    result.width,
                    result.height,
                    result.size_estimate,
                    result.copyright.status,
                    result.photographer
                );
                println!("   Sources: {}", result.sources.join(", "));
                println!();
            }

            println!("Sources:");
            for report in &summary.sources {
                match &report.error {
                    None => println!(
                        "  {:<18} {:>3} results in {}ms",
                        report.name, report.count, report.duration_ms
                    ),
                    Some(err) => println!("  {:<18} failed: {}", report.name, err),
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Compact => {
            for result in response.items() {
                println!("{}\t{}\t{}", result.title, result.download_url, result.sources.join(","));
            }
        }
    }

    Ok(())
}
