mod collect;

use bizscout_collector::Platform;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bizscout")]
#[command(about = "Collect business contact records from listings, web search and the places API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Page through a server-rendered business directory
    Listing {
        /// Results page URL with a `{page}` placeholder
        #[arg(long)]
        url_template: String,

        /// What is being searched for; recorded on every record
        #[arg(long)]
        query: String,

        #[arg(long, default_value = "")]
        location: String,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Visit sites returned by a web search and harvest their contacts
    Web {
        #[arg(long)]
        query: String,

        #[arg(long, default_value = "")]
        location: String,

        /// Extra search term describing the kind of business
        #[arg(long, default_value = "")]
        niche: String,

        /// Keep only stores running on this platform (e.g. shopify)
        #[arg(long)]
        platform: Option<Platform>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Query the places API; falls back to a directory when it has nothing
    Places {
        #[arg(long)]
        query: String,

        #[arg(long, default_value = "")]
        location: String,

        /// Directory results URL (with `{page}`) used when the API yields nothing
        #[arg(long)]
        fallback_url_template: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Per-run overrides of the environment configuration.
#[derive(Debug, Clone, Default, Args)]
struct RunArgs {
    /// Records to collect
    #[arg(long)]
    target: Option<usize>,

    /// Candidates processed concurrently per batch
    #[arg(long)]
    concurrency: Option<usize>,

    /// Accept records with neither a website nor an Instagram profile
    #[arg(long)]
    allow_incomplete: bool,

    /// Normalize and validate records before printing them
    #[arg(long)]
    clean: bool,

    /// Country calling code prefixed to bare national numbers when cleaning
    #[arg(long, requires = "clean")]
    country_code: Option<String>,

    #[arg(long)]
    country: Option<String>,

    #[arg(long)]
    state: Option<String>,

    /// Places API key
    #[arg(long, env = "BIZSCOUT_PLACES_API_KEY", hide_env_values = true)]
    places_api_key: Option<String>,

    /// Skip image downloads
    #[arg(long)]
    no_images: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = bizscout_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };
    collect::run_command(config, command).await
}

#[cfg(test)]
mod tests;
