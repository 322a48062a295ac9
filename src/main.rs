//! # Scholar Site CLI (`scholar`)
//!
//! The `scholar` binary serves an academic personal site: a content API
//! with fuzzy search, and an offline caching proxy in front of it.
//!
//! ## Usage
//!
//! ```bash
//! scholar --config ./config/scholar.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scholar init` | Create the offline store (SQLite) |
//! | `scholar content` | Summarize the loaded content file |
//! | `scholar search "<query>"` | Fuzzy search over research, publications, courses |
//! | `scholar search --interactive` | Debounced search from stdin |
//! | `scholar cache list` | List offline caches |
//! | `scholar cache clear` | Delete stale caches (`--all` for every cache) |
//! | `scholar sync <tag>` | Replay queued submissions for a sync tag |
//! | `scholar serve api` | Start the content server |
//! | `scholar serve proxy` | Start the offline proxy |
//! | `scholar completions <shell>` | Print shell completions |
//!
//! Diagnostics go to stderr via `tracing`; set `RUST_LOG` (default `info`).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use scholar_site::{cache_cmd, config, content, migrate, proxy, search, server};

/// Scholar Site: content API, fuzzy search, and offline proxy for an
/// academic personal website.
#[derive(Parser)]
#[command(name = "scholar", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/scholar.toml`.
    #[arg(long, global = true, default_value = "./config/scholar.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the offline store schema. Safe to run repeatedly.
    Init,

    /// Print a summary of the content file and search index.
    Content,

    /// Fuzzy search the site.
    Search {
        /// The search query. Required unless `--interactive` is given.
        #[arg(required_unless_present = "interactive")]
        query: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Read queries from stdin, one per line, with debouncing.
        #[arg(long, short = 'i', conflicts_with = "query")]
        interactive: bool,
    },

    /// Inspect or clear the offline caches.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Replay queued form submissions for a background-sync tag.
    Sync {
        /// Sync tag, e.g. `contact-form` or `analytics`.
        tag: String,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Generate shell completions and print to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List caches with entry counts.
    List,
    /// Delete caches from older versions.
    Clear {
        /// Delete every cache, including the current ones.
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Content API and HTML pages on `[server].bind`.
    Api,
    /// Offline caching proxy on `[offline].bind`.
    Proxy {
        /// Stay installed but inactive until a `SKIP_WAITING` message.
        #[arg(long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(
            *shell,
            &mut Cli::command(),
            "scholar",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Offline store initialized at {}", cfg.offline.db_path.display());
        }
        Commands::Content => {
            content::run_content_summary(&cfg)?;
        }
        Commands::Search {
            query,
            limit,
            interactive,
        } => {
            if interactive {
                search::run_interactive(&cfg).await?;
            } else {
                search::run_search(&cfg, query.as_deref().unwrap_or(""), limit)?;
            }
        }
        Commands::Cache { action } => match action {
            CacheAction::List => cache_cmd::run_cache_list(&cfg).await?,
            CacheAction::Clear { all } => cache_cmd::run_cache_clear(&cfg, all).await?,
        },
        Commands::Sync { tag } => {
            cache_cmd::run_sync(&cfg, &tag).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => server::run_server(&cfg).await?,
            ServeService::Proxy { wait } => proxy::run_proxy(&cfg, wait).await?,
        },
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
