// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use mandex::db::models::{Execution, IndexMeta, ManualPage, Package, Redirect};
use mandex::render::Mandoc;
use mandex::repository::RepositoryClient;
use mandex::{Indexer, IndexerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const DEFAULT_DB_PATH: &str = "/var/lib/mandex/mandex.db";

#[derive(Parser)]
#[command(name = "mandex")]
#[command(author, version, about = "Incremental indexer for manual pages shipped in Arch Linux packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the mandex database
    Init {
        /// Database path (default: /var/lib/mandex/mandex.db)
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Fetch the files index and index new or updated packages
    Index {
        /// Database path (default: /var/lib/mandex/mandex.db)
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
        /// Repository to index
        #[arg(short, long, default_value = "core")]
        repo: String,
        /// Package architecture
        #[arg(short, long, default_value = "x86_64")]
        arch: String,
        /// Mirror URL template ($repo and $arch are substituted)
        #[arg(short, long)]
        mirror: Option<String>,
        /// pacman mirrorlist URL, used when no mirror is given
        #[arg(long)]
        mirrorlist_url: Option<String>,
        /// Directory for the files index and downloaded packages
        #[arg(short, long, default_value = "/var/cache/mandex")]
        work_dir: PathBuf,
        /// mandoc binary used for rendering
        #[arg(long, default_value = "mandoc")]
        mandoc: PathBuf,
        /// HTTP timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        /// Download attempts per file
        #[arg(long, default_value_t = 3)]
        retries: u32,
    },
    /// Show a manual page, following redirects
    Show {
        /// Page name
        name: String,
        /// Section (optional)
        section: Option<String>,
        /// Locale (optional, prefers en)
        #[arg(short, long)]
        locale: Option<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = ShowFormat::Text)]
        format: ShowFormat,
        /// Database path (default: /var/lib/mandex/mandex.db)
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// List indexed packages
    Packages {
        /// Package name pattern (optional, shows all if omitted)
        pattern: Option<String>,
        /// Database path (default: /var/lib/mandex/mandex.db)
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Show recent indexer runs and corpus totals
    History {
        /// Number of runs to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// Database path (default: /var/lib/mandex/mandex.db)
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ShowFormat {
    Text,
    Html,
    Raw,
}

fn format_time(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { db_path }) => {
            info!("Initializing mandex database at: {}", db_path);
            mandex::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Some(Commands::Index {
            db_path,
            repo,
            arch,
            mirror,
            mirrorlist_url,
            work_dir,
            mandoc,
            timeout,
            retries,
        }) => {
            mandex::db::init(&db_path)?;
            let mut conn = mandex::db::open(&db_path)?;

            let mut config = IndexerConfig::default()
                .repo(repo)
                .arch(arch)
                .work_dir(work_dir)
                .mandoc(mandoc);
            config.mirror = mirror;
            config.mirrorlist_url = mirrorlist_url;
            config.http_timeout = Duration::from_secs(timeout);
            config.max_retries = retries;

            let client =
                RepositoryClient::new(&config.user_agent, config.http_timeout, config.max_retries)?;
            let renderer = Mandoc::new(config.mandoc.clone());

            let summary = Indexer::new(config, &mut conn, client, renderer).run()?;

            println!("Indexing complete in {}s", summary.execution_time);
            println!("  New packages: {}", summary.new_pkgs);
            println!("  Updated packages: {}", summary.updated_pkgs);
            if summary.failed_pkgs > 0 {
                println!("  Failed packages: {}", summary.failed_pkgs);
            }
            println!("  Pages written: {}", summary.pages_written);
            println!("  Redirects recorded: {}", summary.redirects);
            println!(
                "  .so links resolved: {} ({} pending)",
                summary.so_links.resolved, summary.so_links.unresolved
            );
            Ok(())
        }
        Some(Commands::Show {
            name,
            section,
            locale,
            format,
            db_path,
        }) => {
            let conn = mandex::db::open(&db_path)?;

            let page = mandex::resolver::follow_redirects(
                &conn,
                &name,
                section.as_deref(),
                locale.as_deref(),
            )?
            .ok_or_else(|| anyhow::anyhow!("No manual entry for {}", name))?;

            match format {
                ShowFormat::Text => print!("{}", page.txt_content),
                ShowFormat::Html => print!("{}", page.html_content),
                ShowFormat::Raw => print!("{}", page.content),
            }
            Ok(())
        }
        Some(Commands::Packages { pattern, db_path }) => {
            let conn = mandex::db::open(&db_path)?;

            let packages: Vec<Package> = Package::list_all(&conn)?
                .into_iter()
                .filter(|p| pattern.as_deref().is_none_or(|pat| p.name.contains(pat)))
                .collect();

            if packages.is_empty() {
                println!("No packages found.");
            } else {
                println!("Indexed packages:");
                for package in &packages {
                    println!(
                        "  {} {} [{}] ({} man pages)",
                        package.name,
                        package.version,
                        package.repo,
                        package.man_paths.len()
                    );
                }
                println!("\nTotal: {} package(s)", packages.len());
            }
            Ok(())
        }
        Some(Commands::History { limit, db_path }) => {
            let conn = mandex::db::open(&db_path)?;

            let meta = IndexMeta::get(&conn)?;
            println!(
                "Index timestamp: {}",
                if meta.timestamp > 0 {
                    format_time(meta.timestamp)
                } else {
                    "never".to_string()
                }
            );
            println!(
                "Packages with man pages: {} of {}",
                meta.haveman_pkgs, meta.total_pkgs
            );
            println!(
                "Stored pages: {}, redirects: {}",
                ManualPage::count(&conn)?,
                Redirect::count(&conn)?
            );

            let executions = Execution::list_recent(&conn, limit)?;
            if executions.is_empty() {
                println!("\nNo indexer runs recorded.");
            } else {
                println!("\nRecent runs:");
                for execution in &executions {
                    println!(
                        "  {} - {}s, {} packages, {} pages",
                        format_time(execution.start_time),
                        execution.execution_time,
                        execution.updated_pkgs,
                        execution.updated_pages
                    );
                }
            }
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "mandex", &mut std::io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("mandex v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'mandex --help' for usage information");
            Ok(())
        }
    }
}
