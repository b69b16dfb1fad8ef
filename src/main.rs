//! Binary entrypoint for the questbank CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and the default catalog files
//! - `start` - open the store, run the background sweeps until Ctrl-C, then persist everything
//! - `status` - print stored accounts, booth registry and catalog summary
//! - `inspect <account>` - print one stored account record as JSON
//!
//! See the library crate docs for module-level details: `questbank::`.
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use questbank::config::Config;
use questbank::economy::{
    format_amount, start_sweeps, Catalog, EconomyService, EconomyStore, Pocket,
};

#[derive(Parser)]
#[command(name = "questbank")]
#[command(about = "Wallet/bank ledger, loans, quests and booths for a game economy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write default configuration and catalog files
    Init,
    /// Run the economy service until interrupted
    Start,
    /// Show stored accounts, booths and catalog
    Status,
    /// Print a stored account record as JSON
    Inspect {
        /// Account identifier
        account: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init runs before a config exists
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => init(&cli.config).await,
        Commands::Start => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            start(config).await
        }
        Commands::Status => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            status(&config)
        }
        Commands::Inspect { account } => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            inspect(&config, &account)
        }
    }
}

async fn init(config_path: &str) -> Result<()> {
    if Path::new(config_path).exists() {
        warn!("{} already exists, leaving it unchanged", config_path);
    } else {
        Config::create_default(config_path).await?;
        info!("Wrote default configuration to {}", config_path);
    }
    let config = Config::load(config_path).await?;

    let currencies = Path::new(&config.catalog.currencies_file);
    let quests = Path::new(&config.catalog.quests_file);
    if currencies.exists() || quests.exists() {
        warn!("catalog files already exist, leaving them unchanged");
    } else {
        Catalog::write_defaults(currencies, quests)?;
        info!(
            "Wrote default catalog to {} and {}",
            currencies.display(),
            quests.display()
        );
    }

    tokio::fs::create_dir_all(&config.storage.data_dir).await?;
    println!("Questbank initialized. Edit {} and run `questbank start`.", config_path);
    Ok(())
}

fn load_catalog(config: &Config) -> Result<Catalog> {
    let currencies = Path::new(&config.catalog.currencies_file);
    let quests = Path::new(&config.catalog.quests_file);
    if !currencies.exists() || !quests.exists() {
        warn!("catalog files missing, using built-in defaults (run `questbank init`)");
        return Ok(Catalog::defaults());
    }
    Catalog::load_from_files(currencies, quests)
        .map_err(|e| anyhow!("Failed to load catalog: {}", e))
}

async fn start(config: Config) -> Result<()> {
    config.validate()?;
    info!("Starting questbank v{}", env!("CARGO_PKG_VERSION"));

    let catalog = load_catalog(&config)?;
    let store = Arc::new(EconomyStore::open(&config.storage.data_dir)?);
    let service = Arc::new(
        EconomyService::builder(store, catalog)
            .with_loan_terms(config.loan_terms()?)
            .with_interaction_timeout(config.economy.interaction_timeout_seconds)
            .build()?,
    );
    info!("Loan terms: {}", service.loan_terms().summary());

    let sweeps = start_sweeps(service.clone(), config.sweep_intervals());
    info!("{} background sweeps running; press Ctrl-C to stop", sweeps.running());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    sweeps.stop().await;
    let stats = service.shutdown().await?;
    info!(
        "Shutdown complete: {} account writes, {} failures",
        stats.accounts_written, stats.write_failures
    );
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    let store = EconomyStore::open(&config.storage.data_dir)?;

    println!("Questbank Status:");
    println!("  Data directory: {}", config.storage.data_dir);
    println!("  Stored accounts: {}", store.account_count());
    println!("  Loans: {}", config.loan_terms()?.summary());

    let booths = store.list_booths()?;
    println!("  Booths: {}", booths.len());
    for booth in &booths {
        println!("    {} @ {}", booth.id, booth.location);
    }

    println!("  Currencies: {}", catalog.currencies().len());
    for currency in catalog.currencies() {
        println!(
            "    {} ({}, {})",
            currency.key, currency.display_name, currency.symbol
        );
    }
    println!("  Quests: {}", catalog.quests().len());
    for quest in catalog.quests() {
        println!(
            "    {} [{} {} x{}]",
            quest.id,
            quest.objective.kind(),
            quest.objective.target(),
            quest.objective.required_amount()
        );
    }
    Ok(())
}

fn inspect(config: &Config, account: &str) -> Result<()> {
    let store = EconomyStore::open(&config.storage.data_dir)?;
    let record = store
        .find_account(account)?
        .ok_or_else(|| anyhow!("No stored account '{}'", account))?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    let catalog = load_catalog(config)?;
    for currency in catalog.currencies() {
        let wallet = record
            .pocket(Pocket::Wallet)
            .get(&currency.key)
            .copied()
            .unwrap_or_default();
        let bank = record
            .pocket(Pocket::Bank)
            .get(&currency.key)
            .copied()
            .unwrap_or_default();
        println!(
            "{}: wallet {}, bank {}",
            currency.display_name,
            format_amount(wallet, currency),
            format_amount(bank, currency)
        );
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok());
    let base_level = match verbosity {
        0 => configured.unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|cfg| cfg.logging.file.clone());
    let opened = log_file.and_then(|file| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
            .ok()
    });

    if let Some(f) = opened {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
