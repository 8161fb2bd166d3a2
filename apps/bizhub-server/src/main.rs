use anyhow::Result;
use bizkit::{InMemoryPersistence, ModuleRegistry, ShutdownOptions};
use bizkit_bootstrap::{AppConfig, CliArgs};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

mod registered_modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Bizhub Server - multi-tenant business backend
#[derive(Parser)]
#[command(name = "bizhub-server")]
#[command(about = "Bizhub Server - multi-tenant business backend")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
    /// Print the module initialization order and exit
    Modules,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);
    config.validate()?;

    let logging_config = config.logging.clone().unwrap_or_default();
    bizkit_bootstrap::logging::init_logging_unified(&logging_config, &config.home_dir());

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    // Dispatch subcommands (default: run)
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
        Commands::Modules => print_modules(&config).await,
    }
}

async fn run_server(config: AppConfig) -> Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        api_root = %config.server.api_root,
        "Bizhub Server starting"
    );

    let config = Arc::new(config);
    let mut run_options = config.run_options(ShutdownOptions::Signals);
    // No database backend yet; the catalog still enforces table ownership.
    run_options.persistence = Some(Arc::new(InMemoryPersistence::new()));

    bizkit::run(run_options, registered_modules::all()).await
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}

async fn print_modules(config: &AppConfig) -> Result<()> {
    let registry = ModuleRegistry::with_strict_order(config.runtime.strict_registration_order);
    for module in registered_modules::all() {
        registry.register(module).await?;
    }

    let infos = registry.modules();
    for (i, name) in registry.initialization_order()?.iter().enumerate() {
        let Some(info) = infos.iter().find(|m| &m.name == name) else {
            continue;
        };
        if info.dependencies.is_empty() {
            println!("{}. {} v{}", i + 1, info.name, info.version);
        } else {
            println!(
                "{}. {} v{} (depends on: {})",
                i + 1,
                info.name,
                info.version,
                info.dependencies.join(", ")
            );
        }
    }
    Ok(())
}
