use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use imagedrop::{Config, create_app, startup_checks};

/// Environment variable overriding the configured port.
const PORT_ENV: &str = "PORT";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Global options that apply to all commands
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Log level; defaults to the configured `app.log_level`
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server (default if no command specified)
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Automatically quit after specified number of seconds (useful for testing)
        #[arg(long)]
        quit_after: Option<u64>,
    },

    /// Print the effective configuration and exit
    ShowConfig,
}

fn load_config(path: &Path) -> Result<(Config, bool), Box<dyn std::error::Error>> {
    if path.exists() {
        let config_content = std::fs::read_to_string(path)?;
        Ok((toml_edit::de::from_str::<Config>(&config_content)?, true))
    } else {
        Ok((Config::default(), false))
    }
}

fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG wins over the configured level when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (config, from_file) = load_config(&cli.config)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.app.log_level.clone())
        .to_lowercase();
    init_logging(&level)?;

    if from_file {
        info!("Configuration loaded from: {:?}", cli.config);
    } else {
        info!("Config file not found at {:?}, using defaults", cli.config);
    }

    match cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Serve {
            port,
            host,
            quit_after,
        }) => run_server(config, port, host, quit_after).await,
        None => {
            // Default to serve command if no subcommand specified
            run_server(config, None, None, None).await
        }
    }
}

/// Port precedence: command line, then environment, then configuration file.
fn resolve_port(cli_port: Option<u16>, config: &Config) -> u16 {
    if let Some(port) = cli_port {
        return port;
    }
    match std::env::var(PORT_ENV) {
        Ok(value) => match value.trim().parse::<u16>() {
            Ok(port) => port,
            Err(e) => {
                tracing::warn!("Ignoring invalid {}={:?}: {}", PORT_ENV, value, e);
                config.server.port
            }
        },
        Err(_) => config.server.port,
    }
}

async fn run_server(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    quit_after: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or(config.server.host.clone());
    let port = resolve_port(port, &config);

    info!("Starting {} server", config.app.name);
    info!(
        "Static files directory: {:?}",
        config.static_files.directory
    );
    info!("Upload directory: {:?}", config.storage.upload_directory);
    info!(
        "Thumbnails directory: {:?}",
        config.storage.thumbnail_directory
    );
    match &config.post_process.command {
        Some(command) if !command.is_empty() => info!("Post-processing command: {:?}", command),
        _ => info!("Post-processing disabled"),
    }

    // Perform startup checks
    match startup_checks::perform_startup_checks(&config).await {
        Ok(()) => info!("All startup checks passed"),
        Err(errors) => {
            for error in &errors {
                tracing::error!("Startup check failed: {}", error);
            }

            if errors.iter().any(startup_checks::StartupCheckError::is_critical) {
                tracing::error!("Critical startup check failed, exiting");
                return Err("Critical startup check failed".into());
            } else {
                tracing::warn!("Non-critical startup checks failed, continuing");
            }
        }
    }

    let app = create_app(config).await;

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Set up graceful shutdown
    let server = axum::serve(listener, app);
    let graceful = server.with_graceful_shutdown(shutdown_signal(quit_after));

    if let Err(e) = graceful.await {
        tracing::error!("Server error: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C, SIGTERM, or when the optional quit timer expires.
async fn shutdown_signal(quit_after: Option<u64>) {
    use std::future::pending;
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => "Ctrl+C",
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                pending().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = pending::<&str>();

    let quit_timer = async {
        match quit_after {
            Some(seconds) => {
                info!("Server will shut down after {} seconds", seconds);
                tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
                "quit timer"
            }
            None => pending().await,
        }
    };

    let reason = tokio::select! {
        reason = ctrl_c => reason,
        reason = terminate => reason,
        reason = quit_timer => reason,
    };
    info!("Shutting down ({})", reason);
}
