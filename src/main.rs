//! Kahiko RPC - demonstration entrypoint.
//!
//! Loads configuration, registers the framework's own introspection
//! service (automatically, via [`kahiko_rpc::server::Server`]), and binds
//! the configured transport.

use clap::{Parser, Subcommand};
use kahiko_rpc::config::{ConfigLoader, KahikoConfig};
use kahiko_rpc::config::server::TransportType;
use kahiko_rpc::error::transport::TransportError;
use kahiko_rpc::error::{ErrorContext, ErrorReporting, KahikoError, KahikoResult};
use kahiko_rpc::server::Server;
use kahiko_rpc::transport;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::info;

/// Command line arguments for Kahiko RPC.
#[derive(Parser, Debug)]
#[clap(name = "Kahiko RPC", version, author, about)]
struct Args {
    /// Path to configuration file
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// Command to execute
    #[clap(subcommand)]
    command: Option<Command>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server
    Start,

    /// Validate the configuration file
    Validate,

    /// Generate a default configuration file
    GenConfig {
        /// Path to output configuration file
        #[clap(short, long, value_parser)]
        output: PathBuf,
    },
}

/// Initializes the logging system.
fn init_logging() -> KahikoResult<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_line_number(true)
        .with_file(true)
        .with_thread_names(true)
        .pretty()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| KahikoError::Custom(format!("failed to set global tracing subscriber: {e}")))
}

async fn run_start(config: KahikoConfig, reporting: &ErrorReporting) -> KahikoResult<()> {
    info!(
        name = %config.server.name,
        transport = ?config.server.transport,
        "starting kahiko-rpc"
    );

    let server = Arc::new(Server::with_max_batch_size(
        config.server.debug_errors,
        config.limits.max_batch_size,
    ));

    match config.server.transport {
        TransportType::Unix => {
            let listener = transport::bind_unix(&config.server.socket_path).map_err(KahikoError::from)?;
            info!(path = %config.server.socket_path.display(), "listening on unix socket");
            server.accept_unix(listener).await.map_err(KahikoError::from)?;
        }
        TransportType::Http => {
            // The HTTP listener (translating raw TCP bytes into an
            // `http::Request`) is host-application glue; this demonstration
            // binary hands complete requests to `Server::serve_http` but
            // does not itself own a socket-accept loop for them.
            let error = KahikoError::Custom(
                "HTTP transport requires a hosting loop outside this demonstration binary; \
                 construct a Server and call serve_http() from your own listener"
                    .to_string(),
            );
            reporting.report(ErrorContext::new(KahikoError::Custom(error.to_string()), "main"));
            return Err(error);
        }
        TransportType::WebSocket | TransportType::Stdio => {
            let error = KahikoError::from(TransportError::NotImplemented(format!(
                "{:?}",
                config.server.transport
            )));
            reporting.report(ErrorContext::new(KahikoError::Custom(error.to_string()), "main"));
            return Err(error);
        }
    }

    Ok(())
}

/// Main entry point for the application.
#[tokio::main]
async fn main() -> KahikoResult<()> {
    init_logging()?;
    let reporting = ErrorReporting::default();

    let args = <Args as clap::Parser>::parse();

    let env_prefix = "KAHIKO";
    let config_loader = ConfigLoader::new(args.config.as_deref(), env_prefix);

    match args.command.unwrap_or(Command::Start) {
        Command::Start => {
            let config = match config_loader.load() {
                Ok(config) => config,
                Err(e) => {
                    reporting.report(ErrorContext::new(KahikoError::from(e), "config"));
                    process::exit(1);
                }
            };

            if run_start(config, &reporting).await.is_err() {
                process::exit(1);
            }
            Ok(())
        }
        Command::Validate => {
            info!("validating configuration");
            match config_loader.load() {
                Ok(_) => {
                    info!("configuration validated successfully");
                    Ok(())
                }
                Err(e) => {
                    reporting.report(ErrorContext::new(KahikoError::from(e), "config"));
                    process::exit(1);
                }
            }
        }
        Command::GenConfig { output } => {
            info!("generating default configuration");
            let default_config = KahikoConfig::default();

            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent).map_err(KahikoError::Io)?;
            }

            let toml = toml::to_string_pretty(&default_config)
                .map_err(|e| KahikoError::Custom(format!("failed to serialize config: {e}")))?;

            std::fs::write(&output, toml).map_err(KahikoError::Io)?;

            info!(path = %output.display(), "default configuration written");
            Ok(())
        }
    }
}
