//! Rendezvous - registry, demo lamp host and caller console.
//!
//! ```text
//! rendezvous registry                 # run the registry on localhost:7777
//! rendezvous lamp --name desk         # host `toggle` and `isOn`
//! rendezvous call toggle              # one invocation
//! rendezvous console                  # interactive toggle/status loop
//! ```

mod console;
mod lamp;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lamp::Lamp;
use rendezvous_core::protocol::RegisterResponse;
use rendezvous_core::{
    Endpoint, RegistryClient, RegistryConfig, RegistryServer, RpcClient, RpcServer, ServerConfig,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "rendezvous")]
#[command(about = "Registry-mediated remote function calls")]
struct Args {
    /// Registry host
    #[arg(long, global = true, default_value = RegistryConfig::DEFAULT_HOST)]
    registry_host: String,

    /// Registry port
    #[arg(long, global = true, default_value_t = RegistryConfig::DEFAULT_PORT)]
    registry_port: u16,

    /// Enable debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the registry until Ctrl-C
    Registry {
        /// Host to bind to (defaults to --registry-host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to --registry-port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Host a demo lamp exposing `toggle` and `isOn`
    Lamp {
        /// Lamp name
        #[arg(long, default_value = "Living Room Lamp")]
        name: String,

        /// Host to bind to
        #[arg(long, default_value = RegistryConfig::DEFAULT_HOST)]
        host: String,

        /// Port to listen on (0 = auto-assign)
        #[arg(short, long, default_value = "0")]
        port: u16,

        /// Host name announced to the registry
        #[arg(long, default_value = RegistryConfig::DEFAULT_HOST)]
        advertise_host: String,
    },

    /// Invoke one function and print its result
    Call {
        /// Function name
        function: String,

        /// Positional arguments as JSON; anything unparsable is sent as a string
        args: Vec<String>,
    },

    /// Interactive lamp console
    Console,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let registry = Endpoint::new(args.registry_host.clone(), args.registry_port);

    match args.command {
        Command::Registry { host, port } => {
            let config = ServerConfig::new(
                host.unwrap_or(registry.host),
                port.unwrap_or(registry.port),
            );
            run_registry(config).await
        }
        Command::Lamp {
            name,
            host,
            port,
            advertise_host,
        } => {
            let server = RpcServer::new(ServerConfig::new(host, port), RegistryClient::new(registry))
                .with_advertised_host(advertise_host);
            run_lamp(server, Lamp::new(name)).await
        }
        Command::Call { function, args } => {
            let client = RpcClient::new(RegistryClient::new(registry));
            let arguments = args.iter().map(|arg| parse_argument(arg)).collect();
            match client.invoke(&function, arguments).await {
                Ok(result) => {
                    println!("{}", result);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("Error: {}", e.full_message());
                    std::process::exit(1);
                }
            }
        }
        Command::Console => console::run(RpcClient::new(RegistryClient::new(registry))).await,
    }
}

fn init_logging(debug: bool) {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        let log_level = if debug { Level::DEBUG } else { Level::INFO };
        builder.with_max_level(log_level).init();
    }
}

async fn run_registry(config: ServerConfig) -> Result<()> {
    let mut server = RegistryServer::new(config);
    server
        .start()
        .await
        .context("Failed to start registry server")?;

    info!("Registry server running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    server.stop().await;
    Ok(())
}

async fn run_lamp(mut server: RpcServer, lamp: Lamp) -> Result<()> {
    server.start().await.context("Failed to start RPC server")?;

    let lamp = Arc::new(lamp);
    let toggle = server
        .register_function("toggle", lamp.clone(), Lamp::toggle)
        .await;
    ensure_registered("toggle", toggle)?;
    let is_on = server
        .register_function("isOn", lamp.clone(), Lamp::is_on)
        .await;
    ensure_registered("isOn", is_on)?;

    info!(
        "Lamp server running on port {}. Press Ctrl+C to stop.",
        server.bound_port()?
    );
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    server.stop().await;
    Ok(())
}

fn ensure_registered(name: &str, registered: rendezvous_core::Result<RegisterResponse>) -> Result<()> {
    let response = registered.with_context(|| format!("Failed to register '{}'", name))?;
    if !response.is_success() {
        anyhow::bail!("Registry refused '{}': {}", name, response.message);
    }
    Ok(())
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_argument(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_argument() {
        assert_eq!(parse_argument("42"), json!(42));
        assert_eq!(parse_argument("true"), json!(true));
        assert_eq!(parse_argument("\"quoted\""), json!("quoted"));
        assert_eq!(parse_argument("desk lamp"), json!("desk lamp"));
    }

    #[test]
    fn test_registry_defaults() {
        let args = Args::parse_from(["rendezvous", "registry"]);
        assert_eq!(args.registry_host, "localhost");
        assert_eq!(args.registry_port, 7777);
        assert!(matches!(
            args.command,
            Command::Registry {
                host: None,
                port: None
            }
        ));
    }

    #[test]
    fn test_call_collects_arguments() {
        let args = Args::parse_from(["rendezvous", "call", "dim", "40", "--registry-port", "9000"]);
        assert_eq!(args.registry_port, 9000);
        match args.command {
            Command::Call { function, args } => {
                assert_eq!(function, "dim");
                assert_eq!(args, vec!["40"]);
            }
            other => panic!("Expected Call, got: {:?}", other),
        }
    }
}
