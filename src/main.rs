//! Twirp stub - CLI Entry Point

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use twirp_stub::config::BuiltConfig;
use twirp_stub::{Client, Interception, MockConfig};

#[derive(Parser, Debug)]
#[command(
    name = "twirp-stub",
    about = "Twirp request stubbing - declare stubs and try calls against them",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "twirp-stub.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Send a call through the stubs, e.g. "Echo/Echo"
    #[arg(long, value_name = "SERVICE/PROCEDURE")]
    call: Option<String>,

    /// Request message as JSON
    #[arg(long, default_value = "{}", requires = "call")]
    data: String,

    /// Base URL the call is posted to
    #[arg(long, requires = "call")]
    base_url: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../demos/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockConfig::from_file(&args.config)?
    } else if args.validate || args.call.is_some() {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no stubs)");
        MockConfig::default()
    };

    let built = config.build()?;

    if args.validate {
        println!(
            "Configuration is valid ({} clients, {} stubs defined)",
            built.clients.len(),
            built.stubs.len()
        );
        return Ok(());
    }

    match &args.call {
        Some(target) => call(built, target, &args.data, args.base_url.as_deref()),
        None => {
            info!(
                clients = built.clients.len(),
                stubs = built.stubs.len(),
                "Nothing to do, pass --call to send a request"
            );
            Ok(())
        }
    }
}

fn call(built: BuiltConfig, target: &str, data: &str, base_url: Option<&str>) -> Result<()> {
    let (service, procedure) = target
        .split_once('/')
        .ok_or_else(|| anyhow!("expected SERVICE/PROCEDURE, found {}", target))?;

    let client = built
        .clients
        .iter()
        .find(|c| c.client_type().service().full_name() == service)
        .ok_or_else(|| anyhow!("no client for service {}", service))?;
    let client = match base_url {
        Some(url) => Client::new(client.client_type().clone(), url),
        None => client.clone(),
    };

    let rpc = client
        .client_type()
        .service()
        .find_procedure(procedure)
        .ok_or_else(|| anyhow!("invalid rpc method {} for {}", procedure, service))?
        .clone();

    let json: serde_json::Value = serde_json::from_str(data).context("Invalid --data")?;
    let input = rpc.input_type.from_json(&json)?;
    let request = client.request(procedure, &input)?;

    let registry = built.into_registry();
    match registry.on_intercepted_request(request)? {
        Interception::Response(response) => {
            println!("HTTP {}", response.status);
            match response.decode(&rpc.output_type)? {
                Ok(message) => println!("{}", serde_json::to_string_pretty(&message.to_json())?),
                Err(error) => println!("{}", serde_json::to_string_pretty(&error)?),
            }
            Ok(())
        }
        Interception::Unhandled(unhandled) => {
            Err(twirp_stub::NetConnectNotAllowed::from(unhandled).into())
        }
    }
}
