//! Contact ID over IP receiver
//!
//! Accepts alarm panel connections, decodes Contact ID messages and logs
//! the resulting alarms.

mod alarm;

use alarm::AlarmLogger;
use anyhow::Context;
use cidip_core::config::{ConfigLoader, ReceiverConfig};
use cidip_core::{decode, CodeTables, Event};
use cidip_server::{ContactIdServer, ListenerConfig};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "cidip-receiver")]
#[command(version)]
#[command(about = "Contact ID over IP alarm receiver", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    log_format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "CIDIP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for alarm panel connections
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Only log events from these client codes (repeatable)
        #[arg(short, long = "allow")]
        allow: Vec<String>,

        /// Close connections idle for this many seconds (0 = never)
        #[arg(long)]
        idle_timeout: Option<u64>,
    },

    /// Decode a single message line
    Decode {
        /// Envelope line, e.g. user,pass,AXPRO,18340101501
        line: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List known event codes and qualifiers
    Codes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration file
    let loaded = ConfigLoader::new().with_cli_path(cli.config.clone()).load();
    let log_level_setting = match &loaded {
        Ok(config) => config.receiver.log_level.clone(),
        Err(_) => ReceiverConfig::default().receiver.log_level,
    };

    // Setup logging - CLI verbose flag takes precedence, then config, then default
    init_logging(log_level(cli.verbose, &log_level_setting), cli.log_format)?;

    let config = loaded.context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            allow,
            idle_timeout,
        } => {
            let config = merge_serve_config(config, host, port, allow, idle_timeout);
            serve_command(config).await
        }
        Commands::Decode { line, format } => decode_command(&config, &line, format),
        Commands::Codes => codes_command(&config),
    }
}

fn log_level(verbose: u8, configured: &str) -> Level {
    match verbose {
        0 => match configured.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        },
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn init_logging(level: Level, format: OutputFormat) -> anyhow::Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        OutputFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        OutputFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

/// Merge CLI arguments with config file settings
/// CLI arguments take precedence when explicitly provided
fn merge_serve_config(
    mut config: ReceiverConfig,
    host: Option<String>,
    port: Option<u16>,
    allow: Vec<String>,
    idle_timeout: Option<u64>,
) -> ReceiverConfig {
    if let Some(host) = host {
        config.listener.host = host;
    }
    if let Some(port) = port {
        config.listener.port = port;
    }
    if !allow.is_empty() {
        config.alerts.allowed_clients = allow;
    }
    if let Some(secs) = idle_timeout {
        config.listener.idle_timeout_secs = secs;
    }
    config
}

async fn serve_command(config: ReceiverConfig) -> anyhow::Result<()> {
    info!("Starting Contact ID receiver...");

    let tables = Arc::new(config.code_tables()?);
    let handler = Arc::new(AlarmLogger::from_settings(&config.alerts, tables));

    let server = ContactIdServer::bind(ListenerConfig::from(&config.listener), handler)
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.listener.host, config.listener.port
            )
        })?;

    if config.alerts.allowed_clients.is_empty() {
        info!("Logging events from all clients");
    } else {
        info!(
            "Logging events from: {}",
            config.alerts.allowed_clients.join(", ")
        );
    }

    let stats = server.stats();
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        shutdown.cancel();
    });

    server.run().await?;

    let snap = stats.snapshot();
    info!(
        "Receiver stopped: {} connection(s), {} event(s), {} decode error(s)",
        snap.connections, snap.events_delivered, snap.decode_errors
    );

    Ok(())
}

fn decode_command(config: &ReceiverConfig, line: &str, format: OutputFormat) -> anyhow::Result<()> {
    let tables = config.code_tables()?;
    let event = decode(line)?;

    match format {
        OutputFormat::Text => print_event(&event, &tables),
        OutputFormat::Json => {
            let mut value = serde_json::to_value(&event)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert(
                    "description".to_string(),
                    event.description_in(&tables).into(),
                );
                obj.insert(
                    "qualifier_description".to_string(),
                    event.qualifier_description_in(&tables).into(),
                );
                obj.insert("is_test".to_string(), event.is_test().into());
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

fn print_event(event: &Event, tables: &CodeTables) {
    println!();
    println!("  Client:          {}", event.client_code());
    println!("  Username:        {}", event.username());
    println!("  CID:             {}", event.cid());
    println!("  Message Type:    {:02}", event.message_type());
    println!(
        "  Event Qualifier: {}",
        event.qualifier_description_in(tables)
    );
    println!("  Event Code:      {}", event.description_in(tables));
    println!("  Partition:       {:02}", event.group());
    println!("  Zone / User:     {:03}", event.sensor_or_user());
    println!(
        "  Test Report:     {}",
        if event.is_test() { "yes" } else { "no" }
    );
    println!();
}

fn codes_command(config: &ReceiverConfig) -> anyhow::Result<()> {
    let tables = config.code_tables()?;

    println!("\n=== Event Codes ===\n");
    for (code, desc) in tables.event_codes() {
        println!("  {:03}  {}", code, desc);
    }

    println!("\n=== Event Qualifiers ===\n");
    for (qualifier, desc) in tables.qualifiers() {
        println!("  {}    {}", qualifier, desc);
    }
    println!();

    Ok(())
}
