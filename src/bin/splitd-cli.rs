//! Command-line client for a running splitd.
//!
//! Connects, registers, performs one call and prints the result as JSON.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use splitd::config::{self, LinkConfig};
use splitd::splitd_core::{Attributes, FLAG_RETURN_IMPRESSION_DATA, RegisterFlags, now_millis};
use splitd::splitd_link::protocol::{SplitViewPayload, TreatmentPayload};
use splitd::splitd_link::{LinkClient, SocketFlavor};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// splitd client
#[derive(Parser, Debug)]
#[command(name = "splitd-cli")]
#[command(version)]
#[command(about = "Query a running splitd over its local socket")]
struct Cli {
    /// Configuration file to take link settings from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Socket path (overrides the configuration)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Socket flavor: unix-seqpacket or unix-stream
    #[arg(long)]
    flavor: Option<SocketFlavor>,

    /// Read timeout in milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Write timeout in milliseconds
    #[arg(long)]
    write_timeout_ms: Option<u64>,

    /// Client id sent at registration
    #[arg(long, default_value = "splitd-cli")]
    id: String,

    /// SDK version sent at registration
    #[arg(long, default_value = concat!("splitd-cli-", env!("CARGO_PKG_VERSION")))]
    sdk_version: String,

    /// Ask the daemon for impression data with each treatment
    #[arg(long, default_value_t = false)]
    impression_data: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one feature
    Treatment {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        bucketing_key: Option<String>,

        #[arg(short, long)]
        feature: String,

        /// Attributes as a JSON object
        #[arg(short, long)]
        attributes: Option<String>,

        /// Include the treatment configuration
        #[arg(long, default_value_t = false)]
        with_config: bool,
    },

    /// Evaluate several features
    Treatments {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        bucketing_key: Option<String>,

        /// Feature names (repeatable)
        #[arg(short, long, required = true)]
        features: Vec<String>,

        /// Attributes as a JSON object
        #[arg(short, long)]
        attributes: Option<String>,

        /// Include the treatment configurations
        #[arg(long, default_value_t = false)]
        with_config: bool,
    },

    /// Queue an event
    Track {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        traffic_type: String,

        #[arg(short, long)]
        event_type: String,

        #[arg(short, long)]
        value: Option<f64>,

        /// Properties as a JSON object
        #[arg(short, long)]
        properties: Option<String>,

        /// Event time in milliseconds (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// List flag names
    SplitNames,

    /// Show one flag
    Split { name: String },

    /// Show every flag
    Splits,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let link = link_settings(&cli)?;
    let options = link.client().context("Invalid link settings")?;

    let flags = if cli.impression_data {
        RegisterFlags::from_bits(FLAG_RETURN_IMPRESSION_DATA)
    } else {
        RegisterFlags::default()
    };
    let mut client = LinkClient::connect(&options, &cli.id, &cli.sdk_version, flags)
        .await
        .context("Failed to connect to splitd")?;

    let output = run_command(&mut client, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    client.close().await.context("Failed to close connection")?;
    Ok(())
}

fn link_settings(cli: &Cli) -> Result<LinkConfig> {
    let mut link = config::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?
        .link;
    if let Some(socket) = &cli.socket {
        link.socket_path.clone_from(socket);
    }
    if let Some(flavor) = cli.flavor {
        link.flavor = flavor;
    }
    if let Some(ms) = cli.read_timeout_ms {
        link.read_timeout_ms = ms;
    }
    if let Some(ms) = cli.write_timeout_ms {
        link.write_timeout_ms = ms;
    }
    Ok(link)
}

async fn run_command(client: &mut LinkClient, command: Command) -> Result<Value> {
    let output = match command {
        Command::Treatment {
            key,
            bucketing_key,
            feature,
            attributes,
            with_config,
        } => {
            let attributes = parse_map(attributes.as_deref(), "attributes")?;
            let result = if with_config {
                client
                    .treatment_with_config(&key, bucketing_key.as_deref(), &feature, attributes.as_ref())
                    .await
            } else {
                client
                    .treatment(&key, bucketing_key.as_deref(), &feature, attributes.as_ref())
                    .await
            };
            treatment_json(&result.context("Treatment call failed")?)
        }
        Command::Treatments {
            key,
            bucketing_key,
            features,
            attributes,
            with_config,
        } => {
            let attributes = parse_map(attributes.as_deref(), "attributes")?;
            let results = if with_config {
                client
                    .treatments_with_config(&key, bucketing_key.as_deref(), &features, attributes.as_ref())
                    .await
            } else {
                client
                    .treatments(&key, bucketing_key.as_deref(), &features, attributes.as_ref())
                    .await
            }
            .context("Treatments call failed")?;
            let by_feature: serde_json::Map<String, Value> = features
                .into_iter()
                .zip(results.iter().map(treatment_json))
                .collect();
            Value::Object(by_feature)
        }
        Command::Track {
            key,
            traffic_type,
            event_type,
            value,
            properties,
            timestamp,
        } => {
            let properties = parse_map(properties.as_deref(), "properties")?;
            let queued = client
                .track(
                    &key,
                    &traffic_type,
                    &event_type,
                    value,
                    properties.as_ref(),
                    timestamp.unwrap_or_else(now_millis),
                )
                .await
                .context("Track call failed")?;
            json!({ "queued": queued })
        }
        Command::SplitNames => {
            json!(client.split_names().await.context("SplitNames call failed")?)
        }
        Command::Split { name } => client
            .split(&name)
            .await
            .context("Split call failed")?
            .as_ref()
            .map_or(Value::Null, split_json),
        Command::Splits => Value::Array(
            client
                .splits()
                .await
                .context("Splits call failed")?
                .iter()
                .map(split_json)
                .collect(),
        ),
    };
    Ok(output)
}

fn parse_map(raw: Option<&str>, what: &str) -> Result<Option<Attributes>> {
    raw.map(|s| {
        serde_json::from_str::<Attributes>(s)
            .with_context(|| format!("{what} must be a JSON object of scalars or string lists"))
    })
    .transpose()
}

fn treatment_json(payload: &TreatmentPayload) -> Value {
    let mut out = json!({ "treatment": payload.treatment });
    if let Some(config) = &payload.config {
        out["config"] = json!(config);
    }
    if let Some(listener) = &payload.listener {
        out["impression"] = json!({
            "label": listener.label,
            "time": listener.time_ms,
            "changeNumber": listener.change_number,
        });
    }
    out
}

fn split_json(view: &SplitViewPayload) -> Value {
    json!({
        "name": view.name,
        "trafficType": view.traffic_type,
        "killed": view.killed,
        "treatments": view.treatments,
        "changeNumber": view.change_number,
        "configs": view.configs,
        "defaultTreatment": view.default_treatment,
        "sets": view.sets,
    })
}
