//! presign - Print a presigned WebSocket URL for a signing broker
//!
//! Reads credentials from the standard AWS environment variables and prints
//! the presigned `wss://` URL a WebSocket MQTT client can connect with.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use mqttproxy::sign::{presign_websocket_url, Credentials};

/// CLI arguments for presign
#[derive(Parser, Debug)]
#[command(name = "presign")]
#[command(about = "Print a presigned wss:// URL for a signing MQTT broker")]
#[command(version)]
pub struct CliArgs {
    /// Broker endpoint host, e.g. abc123-ats.iot.us-west-2.amazonaws.com
    #[arg(long, help = "Broker endpoint host")]
    pub host: String,

    /// Signing region
    #[arg(long, default_value = "us-west-2", help = "Signing region")]
    pub region: String,

    /// Signing service name
    #[arg(long, default_value = "iotdevicegateway", help = "Signing service name")]
    pub service: String,
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let credentials = Credentials::from_env().context("Failed to load signing credentials")?;

    let presigned = presign_websocket_url(
        &credentials,
        &args.region,
        &args.service,
        &args.host,
        Utc::now(),
    )?;

    println!("{}", presigned.url);

    Ok(())
}
