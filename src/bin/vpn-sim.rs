// Copyright (c) 2025 - Cowboy AI, Inc.
//! VPN Simulation Runner
//!
//! Assembles the VPN test environment against an in-memory cloud, applies
//! it and prints the deployment report as JSON on stdout.
//!
//! Run with: cargo run --bin vpn-sim
//!
//! Environment:
//! - `VPN_SIM_CONFIG` - path to a JSON configuration file (defaults apply
//!   when unset)
//! - `RUST_LOG` - log filter, logs go to stderr

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use vpn_sim::{CloudServices, Deployment, SimulatedCloud, SimulationConfig};

fn load_config() -> Result<SimulationConfig> {
    match std::env::var("VPN_SIM_CONFIG") {
        Ok(path) => SimulationConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path)),
        Err(_) => Ok(SimulationConfig::default()),
    }
}

async fn run() -> Result<bool> {
    let config = load_config()?;
    let cloud = Arc::new(SimulatedCloud::new());
    let services = CloudServices::simulated(cloud.clone());

    let deployment =
        Deployment::build(&config, &services).context("Failed to assemble deployment graph")?;
    info!(order = ?deployment.order(), "Deployment order");

    let report = deployment.apply().await.context("Deployment was rejected")?;
    info!(
        resources = cloud.resources().len(),
        secrets = cloud.secret_store().len(),
        "Simulated cloud state"
    );

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{}", json);

    Ok(report.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting VPN simulation");

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("Deployment finished with failed units");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
