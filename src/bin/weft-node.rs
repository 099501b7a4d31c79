//! Weft node binary - per-node bootstrap entry point.
//!
//! Runs the bootstrap coordinator once: waits for the overlay link, discovers
//! the shared introducer locator, and regenerates local configuration
//! idempotently. Process supervision and the overlay/storage daemons
//! themselves stay external; this binary exits zero once the node is
//! configured and non-zero on any fatal bootstrap failure so the supervisor
//! can react.
//!
//! # Usage
//!
//! ```bash
//! # Configuration from environment variables
//! export WEFT_NODE_NAME=node1
//! export WEFT_OVERLAY_IP=10.100.0.1
//! weft-node
//!
//! # Or from CLI arguments (override the environment)
//! weft-node --node-name node1 --overlay-ip 10.100.0.1 --public-ip auto
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use weft::bootstrap::{BootstrapConfig, BootstrapCoordinator, PublicAddrSpec, RedundancyOverrides};

#[derive(Parser, Debug)]
#[command(name = "weft-node", about = "Bootstrap a weft mesh node")]
struct Args {
    /// This node's name; must match a descriptor in the shared manifest.
    #[arg(long)]
    node_name: Option<String>,

    /// This node's overlay address.
    #[arg(long)]
    overlay_ip: Option<IpAddr>,

    /// Public address, or 'auto' to detect it at bootstrap time.
    #[arg(long)]
    public_ip: Option<PublicAddrSpec>,

    /// Directory holding the externally synced manifest.
    #[arg(long)]
    manifest_dir: Option<PathBuf>,

    /// Directory for generated overlay configuration and keys.
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Directory for the storage daemon's node config.
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Overlay network interface to wait for.
    #[arg(long)]
    interface: Option<String>,

    /// Explicit introducer locator; overrides every discovered source.
    #[arg(long)]
    introducer_furl: Option<String>,

    /// Key-identity fingerprint gating key import (8 hex characters).
    #[arg(long)]
    key_fingerprint: Option<String>,

    /// Redundancy overrides applied on top of the manifest policy.
    #[arg(long)]
    shares_needed: Option<u32>,

    #[arg(long)]
    shares_happy: Option<u32>,

    #[arg(long)]
    shares_total: Option<u32>,

    #[arg(long)]
    reserved_space: Option<String>,

    /// Bounded locator discovery attempts.
    #[arg(long)]
    locator_attempts: Option<u32>,

    /// Seconds between locator discovery attempts.
    #[arg(long)]
    locator_interval_secs: Option<u64>,

    /// Seconds to wait for the overlay link before giving up.
    #[arg(long)]
    link_timeout_secs: Option<u64>,

    /// Skip the overlay link wait (test/offline mode).
    #[arg(long)]
    test_mode: bool,

    /// Fail bootstrap when storage providers cannot satisfy shares_happy.
    #[arg(long)]
    strict_providers: bool,
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// `WEFT_LOG` wins over `RUST_LOG`; both default to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("WEFT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

/// Layer CLI arguments over the environment configuration.
fn build_config(args: &Args) -> BootstrapConfig {
    let mut config = BootstrapConfig::from_env();

    let mut overrides = BootstrapConfig::default();
    if let Some(ref name) = args.node_name {
        overrides.node_name = name.clone();
    }
    overrides.overlay_addr = args.overlay_ip;
    overrides.public_addr = args.public_ip;
    if let Some(ref dir) = args.manifest_dir {
        overrides.manifest_dir = dir.clone();
    }
    if let Some(ref dir) = args.config_dir {
        overrides.config_dir = dir.clone();
    }
    if let Some(ref dir) = args.storage_dir {
        overrides.storage_dir = dir.clone();
    }
    if let Some(ref interface) = args.interface {
        overrides.interface = interface.clone();
    }
    overrides.introducer_override = args.introducer_furl.clone();
    overrides.key_fingerprint = args.key_fingerprint.clone();
    overrides.redundancy = RedundancyOverrides {
        shares_needed: args.shares_needed,
        shares_happy: args.shares_happy,
        shares_total: args.shares_total,
        reserved_space: args.reserved_space.clone(),
    };
    if let Some(attempts) = args.locator_attempts {
        overrides.locator_attempts = attempts;
    }
    if let Some(interval) = args.locator_interval_secs {
        overrides.locator_interval_secs = interval;
    }
    if let Some(timeout) = args.link_timeout_secs {
        overrides.link_timeout_secs = timeout;
    }
    overrides.skip_link_check = args.test_mode;
    overrides.strict_provider_count = args.strict_providers;

    config.merge(overrides);
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = build_config(&args);

    let mut coordinator = BootstrapCoordinator::new(config);
    let outcome = match coordinator.run().await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%err, "bootstrap failed");
            return Err(err).context("bootstrap failed");
        }
    };

    info!(
        locator = %outcome.locator,
        configured = outcome.configured,
        attempts = outcome.state.locator_attempts,
        "node is configured; handing off to the process supervisor"
    );
    Ok(())
}
