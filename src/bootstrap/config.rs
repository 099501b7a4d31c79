//! Bootstrap configuration for a weft node.
//!
//! Configuration is loaded in layers with the following precedence (lowest
//! to highest):
//! 1. Environment variables (WEFT_*)
//! 2. Command-line arguments
//!
//! CLI args override environment variables. The shared manifest is not a
//! configuration layer: it describes the whole mesh, while this struct
//! describes only the local process.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use snafu::{ResultExt, Snafu};

use crate::manifest::validation::{validate_key_fingerprint, FingerprintError, PolicyError};
use crate::manifest::RedundancyPolicy;

/// How the node's public address is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicAddrSpec {
    /// Detect the public address via an external probe at bootstrap time.
    Auto,
    /// Use a fixed address.
    Static(IpAddr),
}

impl FromStr for PublicAddrSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(PublicAddrSpec::Auto);
        }
        s.parse::<IpAddr>()
            .map(PublicAddrSpec::Static)
            .map_err(|_| format!("invalid public address '{s}' (expected an IP address or 'auto')"))
    }
}

/// Per-field overrides for the manifest's redundancy policy.
///
/// Environment overrides win over the manifest values; the combined policy
/// still has to satisfy the share ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedundancyOverrides {
    pub shares_needed: Option<u32>,
    pub shares_happy: Option<u32>,
    pub shares_total: Option<u32>,
    pub reserved_space: Option<String>,
}

impl RedundancyOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the overrides on top of a base policy.
    pub fn apply(&self, base: &RedundancyPolicy) -> Result<RedundancyPolicy, PolicyError> {
        RedundancyPolicy::new(
            self.shares_needed.unwrap_or(base.shares_needed),
            self.shares_happy.unwrap_or(base.shares_happy),
            self.shares_total.unwrap_or(base.shares_total),
            self.reserved_space.clone().unwrap_or_else(|| base.reserved_space.clone()),
        )
    }
}

/// Bootstrap configuration for one node process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// This node's name; must match a descriptor in the shared manifest.
    pub node_name: String,

    /// This node's overlay address.
    pub overlay_addr: Option<IpAddr>,

    /// Optional public address, or the `auto` detection sentinel.
    pub public_addr: Option<PublicAddrSpec>,

    /// Directory holding the externally synced manifest.
    pub manifest_dir: PathBuf,

    /// Directory for generated overlay daemon configuration and keys.
    pub config_dir: PathBuf,

    /// Directory for the storage daemon's node config.
    pub storage_dir: PathBuf,

    /// Name of the overlay network interface to wait for.
    pub interface: String,

    /// Explicit introducer locator override; wins over every other source.
    pub introducer_override: Option<String>,

    /// Key-identity fingerprint gating key import (8 hex chars).
    pub key_fingerprint: Option<String>,

    /// Path to private key material provided by the secrets mount; only its
    /// existence is checked, the contents are never parsed here.
    pub key_material_path: Option<PathBuf>,

    /// Redundancy-policy overrides applied on top of the manifest.
    pub redundancy: RedundancyOverrides,

    /// Seconds to wait for the overlay link before giving up.
    pub link_timeout_secs: u64,

    /// Seconds between overlay link checks.
    pub link_poll_secs: u64,

    /// Bounded number of locator discovery attempts.
    pub locator_attempts: u32,

    /// Seconds between locator discovery attempts.
    pub locator_interval_secs: u64,

    /// Skip the overlay link wait (test/offline mode).
    pub skip_link_check: bool,

    /// Treat a storage-provider shortfall as a fatal validation error.
    pub strict_provider_count: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            overlay_addr: None,
            public_addr: None,
            manifest_dir: default_manifest_dir(),
            config_dir: default_config_dir(),
            storage_dir: default_storage_dir(),
            interface: default_interface(),
            introducer_override: None,
            key_fingerprint: None,
            key_material_path: None,
            redundancy: RedundancyOverrides::default(),
            link_timeout_secs: default_link_timeout_secs(),
            link_poll_secs: default_link_poll_secs(),
            locator_attempts: default_locator_attempts(),
            locator_interval_secs: default_locator_interval_secs(),
            skip_link_check: false,
            strict_provider_count: false,
        }
    }
}

impl BootstrapConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables follow the pattern `WEFT_<FIELD>` (uppercase).
    pub fn from_env() -> Self {
        Self {
            node_name: parse_env("WEFT_NODE_NAME").unwrap_or_default(),
            overlay_addr: parse_env("WEFT_OVERLAY_IP"),
            public_addr: parse_env("WEFT_PUBLIC_IP"),
            manifest_dir: parse_env("WEFT_MANIFEST_DIR").unwrap_or_else(default_manifest_dir),
            config_dir: parse_env("WEFT_CONFIG_DIR").unwrap_or_else(default_config_dir),
            storage_dir: parse_env("WEFT_STORAGE_DIR").unwrap_or_else(default_storage_dir),
            interface: parse_env("WEFT_INTERFACE").unwrap_or_else(default_interface),
            introducer_override: parse_env("WEFT_INTRODUCER_FURL"),
            key_fingerprint: parse_env("WEFT_KEY_FINGERPRINT"),
            key_material_path: parse_env("WEFT_KEY_MATERIAL_PATH"),
            redundancy: RedundancyOverrides {
                shares_needed: parse_env("WEFT_SHARES_NEEDED"),
                shares_happy: parse_env("WEFT_SHARES_HAPPY"),
                shares_total: parse_env("WEFT_SHARES_TOTAL"),
                reserved_space: parse_env("WEFT_RESERVED_SPACE"),
            },
            link_timeout_secs: parse_env("WEFT_LINK_TIMEOUT_SECS").unwrap_or_else(default_link_timeout_secs),
            link_poll_secs: parse_env("WEFT_LINK_POLL_SECS").unwrap_or_else(default_link_poll_secs),
            locator_attempts: parse_env("WEFT_LOCATOR_ATTEMPTS").unwrap_or_else(default_locator_attempts),
            locator_interval_secs: parse_env("WEFT_LOCATOR_INTERVAL_SECS")
                .unwrap_or_else(default_locator_interval_secs),
            skip_link_check: parse_env("WEFT_TEST_MODE").unwrap_or(false),
            strict_provider_count: parse_env("WEFT_STRICT_PROVIDERS").unwrap_or(false),
        }
    }

    /// Merge configuration from another source.
    ///
    /// Fields in `other` that are set or non-default override fields in
    /// `self`; used to layer CLI arguments over environment variables.
    pub fn merge(&mut self, other: Self) {
        if !other.node_name.is_empty() {
            self.node_name = other.node_name;
        }
        if other.overlay_addr.is_some() {
            self.overlay_addr = other.overlay_addr;
        }
        if other.public_addr.is_some() {
            self.public_addr = other.public_addr;
        }
        if other.manifest_dir != default_manifest_dir() {
            self.manifest_dir = other.manifest_dir;
        }
        if other.config_dir != default_config_dir() {
            self.config_dir = other.config_dir;
        }
        if other.storage_dir != default_storage_dir() {
            self.storage_dir = other.storage_dir;
        }
        if other.interface != default_interface() {
            self.interface = other.interface;
        }
        if other.introducer_override.is_some() {
            self.introducer_override = other.introducer_override;
        }
        if other.key_fingerprint.is_some() {
            self.key_fingerprint = other.key_fingerprint;
        }
        if other.key_material_path.is_some() {
            self.key_material_path = other.key_material_path;
        }
        if !other.redundancy.is_empty() {
            self.redundancy = other.redundancy;
        }
        if other.link_timeout_secs != default_link_timeout_secs() {
            self.link_timeout_secs = other.link_timeout_secs;
        }
        if other.link_poll_secs != default_link_poll_secs() {
            self.link_poll_secs = other.link_poll_secs;
        }
        if other.locator_attempts != default_locator_attempts() {
            self.locator_attempts = other.locator_attempts;
        }
        if other.locator_interval_secs != default_locator_interval_secs() {
            self.locator_interval_secs = other.locator_interval_secs;
        }
        if other.skip_link_check {
            self.skip_link_check = true;
        }
        if other.strict_provider_count {
            self.strict_provider_count = true;
        }
    }

    /// Validate the configuration before bootstrap starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_name.is_empty() {
            return Err(ConfigError::MissingNodeName);
        }
        if self.overlay_addr.is_none() {
            return Err(ConfigError::MissingOverlayAddr);
        }
        if let Some(ref fingerprint) = self.key_fingerprint {
            validate_key_fingerprint(fingerprint).context(BadFingerprintSnafu)?;
        }
        if self.locator_attempts == 0 {
            return Err(ConfigError::ZeroLocatorAttempts);
        }
        if self.locator_interval_secs == 0 {
            return Err(ConfigError::ZeroLocatorInterval);
        }
        if self.link_poll_secs == 0 || self.link_timeout_secs == 0 {
            return Err(ConfigError::ZeroLinkTiming);
        }
        Ok(())
    }

    /// Path of the shared manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_dir.join("manifest.toml")
    }

    /// Path of the dedicated locator file next to the manifest.
    pub fn locator_file_path(&self) -> PathBuf {
        self.manifest_dir.join("introducer.furl")
    }

    /// Path recording the locator this node last applied to disk.
    pub fn applied_locator_path(&self) -> PathBuf {
        self.config_dir.join("introducer.applied")
    }

    pub fn link_poll_interval(&self) -> Duration {
        Duration::from_secs(self.link_poll_secs)
    }

    pub fn locator_interval(&self) -> Duration {
        Duration::from_secs(self.locator_interval_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("node name is required (set WEFT_NODE_NAME or --node-name)"))]
    MissingNodeName,

    #[snafu(display("overlay address is required (set WEFT_OVERLAY_IP or --overlay-ip)"))]
    MissingOverlayAddr,

    #[snafu(display("key fingerprint is invalid: {source}"))]
    BadFingerprint { source: FingerprintError },

    #[snafu(display("locator attempt count must be non-zero"))]
    ZeroLocatorAttempts,

    #[snafu(display("locator retry interval must be non-zero"))]
    ZeroLocatorInterval,

    #[snafu(display("link timeout and poll interval must be non-zero"))]
    ZeroLinkTiming,
}

// Default value functions

fn default_manifest_dir() -> PathBuf {
    "/var/lib/weft/manifest".into()
}

fn default_config_dir() -> PathBuf {
    "/etc/weft".into()
}

fn default_storage_dir() -> PathBuf {
    "/var/lib/weft/storage".into()
}

fn default_interface() -> String {
    "weft0".into()
}

fn default_link_timeout_secs() -> u64 {
    300
}

fn default_link_poll_secs() -> u64 {
    5
}

fn default_locator_attempts() -> u32 {
    30
}

fn default_locator_interval_secs() -> u64 {
    10
}

// Helper for parsing environment variables

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> BootstrapConfig {
        BootstrapConfig {
            node_name: "node1".into(),
            overlay_addr: Some("10.100.0.1".parse().unwrap()),
            ..BootstrapConfig::default()
        }
    }

    #[test]
    fn minimal_config_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn missing_node_name_rejected() {
        let config = BootstrapConfig {
            overlay_addr: Some("10.100.0.1".parse().unwrap()),
            ..BootstrapConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingNodeName)));
    }

    #[test]
    fn missing_overlay_addr_rejected() {
        let config = BootstrapConfig {
            node_name: "node1".into(),
            ..BootstrapConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingOverlayAddr)));
    }

    #[test]
    fn bad_fingerprint_rejected() {
        let config = BootstrapConfig {
            key_fingerprint: Some("NOTHEX!!".into()),
            ..minimal()
        };
        assert!(matches!(config.validate(), Err(ConfigError::BadFingerprint { .. })));
    }

    #[test]
    fn zero_attempts_rejected() {
        let config = BootstrapConfig {
            locator_attempts: 0,
            ..minimal()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroLocatorAttempts)));
    }

    #[test]
    fn public_addr_spec_parses() {
        assert_eq!("auto".parse::<PublicAddrSpec>().unwrap(), PublicAddrSpec::Auto);
        assert_eq!("AUTO".parse::<PublicAddrSpec>().unwrap(), PublicAddrSpec::Auto);
        assert_eq!(
            "1.2.3.4".parse::<PublicAddrSpec>().unwrap(),
            PublicAddrSpec::Static("1.2.3.4".parse().unwrap())
        );
        assert!("not-an-ip".parse::<PublicAddrSpec>().is_err());
    }

    #[test]
    fn merge_overrides_set_fields() {
        let mut base = minimal();
        let overrides = BootstrapConfig {
            node_name: "node2".into(),
            overlay_addr: Some("10.100.0.2".parse().unwrap()),
            introducer_override: Some("pb://x@tcp:h:1/i".into()),
            interface: "mesh1".into(),
            skip_link_check: true,
            locator_attempts: 5,
            ..BootstrapConfig::default()
        };

        base.merge(overrides);

        assert_eq!(base.node_name, "node2");
        assert_eq!(base.overlay_addr.unwrap().to_string(), "10.100.0.2");
        assert_eq!(base.introducer_override.as_deref(), Some("pb://x@tcp:h:1/i"));
        assert_eq!(base.interface, "mesh1");
        assert!(base.skip_link_check);
        assert_eq!(base.locator_attempts, 5);
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let mut base = minimal();
        base.introducer_override = Some("pb://keep@tcp:h:1/i".into());
        base.merge(BootstrapConfig::default());
        assert_eq!(base.node_name, "node1");
        assert_eq!(base.introducer_override.as_deref(), Some("pb://keep@tcp:h:1/i"));
    }

    #[test]
    fn redundancy_overrides_apply() {
        let base = RedundancyPolicy::default();
        let overrides = RedundancyOverrides {
            shares_needed: Some(2),
            shares_happy: Some(4),
            shares_total: None,
            reserved_space: Some("100G".into()),
        };
        let combined = overrides.apply(&base).unwrap();
        assert_eq!(combined.shares_needed, 2);
        assert_eq!(combined.shares_happy, 4);
        assert_eq!(combined.shares_total, 10);
        assert_eq!(combined.reserved_space, "100G");
    }

    #[test]
    fn redundancy_overrides_keep_ordering_invariant() {
        let base = RedundancyPolicy::default();
        let overrides = RedundancyOverrides {
            shares_needed: Some(12),
            ..RedundancyOverrides::default()
        };
        assert!(overrides.apply(&base).is_err());
    }

    #[test]
    fn derived_paths() {
        let config = minimal();
        assert!(config.manifest_path().ends_with("manifest/manifest.toml"));
        assert!(config.locator_file_path().ends_with("manifest/introducer.furl"));
        assert!(config.applied_locator_path().ends_with("introducer.applied"));
    }
}
