//! Manifest model and consistency validation.
//!
//! The manifest is the single shared description of the mesh: one network
//! section, an optional introducer locator, and an ordered list of node
//! descriptors. Every node loads the same file (synced out-of-band) and must
//! arrive at the same typed view of it, so loading is strict:
//!
//! - structural problems (missing fields, mistyped values, bad CIDR, bad
//!   fingerprints, unknown role tags, out-of-order share counts) abort the
//!   load with a [`ManifestError`];
//! - cross-node consistency problems (duplicate names/addresses, provider
//!   shortfall, malformed locator) are collected by [`Manifest::validate`]
//!   as a list of [`ConsistencyWarning`]s and surfaced to the operator.
//!
//! Field defaults are resolved at load time: a descriptor without an
//! explicit overlay address gets its internal address, so downstream code
//! never distinguishes "unset" from "defaulted".

pub mod validation;

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::fsutil;
use crate::locator::IntroducerLocator;
use self::validation::{
    validate_cidr, validate_key_fingerprint, validate_share_ordering, CidrError, FingerprintError,
    PolicyError,
};

/// Errors aborting a manifest load or save.
#[derive(Debug, Snafu)]
pub enum ManifestError {
    #[snafu(display("failed to read manifest {}: {source}", path.display()))]
    Read { path: PathBuf, source: std::io::Error },

    #[snafu(display("manifest is not valid UTF-8: {source}"))]
    Utf8 { source: std::str::Utf8Error },

    #[snafu(display("manifest schema rejected: {source}"))]
    Parse { source: toml::de::Error },

    #[snafu(display("failed to serialize manifest: {source}"))]
    Render { source: toml::ser::Error },

    #[snafu(display("failed to write manifest: {source}"))]
    Write { source: fsutil::WriteError },
}

// ============================================================================
// Roles
// ============================================================================

/// Closed set of roles a node may carry.
///
/// Unknown tags in a manifest are rejected at load time rather than
/// silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Participates in the overlay mesh (every configured node).
    OverlayParticipant,
    /// Runs the storage-grid introducer.
    StorageIntroducer,
    /// Contributes storage shares to the grid.
    StorageProvider,
    /// Mounts and reads/writes the grid.
    StorageClient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::OverlayParticipant => "overlay_participant",
            Role::StorageIntroducer => "storage_introducer",
            Role::StorageProvider => "storage_provider",
            Role::StorageClient => "storage_client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Redundancy policy
// ============================================================================

/// Erasure-coding parameters for the storage grid.
///
/// The ordering `shares_needed <= shares_happy <= shares_total` is enforced
/// at construction; a manifest violating it fails to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRedundancyPolicy")]
pub struct RedundancyPolicy {
    pub shares_needed: u32,
    pub shares_happy: u32,
    pub shares_total: u32,
    pub reserved_space: String,
}

impl RedundancyPolicy {
    /// Construct a policy, rejecting out-of-order or zero share counts.
    pub fn new(
        shares_needed: u32,
        shares_happy: u32,
        shares_total: u32,
        reserved_space: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        validate_share_ordering(shares_needed, shares_happy, shares_total)?;
        let reserved_space = reserved_space.into();
        if reserved_space.is_empty() {
            return Err(PolicyError::ReservedSpaceEmpty);
        }
        Ok(Self {
            shares_needed,
            shares_happy,
            shares_total,
            reserved_space,
        })
    }
}

impl Default for RedundancyPolicy {
    fn default() -> Self {
        Self {
            shares_needed: 3,
            shares_happy: 7,
            shares_total: 10,
            reserved_space: "50G".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRedundancyPolicy {
    #[serde(default = "default_shares_needed")]
    shares_needed: u32,
    #[serde(default = "default_shares_happy")]
    shares_happy: u32,
    #[serde(default = "default_shares_total")]
    shares_total: u32,
    #[serde(default = "default_reserved_space")]
    reserved_space: String,
}

impl TryFrom<RawRedundancyPolicy> for RedundancyPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawRedundancyPolicy) -> Result<Self, Self::Error> {
        RedundancyPolicy::new(raw.shares_needed, raw.shares_happy, raw.shares_total, raw.reserved_space)
    }
}

fn default_shares_needed() -> u32 {
    3
}

fn default_shares_happy() -> u32 {
    7
}

fn default_shares_total() -> u32 {
    10
}

fn default_reserved_space() -> String {
    "50G".to_string()
}

// ============================================================================
// Network config
// ============================================================================

/// Errors rejecting the `[network]` section at load time.
#[derive(Debug, Snafu)]
pub enum NetworkError {
    #[snafu(display("network name cannot be empty"))]
    EmptyName,

    #[snafu(display("network domain cannot be empty"))]
    EmptyDomain,

    #[snafu(display("network vpn_network is invalid: {source}"))]
    InvalidCidr { source: CidrError },
}

/// Network-wide configuration shared by all nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNetworkConfig")]
pub struct NetworkConfig {
    pub name: String,
    pub version: String,
    pub domain: String,
    /// Overlay network CIDR, e.g. `10.100.0.0/16`. Validated at load.
    pub vpn_network: String,
    pub redundancy: RedundancyPolicy,
}

impl NetworkConfig {
    /// Prefix length of the overlay CIDR.
    pub fn overlay_prefix_len(&self) -> u8 {
        // vpn_network was validated at construction.
        validation::parse_cidr(&self.vpn_network).map(|(_, prefix)| prefix).unwrap_or(16)
    }
}

#[derive(Debug, Deserialize)]
struct RawNetworkConfig {
    name: String,
    version: String,
    #[serde(default = "default_domain")]
    domain: String,
    #[serde(default = "default_vpn_network")]
    vpn_network: String,
    #[serde(default)]
    redundancy: RedundancyPolicy,
}

impl TryFrom<RawNetworkConfig> for NetworkConfig {
    type Error = NetworkError;

    fn try_from(raw: RawNetworkConfig) -> Result<Self, Self::Error> {
        if raw.name.is_empty() {
            return Err(NetworkError::EmptyName);
        }
        if raw.domain.is_empty() {
            return Err(NetworkError::EmptyDomain);
        }
        validate_cidr(&raw.vpn_network).context(InvalidCidrSnafu)?;
        Ok(Self {
            name: raw.name,
            version: raw.version,
            domain: raw.domain,
            vpn_network: raw.vpn_network,
            redundancy: raw.redundancy,
        })
    }
}

fn default_domain() -> String {
    "weft.local".to_string()
}

fn default_vpn_network() -> String {
    "10.100.0.0/16".to_string()
}

// ============================================================================
// Node descriptors
// ============================================================================

/// Errors rejecting a `[[nodes]]` entry at load time.
#[derive(Debug, Snafu)]
pub enum NodeError {
    #[snafu(display("node name cannot be empty"))]
    EmptyNodeName,

    #[snafu(display("node '{name}' has a bad key fingerprint: {source}"))]
    BadFingerprint { name: String, source: FingerprintError },
}

/// One node in the mesh, as declared in the manifest.
///
/// `overlay_addr` is always populated: a descriptor without an explicit
/// `vpn_ip` resolves to its `internal_ip` when loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNodeDescriptor")]
pub struct NodeDescriptor {
    pub name: String,
    #[serde(rename = "internal_ip")]
    pub internal_addr: IpAddr,
    #[serde(rename = "vpn_ip")]
    pub overlay_addr: IpAddr,
    #[serde(rename = "public_ip", skip_serializing_if = "Option::is_none")]
    pub public_addr: Option<IpAddr>,
    /// Key-identity fingerprint gating key import; exactly 8 hex characters.
    #[serde(rename = "gpg_key_id", skip_serializing_if = "Option::is_none")]
    pub key_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_contribution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_allocation: Option<String>,
}

impl NodeDescriptor {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Deserialize)]
struct RawNodeDescriptor {
    name: String,
    internal_ip: IpAddr,
    #[serde(default)]
    vpn_ip: Option<IpAddr>,
    #[serde(default)]
    public_ip: Option<IpAddr>,
    #[serde(default)]
    gpg_key_id: Option<String>,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    storage_contribution: Option<String>,
    #[serde(default)]
    storage_allocation: Option<String>,
}

impl TryFrom<RawNodeDescriptor> for NodeDescriptor {
    type Error = NodeError;

    fn try_from(raw: RawNodeDescriptor) -> Result<Self, Self::Error> {
        if raw.name.is_empty() {
            return Err(NodeError::EmptyNodeName);
        }
        if let Some(ref fingerprint) = raw.gpg_key_id {
            validate_key_fingerprint(fingerprint).context(BadFingerprintSnafu { name: raw.name.clone() })?;
        }
        Ok(Self {
            overlay_addr: raw.vpn_ip.unwrap_or(raw.internal_ip),
            name: raw.name,
            internal_addr: raw.internal_ip,
            public_addr: raw.public_ip,
            key_fingerprint: raw.gpg_key_id,
            roles: raw.roles,
            storage_contribution: raw.storage_contribution,
            storage_allocation: raw.storage_allocation,
        })
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Consistency problems found across the whole manifest.
///
/// These are collected, not raised: a manifest with warnings still loads,
/// because the mesh may legitimately be mid-bootstrap (e.g. providers that
/// have not come online yet). The operator decides what to act on.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    #[snafu(display("duplicate node name '{name}'"))]
    DuplicateName { name: String },

    #[snafu(display("duplicate internal address {addr} (node '{name}')"))]
    DuplicateInternalAddr { addr: IpAddr, name: String },

    #[snafu(display("duplicate overlay address {addr} (node '{name}')"))]
    DuplicateOverlayAddr { addr: IpAddr, name: String },

    #[snafu(display("introducer locator is malformed: {reason}"))]
    MalformedLocator { reason: String },

    #[snafu(display(
        "only {providers} storage provider(s) declared but shares_happy is {shares_happy}; \
         uploads will not reach the happiness threshold"
    ))]
    ProviderShortfall { providers: usize, shares_happy: u32 },
}

/// How strictly consistency warnings are treated.
///
/// Provider shortfall defaults to warn-only since the grid may still be
/// bootstrapping; strict mode promotes it to a fatal bootstrap error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub strict_provider_count: bool,
}

impl ValidationPolicy {
    pub fn is_fatal(&self, warning: &ConsistencyWarning) -> bool {
        matches!(warning, ConsistencyWarning::ProviderShortfall { .. }) && self.strict_provider_count
    }
}

/// The shared declarative description of the mesh.
///
/// Node order is preserved from the file, which makes topology derivation
/// (and therefore generated configuration) deterministic across nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introducer_furl: Option<String>,
    pub network: NetworkConfig,
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,
}

impl Manifest {
    /// Load a manifest from raw bytes. Structural problems abort the load.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes).context(Utf8Snafu)?;
        toml::from_str(text).context(ParseSnafu)
    }

    /// Load a manifest from a file.
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let bytes = std::fs::read(path).context(ReadSnafu { path })?;
        Self::from_slice(&bytes)
    }

    /// Render the manifest back to TOML.
    ///
    /// Round-trip law: `from_slice(to_toml(m))` is structurally equal to `m`.
    pub fn to_toml(&self) -> Result<String, ManifestError> {
        toml::to_string_pretty(self).context(RenderSnafu)
    }

    /// Atomically write the manifest to a file.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let rendered = self.to_toml()?;
        fsutil::write_atomic(path, rendered.as_bytes()).context(WriteSnafu)
    }

    /// Look up a node by name.
    pub fn get_node(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// All nodes carrying the given role, in manifest order.
    pub fn nodes_by_role(&self, role: Role) -> Vec<&NodeDescriptor> {
        self.nodes.iter().filter(|n| n.has_role(role)).collect()
    }

    /// Replace the shared introducer locator.
    pub fn update_introducer_furl(&mut self, furl: impl Into<String>) {
        self.introducer_furl = Some(furl.into());
    }

    /// Check cross-node consistency; always structurally succeeds.
    ///
    /// Returns every problem found, in node order, so the operator sees the
    /// full picture in one pass.
    pub fn validate(&self) -> Vec<ConsistencyWarning> {
        let mut warnings = Vec::new();
        let mut names = std::collections::BTreeSet::new();
        let mut internal = std::collections::BTreeSet::new();
        let mut overlay = std::collections::BTreeSet::new();

        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                warnings.push(ConsistencyWarning::DuplicateName {
                    name: node.name.clone(),
                });
            }
            if !internal.insert(node.internal_addr) {
                warnings.push(ConsistencyWarning::DuplicateInternalAddr {
                    addr: node.internal_addr,
                    name: node.name.clone(),
                });
            }
            if !overlay.insert(node.overlay_addr) {
                warnings.push(ConsistencyWarning::DuplicateOverlayAddr {
                    addr: node.overlay_addr,
                    name: node.name.clone(),
                });
            }
        }

        if let Some(ref furl) = self.introducer_furl {
            if let Err(err) = IntroducerLocator::from_str(furl) {
                warnings.push(ConsistencyWarning::MalformedLocator {
                    reason: err.to_string(),
                });
            }
        }

        let providers = self.nodes_by_role(Role::StorageProvider).len();
        let shares_happy = self.network.redundancy.shares_happy;
        if providers < shares_happy as usize {
            warnings.push(ConsistencyWarning::ProviderShortfall {
                providers,
                shares_happy,
            });
        }

        warnings
    }
}
