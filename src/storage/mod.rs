//! Generated configuration for the external storage daemon.
//!
//! The storage daemon (introducer, provider, or client) reads an INI-style
//! node config. This module creates that config from the derived role set
//! and redundancy policy, and updates the introducer locator line in place
//! when the shared locator changes — the only field that legitimately
//! drifts after initial setup.

use std::net::IpAddr;
use std::path::PathBuf;

use snafu::{ResultExt, Snafu};

use crate::fsutil;
use crate::manifest::RedundancyPolicy;

/// File name of the storage daemon config inside its base directory.
const NODE_CONFIG_FILE: &str = "node.cfg";

/// Default listening port for storage providers.
pub const DEFAULT_STORAGE_PORT: u16 = 3457;

/// Errors creating or updating the storage node config.
#[derive(Debug, Snafu)]
pub enum StorageError {
    #[snafu(display("failed to read storage config {}: {source}", path.display()))]
    ReadConfig { path: PathBuf, source: std::io::Error },

    #[snafu(display("storage config {} is not initialized", path.display()))]
    NotConfigured { path: PathBuf },

    #[snafu(display("failed to write storage config: {source}"))]
    WriteConfig { source: fsutil::WriteError },
}

/// Parameters for creating a storage daemon config.
#[derive(Debug, Clone)]
pub struct StorageNodeParams {
    pub nickname: String,
    pub overlay_addr: IpAddr,
    pub port: u16,
    pub introducer: String,
    pub redundancy: RedundancyPolicy,
    /// Whether this node contributes storage shares (provider role).
    pub storage_enabled: bool,
}

/// Manages the storage daemon's node config in a base directory.
#[derive(Debug, Clone)]
pub struct StorageSetup {
    base_dir: PathBuf,
}

impl StorageSetup {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(NODE_CONFIG_FILE)
    }

    pub fn is_configured(&self) -> bool {
        self.config_path().exists()
    }

    fn render(params: &StorageNodeParams) -> String {
        let mut out = String::new();
        out.push_str("[node]\n");
        out.push_str(&format!("nickname = {}\n", params.nickname));
        out.push_str(&format!("tub.port = tcp:{}\n", params.port));
        out.push_str(&format!("tub.location = tcp:{}:{}\n", params.overlay_addr, params.port));
        out.push('\n');
        out.push_str("[client]\n");
        out.push_str(&format!("introducer.furl = {}\n", params.introducer));
        out.push_str(&format!("shares.needed = {}\n", params.redundancy.shares_needed));
        out.push_str(&format!("shares.happy = {}\n", params.redundancy.shares_happy));
        out.push_str(&format!("shares.total = {}\n", params.redundancy.shares_total));
        out.push('\n');
        out.push_str("[storage]\n");
        out.push_str(&format!("enabled = {}\n", params.storage_enabled));
        if params.storage_enabled {
            out.push_str(&format!("reserved_space = {}\n", params.redundancy.reserved_space));
        }
        out
    }

    /// Create the storage node config from scratch.
    pub fn create(&self, params: &StorageNodeParams) -> Result<(), StorageError> {
        fsutil::write_atomic(&self.config_path(), Self::render(params).as_bytes()).context(WriteConfigSnafu)
    }

    /// Read the currently configured introducer locator, if any.
    pub fn current_introducer(&self) -> Result<Option<String>, StorageError> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).context(ReadConfigSnafu { path })?;
        Ok(read_introducer_line(&content))
    }

    /// Replace the introducer locator line if it changed.
    ///
    /// Returns true when the config was rewritten, false when the stored
    /// locator already matched and no write happened.
    pub fn update_introducer(&self, introducer: &str) -> Result<bool, StorageError> {
        let path = self.config_path();
        if !path.exists() {
            return Err(StorageError::NotConfigured { path });
        }
        let content = std::fs::read_to_string(&path).context(ReadConfigSnafu { path: path.clone() })?;

        if read_introducer_line(&content).as_deref() == Some(introducer) {
            return Ok(false);
        }

        let rewritten: String = content
            .lines()
            .map(|line| {
                if line.trim_start().starts_with("introducer.furl") {
                    format!("introducer.furl = {introducer}")
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";

        fsutil::write_atomic(&path, rewritten.as_bytes()).context(WriteConfigSnafu)?;
        Ok(true)
    }
}

fn read_introducer_line(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let trimmed = line.trim_start();
        trimmed
            .strip_prefix("introducer.furl")
            .and_then(|rest| rest.trim_start().strip_prefix('='))
            .map(|value| value.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use tempfile::TempDir;

    fn params(introducer: &str) -> StorageNodeParams {
        StorageNodeParams {
            nickname: "node1-storage".to_string(),
            overlay_addr: "10.100.0.1".parse().unwrap(),
            port: DEFAULT_STORAGE_PORT,
            introducer: introducer.to_string(),
            redundancy: RedundancyPolicy::default(),
            storage_enabled: true,
        }
    }

    fn setup(dir: &Path) -> StorageSetup {
        StorageSetup::new(dir)
    }

    #[test]
    fn create_writes_all_sections() {
        let dir = TempDir::new().unwrap();
        let setup = setup(dir.path());
        assert!(!setup.is_configured());

        setup.create(&params("pb://x@tcp:10.100.0.1:3458/introducer")).unwrap();
        assert!(setup.is_configured());

        let content = std::fs::read_to_string(setup.config_path()).unwrap();
        assert!(content.contains("nickname = node1-storage"));
        assert!(content.contains("tub.location = tcp:10.100.0.1:3457"));
        assert!(content.contains("introducer.furl = pb://x@tcp:10.100.0.1:3458/introducer"));
        assert!(content.contains("shares.needed = 3"));
        assert!(content.contains("shares.happy = 7"));
        assert!(content.contains("shares.total = 10"));
        assert!(content.contains("enabled = true"));
        assert!(content.contains("reserved_space = 50G"));
    }

    #[test]
    fn client_only_config_omits_reserved_space() {
        let dir = TempDir::new().unwrap();
        let setup = setup(dir.path());
        let mut p = params("pb://x@tcp:h:1/i");
        p.storage_enabled = false;
        p.nickname = "node1-client".to_string();
        setup.create(&p).unwrap();

        let content = std::fs::read_to_string(setup.config_path()).unwrap();
        assert!(content.contains("enabled = false"));
        assert!(!content.contains("reserved_space"));
    }

    #[test]
    fn current_introducer_reads_back() {
        let dir = TempDir::new().unwrap();
        let setup = setup(dir.path());
        assert_eq!(setup.current_introducer().unwrap(), None);

        setup.create(&params("pb://x@tcp:h:1/i")).unwrap();
        assert_eq!(setup.current_introducer().unwrap().as_deref(), Some("pb://x@tcp:h:1/i"));
    }

    #[test]
    fn update_with_same_introducer_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let setup = setup(dir.path());
        setup.create(&params("pb://x@tcp:h:1/i")).unwrap();
        let before = std::fs::read_to_string(setup.config_path()).unwrap();

        let written = setup.update_introducer("pb://x@tcp:h:1/i").unwrap();
        assert!(!written);
        assert_eq!(std::fs::read_to_string(setup.config_path()).unwrap(), before);
    }

    #[test]
    fn update_with_changed_introducer_rewrites_only_locator() {
        let dir = TempDir::new().unwrap();
        let setup = setup(dir.path());
        setup.create(&params("pb://old@tcp:h:1/i")).unwrap();

        let written = setup.update_introducer("pb://new@tcp:h:2/i").unwrap();
        assert!(written);

        let content = std::fs::read_to_string(setup.config_path()).unwrap();
        assert!(content.contains("introducer.furl = pb://new@tcp:h:2/i"));
        assert!(!content.contains("pb://old"));
        assert!(content.contains("nickname = node1-storage"), "other lines untouched");
    }

    #[test]
    fn update_without_config_fails() {
        let dir = TempDir::new().unwrap();
        let err = setup(dir.path()).update_introducer("pb://x@tcp:h:1/i").unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured { .. }));
    }
}
