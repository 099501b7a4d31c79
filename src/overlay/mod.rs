//! Generated configuration for the external overlay daemon.
//!
//! Renders and atomically writes the daemon's main config (node name,
//! interface, ordered `ConnectTo` lines), the per-peer host files
//! (`Address`/`Subnet`/`Port` plus any imported key block), and the
//! executable up/down lifecycle scripts that assign and remove the overlay
//! address on the local interface.
//!
//! Rendering is deterministic: the same topology always produces the same
//! bytes, so regeneration on unchanged input is byte-identical.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

use crate::fsutil;
use crate::keys::extract_key_block;
use crate::topology::HostDescriptor;

/// Errors writing overlay daemon configuration.
#[derive(Debug, Snafu)]
pub enum OverlayError {
    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile { path: PathBuf, source: fsutil::WriteError },
}

/// Writes overlay daemon configuration into a config directory.
#[derive(Debug, Clone)]
pub struct OverlayWriter {
    config_dir: PathBuf,
    node_name: String,
    interface: String,
}

impl OverlayWriter {
    pub fn new(config_dir: impl Into<PathBuf>, node_name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            config_dir: config_dir.into(),
            node_name: node_name.into(),
            interface: interface.into(),
        }
    }

    pub fn conf_path(&self) -> PathBuf {
        self.config_dir.join("mesh.conf")
    }

    pub fn hosts_dir(&self) -> PathBuf {
        self.config_dir.join("hosts")
    }

    pub fn up_script_path(&self) -> PathBuf {
        self.config_dir.join("mesh-up")
    }

    pub fn down_script_path(&self) -> PathBuf {
        self.config_dir.join("mesh-down")
    }

    /// Render the daemon's main config with the active connect-to list.
    pub fn render_conf(&self, connect_to: &[String]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Name = {}", self.node_name);
        let _ = writeln!(out, "Interface = {}", self.interface);
        let _ = writeln!(out, "AddressFamily = ipv4");
        for peer in connect_to {
            let _ = writeln!(out, "ConnectTo = {peer}");
        }
        out
    }

    /// Atomically write the daemon's main config.
    pub fn write_conf(&self, connect_to: &[String]) -> Result<(), OverlayError> {
        let path = self.conf_path();
        fsutil::write_atomic(&path, self.render_conf(connect_to).as_bytes()).context(WriteFileSnafu { path })
    }

    /// Render a host file for one peer.
    ///
    /// Any previously imported key block is appended after the address
    /// lines, so regenerating addresses never discards key material.
    pub fn render_host_file(&self, host: &HostDescriptor, key_block: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(public) = host.public_addr {
            let _ = writeln!(out, "Address = {public}");
        }
        let _ = writeln!(out, "Subnet = {}/32", host.overlay_addr);
        let _ = writeln!(out, "Port = {}", host.port);
        if let Some(block) = key_block {
            let _ = writeln!(out, "{block}");
        }
        out
    }

    /// Atomically write a host file, preserving an existing key block.
    pub fn write_host_file(&self, host: &HostDescriptor) -> Result<(), OverlayError> {
        let path = self.hosts_dir().join(&host.name);
        let existing_key = std::fs::read_to_string(&path).ok().and_then(|content| extract_key_block(&content));
        let rendered = self.render_host_file(host, existing_key.as_deref());
        fsutil::write_atomic(&path, rendered.as_bytes()).context(WriteFileSnafu { path })
    }

    /// Write the executable up/down lifecycle scripts.
    ///
    /// The up script assigns the overlay address with the network's prefix
    /// length and brings the interface up; the down script undoes both.
    pub fn write_scripts(&self, overlay_addr: IpAddr, prefix_len: u8) -> Result<(), OverlayError> {
        let up = format!(
            "#!/bin/sh\nip addr add {overlay_addr}/{prefix_len} dev $INTERFACE\nip link set $INTERFACE up\n"
        );
        let down = format!(
            "#!/bin/sh\nip addr del {overlay_addr}/{prefix_len} dev $INTERFACE\nip link set $INTERFACE down\n"
        );

        let up_path = self.up_script_path();
        fsutil::write_atomic_executable(&up_path, up.as_bytes()).context(WriteFileSnafu { path: up_path.clone() })?;
        let down_path = self.down_script_path();
        fsutil::write_atomic_executable(&down_path, down.as_bytes()).context(WriteFileSnafu { path: down_path.clone() })?;
        Ok(())
    }
}

/// Monitors readiness of the local overlay link.
#[async_trait::async_trait]
pub trait LinkMonitor: Send + Sync {
    /// True when the overlay interface exists on this host.
    async fn link_ready(&self, interface: &str) -> bool;
}

/// Production link monitor: checks for the interface under `/sys/class/net`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysfsLinkMonitor;

#[async_trait::async_trait]
impl LinkMonitor for SysfsLinkMonitor {
    async fn link_ready(&self, interface: &str) -> bool {
        Path::new("/sys/class/net").join(interface).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn host(name: &str, overlay: &str, public: Option<&str>) -> HostDescriptor {
        HostDescriptor {
            name: name.to_string(),
            overlay_addr: overlay.parse().unwrap(),
            public_addr: public.map(|p| p.parse().unwrap()),
            port: 655,
        }
    }

    #[test]
    fn conf_contains_name_and_connect_lines() {
        let dir = TempDir::new().unwrap();
        let writer = OverlayWriter::new(dir.path(), "test-node", "weft0");
        writer.write_conf(&["peer1".to_string(), "peer2".to_string()]).unwrap();

        let content = std::fs::read_to_string(writer.conf_path()).unwrap();
        assert!(content.contains("Name = test-node"));
        assert!(content.contains("Interface = weft0"));
        assert!(content.contains("ConnectTo = peer1"));
        assert!(content.contains("ConnectTo = peer2"));
    }

    #[test]
    fn conf_rendering_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let writer = OverlayWriter::new(dir.path(), "test-node", "weft0");
        let peers = vec!["a".to_string(), "b".to_string()];
        assert_eq!(writer.render_conf(&peers), writer.render_conf(&peers));
    }

    #[test]
    fn host_file_layout() {
        let dir = TempDir::new().unwrap();
        let writer = OverlayWriter::new(dir.path(), "test-node", "weft0");
        let rendered = writer.render_host_file(&host("peer1", "10.100.0.1", Some("1.2.3.4")), None);
        assert_eq!(rendered, "Address = 1.2.3.4\nSubnet = 10.100.0.1/32\nPort = 655\n");
    }

    #[test]
    fn host_file_without_public_addr_omits_address_line() {
        let dir = TempDir::new().unwrap();
        let writer = OverlayWriter::new(dir.path(), "test-node", "weft0");
        let rendered = writer.render_host_file(&host("peer1", "10.100.0.1", None), None);
        assert!(!rendered.contains("Address"));
        assert!(rendered.contains("Subnet = 10.100.0.1/32"));
    }

    #[test]
    fn rewriting_host_file_preserves_key_block() {
        let dir = TempDir::new().unwrap();
        let writer = OverlayWriter::new(dir.path(), "test-node", "weft0");
        let hosts = writer.hosts_dir();
        std::fs::create_dir_all(&hosts).unwrap();
        std::fs::write(
            hosts.join("peer1"),
            "Subnet = 10.100.0.9/32\n-----BEGIN RSA PUBLIC KEY-----\nKEY\n-----END RSA PUBLIC KEY-----\n",
        )
        .unwrap();

        writer.write_host_file(&host("peer1", "10.100.0.1", Some("1.2.3.4"))).unwrap();

        let content = std::fs::read_to_string(hosts.join("peer1")).unwrap();
        assert!(content.contains("Subnet = 10.100.0.1/32"), "address lines regenerated");
        assert!(content.contains("-----BEGIN RSA PUBLIC KEY-----"), "key block preserved");
    }

    #[cfg(unix)]
    #[test]
    fn scripts_are_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let writer = OverlayWriter::new(dir.path(), "test-node", "weft0");
        writer.write_scripts("10.100.0.1".parse().unwrap(), 16).unwrap();

        for path in [writer.up_script_path(), writer.down_script_path()] {
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert!(mode & 0o111 != 0, "{} should be executable", path.display());
        }

        let up = std::fs::read_to_string(writer.up_script_path()).unwrap();
        assert!(up.contains("10.100.0.1/16"));
        let down = std::fs::read_to_string(writer.down_script_path()).unwrap();
        assert!(down.contains("ip addr del"));
    }
}
