//! Domain model types for the WireGuard host manager

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Desired-state configuration for one reconciliation pass.
///
/// Deserialized from the operator-facing snapshot file; immutable for the
/// duration of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigSnapshot {
    /// Operator-supplied private key; generated via the key tool when absent
    #[serde(default)]
    pub private_key: Option<String>,
    /// UDP port the tunnel listens on
    pub listen_port: u16,
    /// CIDR address for the local tunnel interface
    pub address: String,
    /// Whether kernel IP forwarding should be enabled
    #[serde(default)]
    pub forward_ip: bool,
    /// Egress device used in the forwarding rules
    #[serde(default)]
    pub forward_dev: String,
    /// Base64-encoded YAML sequence of peer records; empty means no peers
    #[serde(default)]
    pub peers: String,
}

impl ConfigSnapshot {
    /// Load a snapshot from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let snapshot: Self = toml::from_str(&content)?;
        Ok(snapshot)
    }

    /// Save the snapshot to a TOML file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the snapshot fields
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(Error::validation("listen-port must be between 1 and 65535"));
        }
        if self.address.is_empty() {
            return Err(Error::validation("address cannot be empty"));
        }
        if self.forward_ip {
            if self.forward_dev.is_empty() {
                return Err(Error::validation(
                    "forward-dev is required when forward-ip is enabled",
                ));
            }
            validate_device_name(&self.forward_dev)?;
        }
        Ok(())
    }
}

/// A remote VPN endpoint record decoded from the peer blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub public_key: String,
    pub allowed_ips: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub persistent_keepalive: Option<u16>,
}

/// Current snapshot plus the previously applied one, when the trigger is a
/// configuration change. The previous value is only available transiently
/// during the change event, so the caller supplies it rather than the engine
/// re-deriving it.
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    pub current: ConfigSnapshot,
    pub previous: Option<ConfigSnapshot>,
}

impl ConfigUpdate {
    /// Update for a first install: no previous snapshot exists
    pub fn install(current: ConfigSnapshot) -> Self {
        Self {
            current,
            previous: None,
        }
    }

    /// Update for a configuration change against a known previous snapshot
    pub fn changed(current: ConfigSnapshot, previous: ConfigSnapshot) -> Self {
        Self {
            current,
            previous: Some(previous),
        }
    }

    pub fn listen_port_changed(&self) -> bool {
        self.previous_listen_port()
            .map(|port| port != self.current.listen_port)
            .unwrap_or(false)
    }

    pub fn previous_listen_port(&self) -> Option<u16> {
        self.previous.as_ref().map(|snapshot| snapshot.listen_port)
    }
}

/// Firewall protocol for a port rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "udp" => Some(Protocol::Udp),
            "tcp" => Some(Protocol::Tcp),
            _ => None,
        }
    }
}

/// A single open firewall rule, e.g. `51820/udp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRule {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortRule {
    pub fn new(port: u16, protocol: Protocol) -> Self {
        Self { port, protocol }
    }

    pub fn udp(port: u16) -> Self {
        Self::new(port, Protocol::Udp)
    }

    /// Parse a `"port/protocol"` token; returns `None` for malformed tokens
    /// or unknown protocols
    pub fn parse(token: &str) -> Option<Self> {
        let (port, protocol) = token.trim().split_once('/')?;
        let port: u16 = port.parse().ok()?;
        if port == 0 {
            return None;
        }
        Some(Self::new(port, Protocol::parse(protocol)?))
    }
}

impl fmt::Display for PortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol.as_str())
    }
}

/// Filesystem layout and service identity for one host.
///
/// Constructed once per reconciliation pass and threaded through each
/// component call; nothing in the crate holds process-wide state.
#[derive(Debug, Clone)]
pub struct HostPaths {
    /// Directory holding key material and the rendered config
    pub key_dir: PathBuf,
    /// Legacy flat-file private key, migration source only
    pub legacy_private_key: PathBuf,
    /// Legacy flat-file public key, migration source only
    pub legacy_public_key: PathBuf,
    /// Key-value store for long-lived key material
    pub key_store: PathBuf,
    /// Rendered WireGuard configuration
    pub config_file: PathBuf,
    /// Sysctl forwarding declaration file
    pub sysctl_file: PathBuf,
    /// Directory for the last-applied snapshot
    pub state_dir: PathBuf,
    /// Logical service name controlled around config changes
    pub service_name: String,
}

impl Default for HostPaths {
    fn default() -> Self {
        let key_dir = PathBuf::from("/etc/wireguard");
        Self {
            legacy_private_key: key_dir.join("privatekey"),
            legacy_public_key: key_dir.join("publickey"),
            key_store: key_dir.join("keystore.toml"),
            config_file: key_dir.join("wg0.conf"),
            key_dir,
            sysctl_file: PathBuf::from("/etc/sysctl.d/99-wireguard-forward.conf"),
            state_dir: PathBuf::from("/var/lib/wg-host"),
            service_name: "wg-quick@wg0".to_string(),
        }
    }
}

impl HostPaths {
    /// Layout with every path placed under `root`, keeping the production
    /// file names. Used by tests and sandboxed runs.
    pub fn rooted(root: &Path) -> Self {
        let key_dir = root.join("wireguard");
        Self {
            legacy_private_key: key_dir.join("privatekey"),
            legacy_public_key: key_dir.join("publickey"),
            key_store: key_dir.join("keystore.toml"),
            config_file: key_dir.join("wg0.conf"),
            key_dir,
            sysctl_file: root.join("sysctl.d").join("99-wireguard-forward.conf"),
            state_dir: root.join("state"),
            service_name: "wg-quick@wg0".to_string(),
        }
    }
}

/// Validates a network device name (egress device for forwarding rules)
pub fn validate_device_name(name: &str) -> Result<()> {
    let re = regex::Regex::new(r"^[A-Za-z0-9._-]{1,15}$").unwrap();
    if !re.is_match(name) {
        return Err(Error::validation(format!(
            "'{}' is not a valid network device name",
            name
        )));
    }
    Ok(())
}
