//! Reconciliation engine: drives host state to match a configuration snapshot

use crate::forwarding::{self, SysctlApplier, SysctlCli};
use crate::keys::{self, KeyTool, WgKeyTool};
use crate::model::{ConfigSnapshot, ConfigUpdate, HostPaths, PortRule};
use crate::ports::{self, Firewall, UfwFirewall};
use crate::render;
use crate::service::{ServiceAction, ServiceRunner, SystemdRunner};
use crate::store::{KeyStore, PRIVATE_KEY, PUBLIC_KEY};
use crate::{cmd, Error, Result};
use log::{debug, error, info};

/// Read-only status report for the endpoint
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub public_key: String,
    pub public_ip: Option<String>,
    pub listen_port: u16,
}

/// Best-effort public IP discovery for the status report
pub trait IpResolver {
    fn public_ip(&self) -> Option<String>;
}

/// Resolver backed by an IP echo service, queried via `curl` or `wget`
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoIpResolver;

impl IpResolver for EchoIpResolver {
    fn public_ip(&self) -> Option<String> {
        let attempts: [(&str, &[&str]); 2] = [
            ("curl", &["-fsSL", "https://api.ipify.org"]),
            ("wget", &["-qO-", "https://api.ipify.org"]),
        ];
        for (bin, args) in attempts {
            let Ok(output) = cmd::run(bin, args) else {
                continue;
            };
            if !output.success() {
                continue;
            }
            let ip = output.stdout.trim().to_string();
            if ip.parse::<std::net::IpAddr>().is_ok() {
                return Some(ip);
            }
        }
        None
    }
}

/// Orchestrates the component sequence on every trigger.
///
/// Holds the per-host paths and the injected host capabilities; everything
/// else is re-derived from the snapshot on each pass, so repeated runs
/// against unchanged configuration converge to the same host state.
pub struct Reconciler {
    paths: HostPaths,
    key_tool: Box<dyn KeyTool>,
    sysctl: Box<dyn SysctlApplier>,
    service: Box<dyn ServiceRunner>,
    firewall: Box<dyn Firewall>,
    resolver: Box<dyn IpResolver>,
}

impl Reconciler {
    /// Reconciler with the production capabilities (`wg`, `sysctl`,
    /// `systemctl`, `ufw`)
    pub fn new(paths: HostPaths) -> Self {
        Self::with_capabilities(
            paths,
            Box::new(WgKeyTool),
            Box::new(SysctlCli),
            Box::new(SystemdRunner),
            Box::new(UfwFirewall),
            Box::new(EchoIpResolver),
        )
    }

    pub fn with_capabilities(
        paths: HostPaths,
        key_tool: Box<dyn KeyTool>,
        sysctl: Box<dyn SysctlApplier>,
        service: Box<dyn ServiceRunner>,
        firewall: Box<dyn Firewall>,
        resolver: Box<dyn IpResolver>,
    ) -> Self {
        Self {
            paths,
            key_tool,
            sysctl,
            service,
            firewall,
            resolver,
        }
    }

    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    /// Run one full reconciliation pass.
    ///
    /// Fatal failures (bad snapshot, malformed peers, key tool errors,
    /// service start) abort the remaining steps and surface to the caller;
    /// the caller owns the resulting status. Peer decoding happens before
    /// any host mutation so malformed input leaves the host untouched.
    pub fn reconcile(&self, update: &ConfigUpdate) -> Result<()> {
        let snapshot = &update.current;
        snapshot.validate()?;
        let peers = render::decode_peers(&snapshot.peers)?;

        let mut store = KeyStore::open(&self.paths.key_store)?;
        keys::configure_keys(&mut store, &self.paths, self.key_tool.as_ref(), snapshot)?;
        let private_key = store
            .get(PRIVATE_KEY)
            .map(str::to_owned)
            .ok_or_else(|| Error::store("private key missing after key configuration"))?;

        // Stop before touching the config so the running tunnel never reads
        // a half-applied state. The unit may not exist yet on first install.
        if let Err(e) = self
            .service
            .service(ServiceAction::Stop, &self.paths.service_name)
        {
            debug!("service stop before render: {}", e);
        }

        let content = render::render_config(snapshot, &private_key, &peers);
        render::write_config(&self.paths.config_file, &content)?;
        info!(
            "rendered {} with {} peer(s)",
            self.paths.config_file.display(),
            peers.len()
        );

        forwarding::configure_forwarding(&self.paths, self.sysctl.as_ref(), snapshot.forward_ip)?;

        self.service
            .service(ServiceAction::Enable, &self.paths.service_name)?;
        self.service
            .service(ServiceAction::Start, &self.paths.service_name)?;

        if update.listen_port_changed() {
            if let Some(previous) = update.previous_listen_port() {
                let stale = PortRule::udp(previous);
                info!("listen port changed, closing previous rule {}", stale);
                if let Err(e) = self.firewall.close_port(stale) {
                    error!("failed to close previous listen port {}: {}", stale, e);
                }
            }
        }
        ports::configure_ports(self.firewall.as_ref(), snapshot.listen_port)?;

        info!("reconciliation complete");
        Ok(())
    }

    /// Read-only status query: stored public key, discovered public IP, and
    /// the configured listen port. No host state is modified.
    pub fn status(&self, snapshot: &ConfigSnapshot) -> Result<StatusReport> {
        let store = KeyStore::open(&self.paths.key_store)?;
        let public_key = store
            .get(PUBLIC_KEY)
            .map(str::to_owned)
            .ok_or_else(|| Error::store("public key not configured"))?;
        Ok(StatusReport {
            public_key,
            public_ip: self.resolver.public_ip(),
            listen_port: snapshot.listen_port,
        })
    }
}
