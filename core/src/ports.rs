//! Firewall port bookkeeping

use crate::cmd;
use crate::model::{PortRule, Protocol};
use crate::{Error, Result};
use log::{error, info, warn};

/// Host firewall capability: query and mutate the set of open port rules
pub trait Firewall {
    fn opened_ports(&self) -> Result<Vec<PortRule>>;
    fn open_port(&self, rule: PortRule) -> Result<()>;
    fn close_port(&self, rule: PortRule) -> Result<()>;
}

/// Firewall backed by the `ufw` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct UfwFirewall;

impl Firewall for UfwFirewall {
    fn opened_ports(&self) -> Result<Vec<PortRule>> {
        let output = cmd::run("ufw", &["status"])?;
        if !output.success() {
            return Err(cmd::failure("ufw status", &output));
        }
        Ok(parse_ufw_status(&output.stdout))
    }

    fn open_port(&self, rule: PortRule) -> Result<()> {
        let token = rule.to_string();
        let output = cmd::run("ufw", &["allow", &token])?;
        if !output.success() {
            return Err(cmd::failure(&format!("ufw allow {}", token), &output));
        }
        Ok(())
    }

    fn close_port(&self, rule: PortRule) -> Result<()> {
        let token = rule.to_string();
        let output = cmd::run("ufw", &["delete", "allow", &token])?;
        if !output.success() {
            return Err(cmd::failure(&format!("ufw delete allow {}", token), &output));
        }
        Ok(())
    }
}

/// Extract `"port/protocol"` rules from `ufw status` output.
///
/// IPv6 counterparts report the same token and are deduplicated. Tokens with
/// an unrecognized protocol are left alone, never treated as closable.
fn parse_ufw_status(output: &str) -> Vec<PortRule> {
    let mut rules = Vec::new();
    for line in output.lines() {
        if !line.contains("ALLOW") {
            continue;
        }
        let Some(token) = line.split_whitespace().next() else {
            continue;
        };
        match PortRule::parse(token) {
            Some(rule) => {
                if !rules.contains(&rule) {
                    rules.push(rule);
                }
            }
            None => {
                if token.contains('/') {
                    warn!("skipping unrecognized firewall rule token '{}'", token);
                }
            }
        }
    }
    rules
}

/// Converge the open port set on exactly one UDP rule at `listen_port`.
///
/// Conflicting rules are closed: UDP rules on any other port, and rules of
/// other protocols that collide on the target port number. Unrelated rules
/// are preserved. A failed close is logged and skipped; the final open is
/// unconditional since the host treats re-opening as a no-op.
pub fn configure_ports(firewall: &dyn Firewall, listen_port: u16) -> Result<()> {
    let desired = PortRule::udp(listen_port);
    for rule in firewall.opened_ports()? {
        let conflicting = match rule.protocol {
            Protocol::Udp => rule.port != listen_port,
            _ => rule.port == listen_port,
        };
        if !conflicting {
            continue;
        }
        info!("closing stale firewall rule {}", rule);
        if let Err(e) = firewall.close_port(rule) {
            error!("failed to close stale rule {}: {}", rule, e);
        }
    }
    firewall
        .open_port(desired)
        .map_err(|e| Error::firewall(format!("failed to open {}: {}", desired, e)))
}
