//! VPN service control

use crate::cmd;
use crate::Result;

/// Service lifecycle actions used around configuration changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Enable,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Enable => "enable",
        }
    }
}

/// Capability to drive the VPN service by logical name
pub trait ServiceRunner {
    fn service(&self, action: ServiceAction, name: &str) -> Result<()>;
}

/// Runner backed by `systemctl`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemdRunner;

impl ServiceRunner for SystemdRunner {
    fn service(&self, action: ServiceAction, name: &str) -> Result<()> {
        let output = cmd::run("systemctl", &[action.as_str(), name])?;
        if !output.success() {
            return Err(cmd::failure(
                &format!("systemctl {} {}", action.as_str(), name),
                &output,
            ));
        }
        Ok(())
    }
}
