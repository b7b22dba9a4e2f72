//! WireGuard Host Manager Core Library
//!
//! This crate drives a host's WireGuard endpoint to match a declarative
//! configuration snapshot: key material in a persistent store (with
//! migration from legacy flat files), a rendered `wg0.conf`, kernel IP
//! forwarding flags, firewall port rules, and the tunnel service itself.
//! Host side effects go through small capability traits so reconciliation
//! is deterministic under test.

pub mod cmd;
pub mod error;
pub mod forwarding;
pub mod keys;
pub mod model;
pub mod ports;
pub mod reconcile;
pub mod render;
pub mod service;
pub mod store;

pub use cmd::CommandOutput;
pub use error::{Error, Result};
pub use forwarding::{SysctlApplier, SysctlCli};
pub use keys::{KeyTool, WgKeyTool};
pub use model::*;
pub use ports::{Firewall, UfwFirewall};
pub use reconcile::{EchoIpResolver, IpResolver, Reconciler, StatusReport};
pub use service::{ServiceAction, ServiceRunner, SystemdRunner};
pub use store::KeyStore;
