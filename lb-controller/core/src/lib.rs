//! Bare-metal load balancer core
//!
//! Programs host NAT rules so that traffic addressed to a node's external address on a service's
//! port is forwarded to the service's node port:
//!
//! - The [`probe`] locates a firewall tool on the host, preferring `nft` over `iptables`.
//! - Each [`FirewallBackend`] translates bootstrap, add-port and remove-port operations into its
//!   own command grammar.
//! - The [`Reconciler`] installs a DNAT/MASQUERADE rule pair for every port of an eligible
//!   service, and removes them when the service becomes ineligible or is deleted.
//!
//! ```text
//! [ Service ] -> [ Reconciler ] -> [ FirewallBackend ] -> [ Exec ] -> host NAT tables
//! ```
//!
//! The host's rule tables are the only record of installed rules.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backend;
mod error;
pub mod exec;
pub mod iptables;
pub mod metrics;
pub mod nft;
pub mod probe;
mod reconcile;
mod service;


pub use self::{
    backend::FirewallBackend,
    error::{Error, Result},
    metrics::ReconcileMetrics,
    reconcile::{PublishStatus, Reconciled, Reconciler},
    service::{LoadBalancerService, ServicePort, ServicePortMapping},
};
pub use ipnet::Ipv4Net;

/// The network whose node-port traffic is masqueraded, unless configured otherwise.
pub const DEFAULT_MASQUERADE_NETWORK: &str = "10.0.0.0/8";
