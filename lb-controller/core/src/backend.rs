use crate::{Result, ServicePortMapping};
use std::{fmt, path::Path};

/// Programs NAT rules through a host firewall tool.
///
/// A backend is selected once at startup by [`crate::probe::select_backend`] and is immutable
/// afterwards; it holds no per-mapping state.
#[async_trait::async_trait]
pub trait FirewallBackend: fmt::Debug + Send + Sync {
    /// The name of the firewall tool, e.g. `nft`.
    fn name(&self) -> &'static str;

    /// The absolute path of the firewall tool.
    fn path(&self) -> &Path;

    /// Creates the NAT chains that port rules are installed into.
    ///
    /// Succeeds if the chains already exist.
    async fn bootstrap(&self) -> Result<()>;

    /// Installs the DNAT rule and then the MASQUERADE rule for a mapping.
    ///
    /// The two rules are not installed atomically: if the second command fails, the DNAT rule
    /// remains installed.
    async fn add_port(&self, mapping: &ServicePortMapping) -> Result<()>;

    /// Deletes both rules for a mapping. Fails if either rule is absent.
    async fn remove_port(&self, mapping: &ServicePortMapping) -> Result<()>;
}
