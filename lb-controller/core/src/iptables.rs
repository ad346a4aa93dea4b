//! The legacy iptables rule grammar.
//!
//! Rules are appended to dedicated `LB-PREROUTING` and `LB-POSTROUTING` chains in the `nat`
//! table, which are jumped to from the built-in `PREROUTING` and `POSTROUTING` chains.

use crate::{
    exec::{self, Command, Exec},
    Error, FirewallBackend, Ipv4Net, Result, ServicePortMapping,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

pub const NAME: &str = "iptables";

pub const LB_PREROUTING: &str = "LB-PREROUTING";
pub const LB_POSTROUTING: &str = "LB-POSTROUTING";

const TABLE: &str = "nat";
const PREROUTING: &str = "PREROUTING";
const POSTROUTING: &str = "POSTROUTING";

/// Reported by `iptables -N` when the chain already exists.
const ALREADY_EXISTS: &str = "already exists";

#[derive(Debug)]
pub struct Iptables {
    path: PathBuf,
    exec: Arc<dyn Exec>,
    masquerade_net: Ipv4Net,
}

/// A rule specification within one of the dedicated chains.
type Rule = (&'static str, Vec<String>);

// === impl Iptables ===

impl Iptables {
    pub fn new(path: impl Into<PathBuf>, exec: Arc<dyn Exec>, masquerade_net: Ipv4Net) -> Self {
        Self {
            path: path.into(),
            exec,
            masquerade_net,
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.path)
    }

    fn nat(&self, verb: &str, chain: &str) -> Command {
        self.command().args(["-t", TABLE, verb, chain])
    }

    fn dnat(&self, mapping: &ServicePortMapping) -> Rule {
        (
            LB_PREROUTING,
            vec![
                "-d".to_string(),
                mapping.external_addr.to_string(),
                "-p".to_string(),
                "tcp".to_string(),
                "--dport".to_string(),
                mapping.service_port.to_string(),
                "-j".to_string(),
                "DNAT".to_string(),
                "--to-destination".to_string(),
                format!(":{}", mapping.node_port),
            ],
        )
    }

    fn masquerade(&self, mapping: &ServicePortMapping) -> Rule {
        (
            LB_POSTROUTING,
            vec![
                "-d".to_string(),
                self.masquerade_net.to_string(),
                "-p".to_string(),
                "tcp".to_string(),
                "--dport".to_string(),
                mapping.node_port.to_string(),
                "-j".to_string(),
                "MASQUERADE".to_string(),
            ],
        )
    }

    async fn run_bootstrap(&self, command: Command) -> Result<()> {
        let out = exec::run(&*self.exec, &command).await;
        if !out.success {
            return Err(Error::BootstrapFailed {
                command,
                output: out.output,
            });
        }
        Ok(())
    }

    async fn create_chain(&self, chain: &str) -> Result<()> {
        let command = self.nat("-N", chain);
        let out = exec::run(&*self.exec, &command).await;
        if out.success {
            return Ok(());
        }
        if out.contains(ALREADY_EXISTS) {
            debug!(chain, "Chain already exists");
            return Ok(());
        }
        Err(Error::BootstrapFailed {
            command,
            output: out.output,
        })
    }

    /// Jumps from a built-in chain to `chain` unless the jump rule is already present.
    async fn hook_chain(&self, builtin: &str, chain: &str) -> Result<()> {
        let check = self.nat("-C", builtin).args(["-j", chain]);
        if exec::run(&*self.exec, &check).await.success {
            debug!(builtin, chain, "Jump rule already exists");
            return Ok(());
        }
        self.run_bootstrap(self.nat("-A", builtin).args(["-j", chain]))
            .await
    }

    async fn mutate(&self, verb: &str, (chain, spec): &Rule) -> Result<()> {
        let command = self.nat(verb, chain).args(spec.iter().cloned());
        let out = exec::run(&*self.exec, &command).await;
        if !out.success {
            return Err(Error::RuleMutationFailed {
                command,
                output: out.output,
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl FirewallBackend for Iptables {
    fn name(&self) -> &'static str {
        NAME
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn bootstrap(&self) -> Result<()> {
        // Fail early if the binary cannot run at all.
        self.run_bootstrap(self.command().arg("-V")).await?;

        for (builtin, chain) in [(PREROUTING, LB_PREROUTING), (POSTROUTING, LB_POSTROUTING)] {
            self.create_chain(chain).await?;
            self.hook_chain(builtin, chain).await?;
        }

        info!(path = %self.path.display(), "Bootstrapped iptables NAT chains");
        Ok(())
    }

    async fn add_port(&self, mapping: &ServicePortMapping) -> Result<()> {
        self.mutate("-A", &self.dnat(mapping)).await?;
        self.mutate("-A", &self.masquerade(mapping)).await
    }

    async fn remove_port(&self, mapping: &ServicePortMapping) -> Result<()> {
        self.mutate("-D", &self.dnat(mapping)).await?;
        self.mutate("-D", &self.masquerade(mapping)).await
    }
}
