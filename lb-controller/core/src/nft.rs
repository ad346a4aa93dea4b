//! The nftables rule grammar.
//!
//! Rules live in the `ip nat` table, in base chains hooked at prerouting and postrouting. `nft`
//! deletes rules by handle, so removal lists the chain and looks up the handle of the rule that
//! matches the selectors used at installation time.

use crate::{
    exec::{self, Command, Exec},
    Error, FirewallBackend, Ipv4Net, Result, ServicePortMapping,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

pub const NAME: &str = "nft";

const FAMILY: &str = "ip";
const TABLE: &str = "nat";
const PREROUTING: &str = "prerouting";
const POSTROUTING: &str = "postrouting";

/// Reported by `nft` when adding a table or chain that already exists.
const ALREADY_EXISTS: &str = "File exists";

#[derive(Debug)]
pub struct Nftables {
    path: PathBuf,
    exec: Arc<dyn Exec>,
    masquerade_net: Ipv4Net,
}

/// A rule in one of the NAT chains.
#[derive(Debug)]
struct Rule {
    chain: &'static str,

    /// Match expressions, e.g. `ip daddr 192.0.2.1 tcp dport 80`.
    selector: Vec<String>,

    /// The rule's statement, e.g. `dnat to :31080`.
    statement: Vec<String>,
}

// === impl Nftables ===

impl Nftables {
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

    fn bootstrap_commands(&self) -> Vec<Command> {
        vec![
            self.command().args(["add", "table", FAMILY, TABLE]),
            self.command()
                .args(["add", "chain", FAMILY, TABLE, PREROUTING])
                .arg("{ type nat hook prerouting priority 0; }"),
            self.command()
                .args(["add", "chain", FAMILY, TABLE, POSTROUTING])
                .arg("{ type nat hook postrouting priority 100; }"),
        ]
    }

    fn dnat(&self, mapping: &ServicePortMapping) -> Rule {
        Rule {
            chain: PREROUTING,
            selector: vec![
                "ip".to_string(),
                "daddr".to_string(),
                mapping.external_addr.to_string(),
                "tcp".to_string(),
                "dport".to_string(),
                mapping.service_port.to_string(),
            ],
            statement: vec![
                "dnat".to_string(),
                "to".to_string(),
                format!(":{}", mapping.node_port),
            ],
        }
    }

    fn masquerade(&self, mapping: &ServicePortMapping) -> Rule {
        Rule {
            chain: POSTROUTING,
            selector: vec![
                "ip".to_string(),
                "daddr".to_string(),
                self.masquerade_net.to_string(),
                "tcp".to_string(),
                "dport".to_string(),
                mapping.node_port.to_string(),
            ],
            statement: vec!["masquerade".to_string()],
        }
    }

    async fn mutate(&self, command: Command) -> Result<()> {
        let out = exec::run(&*self.exec, &command).await;
        if !out.success {
            return Err(Error::RuleMutationFailed {
                command,
                output: out.output,
            });
        }
        Ok(())
    }

    async fn add(&self, rule: &Rule) -> Result<()> {
        let command = self
            .command()
            .args(["add", "rule", FAMILY, TABLE, rule.chain])
            .args(rule.selector.iter().chain(&rule.statement).cloned());
        self.mutate(command).await
    }

    async fn delete(&self, rule: &Rule) -> Result<()> {
        let list = self
            .command()
            .args(["-a", "list", "chain", FAMILY, TABLE, rule.chain]);
        let out = exec::run(&*self.exec, &list).await;
        if !out.success {
            return Err(Error::RuleMutationFailed {
                command: list,
                output: out.output,
            });
        }

        let handle = match out.output.lines().find_map(|line| rule.handle(line)) {
            Some(handle) => handle,
            None => {
                return Err(Error::RuleMutationFailed {
                    command: list,
                    output: format!("no rule matching '{}'", rule.selector.join(" ")),
                })
            }
        };
        debug!(chain = rule.chain, handle, "Found rule");

        let command = self
            .command()
            .args(["delete", "rule", FAMILY, TABLE, rule.chain, "handle"])
            .arg(handle.to_string());
        self.mutate(command).await
    }
}

#[async_trait::async_trait]
impl FirewallBackend for Nftables {
    fn name(&self) -> &'static str {
        NAME
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn bootstrap(&self) -> Result<()> {
        for command in self.bootstrap_commands() {
            let out = exec::run(&*self.exec, &command).await;
            if out.success {
                continue;
            }
            if out.contains(ALREADY_EXISTS) {
                debug!(%command, "Already exists");
                continue;
            }
            return Err(Error::BootstrapFailed {
                command,
                output: out.output,
            });
        }

        info!(path = %self.path.display(), "Bootstrapped nftables NAT chains");
        Ok(())
    }

    async fn add_port(&self, mapping: &ServicePortMapping) -> Result<()> {
        self.add(&self.dnat(mapping)).await?;
        self.add(&self.masquerade(mapping)).await
    }

    async fn remove_port(&self, mapping: &ServicePortMapping) -> Result<()> {
        self.delete(&self.dnat(mapping)).await?;
        self.delete(&self.masquerade(mapping)).await
    }
}

// === impl Rule ===

impl Rule {
    /// Parses a line of `nft -a list chain` output, returning its handle if the line is this rule.
    ///
    /// Every selector and statement token must match, so rules that differ only in their target
    /// are told apart.
    fn handle(&self, line: &str) -> Option<u64> {
        let (listed, handle) = line.rsplit_once("# handle ")?;
        let expected = self.selector.iter().chain(&self.statement).map(String::as_str);
        if !listed.split_whitespace().eq(expected) {
            return None;
        }
        handle.trim().parse().ok()
    }
}
