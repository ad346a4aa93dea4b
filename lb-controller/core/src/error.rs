use crate::exec::Command;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no usable firewall tool found (searched for nft and iptables)")]
    BackendNotFound,

    #[error("firewall bootstrap failed: {command}: {output}")]
    BootstrapFailed { command: Command, output: String },

    #[error("firewall rule mutation failed: {command}: {output}")]
    RuleMutationFailed { command: Command, output: String },

    #[error("failed to publish service status: {0}")]
    StatusPublicationFailed(anyhow::Error),
}

impl Error {
    /// Returns the command that failed, if this error was caused by one.
    pub fn command(&self) -> Option<&Command> {
        match self {
            Self::BootstrapFailed { command, .. } | Self::RuleMutationFailed { command, .. } => {
                Some(command)
            }
            Self::BackendNotFound | Self::StatusPublicationFailed(_) => None,
        }
    }
}
