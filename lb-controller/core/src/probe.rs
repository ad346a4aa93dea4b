//! Firewall tool discovery.

use crate::{exec::Exec, iptables, nft, Error, FirewallBackend, Ipv4Net, Result};
use std::{
    ffi::OsString,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

/// System binary directories searched before `$PATH`.
pub const SYSTEM_DIRS: &[&str] = &[
    "/usr/local/sbin",
    "/usr/sbin",
    "/sbin",
    "/usr/local/bin",
    "/usr/bin",
    "/bin",
];

/// Where to look for executables: a fixed list of directories, then an executable search path.
#[derive(Clone, Debug)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
    env_path: Option<OsString>,
}

/// Returns a backend for the first firewall tool found, preferring `nft` over `iptables`.
pub fn select_backend(
    search: &SearchPath,
    exec: Arc<dyn Exec>,
    masquerade_net: Ipv4Net,
) -> Result<Arc<dyn FirewallBackend>> {
    if let Some(path) = search.find(nft::NAME) {
        info!(path = %path.display(), "Using nftables");
        return Ok(Arc::new(nft::Nftables::new(path, exec, masquerade_net)));
    }

    if let Some(path) = search.find(iptables::NAME) {
        info!(path = %path.display(), "Using iptables");
        return Ok(Arc::new(iptables::Iptables::new(
            path,
            exec,
            masquerade_net,
        )));
    }

    Err(Error::BackendNotFound)
}

// === impl SearchPath ===

impl SearchPath {
    pub fn new<I>(dirs: I, env_path: Option<OsString>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            env_path,
        }
    }

    /// The system directories followed by the process's `PATH`.
    pub fn from_env() -> Self {
        Self::new(SYSTEM_DIRS.iter().copied(), std::env::var_os("PATH"))
    }

    /// Returns the absolute path of the first executable named `name`.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        self.dirs
            .iter()
            .cloned()
            .chain(self.env_path.iter().flat_map(std::env::split_paths))
            .filter(|dir| dir.is_absolute())
            .map(|dir| dir.join(name))
            .find(|path| is_executable(path))
    }
}

impl Default for SearchPath {
    fn default() -> Self {
        Self::from_env()
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
