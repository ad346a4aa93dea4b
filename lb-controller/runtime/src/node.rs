use anyhow::{bail, Context, Result};
use nix::{ifaddrs, net::if_::InterfaceFlags};
use std::net::Ipv4Addr;
use tracing::debug;

/// An address bound to a host network interface.
#[derive(Clone, Debug, PartialEq, Eq)]
struct InterfaceAddr {
    name: String,
    flags: InterfaceFlags,
    addr: Option<Ipv4Addr>,
}

/// Determines the address this node advertises for load balancer services.
///
/// An explicitly configured address is used as-is. Otherwise, the first IPv4 address of the named
/// interface is used; the interface must be up and must not be a loopback interface.
pub(crate) fn resolve_addr(node_ip: Option<Ipv4Addr>, interface: &str) -> Result<Ipv4Addr> {
    if let Some(addr) = node_ip {
        debug!(%addr, "Using configured node address");
        return Ok(addr);
    }

    let addrs = ifaddrs::getifaddrs()
        .context("failed to list network interfaces")?
        .map(|ifa| InterfaceAddr {
            addr: ifa
                .address
                .as_ref()
                .and_then(|sa| sa.as_sockaddr_in())
                .map(|sin| Ipv4Addr::from(sin.ip())),
            name: ifa.interface_name,
            flags: ifa.flags,
        });

    match first_ipv4(addrs, interface) {
        Some(addr) => {
            debug!(%addr, %interface, "Using interface address");
            Ok(addr)
        }
        None => bail!("no IPv4 address found on interface {interface}"),
    }
}

fn first_ipv4(addrs: impl IntoIterator<Item = InterfaceAddr>, interface: &str) -> Option<Ipv4Addr> {
    addrs
        .into_iter()
        .filter(|ifa| ifa.name == interface)
        .filter(|ifa| {
            ifa.flags.contains(InterfaceFlags::IFF_UP)
                && !ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK)
        })
        .find_map(|ifa| ifa.addr)
}
