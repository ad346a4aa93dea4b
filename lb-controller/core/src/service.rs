use std::{fmt, net::Ipv4Addr, num::NonZeroU16};

/// A snapshot of a service as delivered by the event source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadBalancerService {
    pub namespace: String,
    pub name: String,

    /// Whether the service requests an external load balancer.
    pub eligible: bool,

    pub ports: Vec<ServicePort>,

    /// Addresses (IPs or hostnames) currently advertised for the service, in order.
    pub ingress: Vec<String>,
}

/// A TCP port exposed by a service.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServicePort {
    /// The port clients connect to on the external address.
    pub port: NonZeroU16,

    /// The port the workload is reachable on, or `None` if it has not been assigned yet.
    pub node_port: Option<NonZeroU16>,
}

/// Traffic to `external_addr:service_port` is forwarded to `node_port` on the same host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServicePortMapping {
    pub external_addr: Ipv4Addr,
    pub service_port: NonZeroU16,
    pub node_port: NonZeroU16,
}

// === impl LoadBalancerService ===

impl LoadBalancerService {
    /// Returns a rule mapping for each port that has a node port assigned.
    pub fn mappings(&self, external_addr: Ipv4Addr) -> impl Iterator<Item = ServicePortMapping> + '_ {
        self.ports
            .iter()
            .filter_map(move |port| port.mapping(external_addr))
    }

    /// Appends `addr` to the advertised addresses unless it is already present.
    ///
    /// Returns true if the addresses changed.
    pub fn advertise(&mut self, addr: Ipv4Addr) -> bool {
        let addr = addr.to_string();
        if self.ingress.contains(&addr) {
            return false;
        }
        self.ingress.push(addr);
        true
    }
}

impl fmt::Display for LoadBalancerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl ServicePort ===

impl ServicePort {
    pub fn new(port: u16, node_port: u16) -> Option<Self> {
        Some(Self {
            port: NonZeroU16::new(port)?,
            node_port: NonZeroU16::new(node_port),
        })
    }

    pub fn mapping(&self, external_addr: Ipv4Addr) -> Option<ServicePortMapping> {
        Some(ServicePortMapping {
            external_addr,
            service_port: self.port,
            node_port: self.node_port?,
        })
    }
}

// === impl ServicePortMapping ===

impl fmt::Display for ServicePortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> :{}",
            self.external_addr, self.service_port, self.node_port
        )
    }
}
