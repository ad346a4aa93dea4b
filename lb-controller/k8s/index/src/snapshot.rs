use lb_controller_core::{LoadBalancerService, ServicePort};
use lb_controller_k8s_api::{self as k8s, ResourceExt};
use tracing::{debug, warn};

/// Converts a `Service` into the snapshot the reconciler operates on.
///
/// Returns `None` if the service has no namespace or name. Only TCP ports are included.
pub fn service_snapshot(svc: &k8s::Service) -> Option<LoadBalancerService> {
    let namespace = svc.namespace()?;
    let name = svc.metadata.name.clone()?;
    let spec = svc.spec.as_ref();

    let eligible = spec.and_then(|spec| spec.type_.as_deref()) == Some(k8s::LOAD_BALANCER);

    let ports = spec
        .and_then(|spec| spec.ports.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|port| service_port(&namespace, &name, port))
        .collect();

    let ingress = svc
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|ingress| ingress.ip.clone().or_else(|| ingress.hostname.clone()))
        .collect();

    Some(LoadBalancerService {
        namespace,
        name,
        eligible,
        ports,
        ingress,
    })
}

fn service_port(ns: &str, name: &str, port: &k8s::ServicePort) -> Option<ServicePort> {
    if let Some(protocol) = port.protocol.as_deref() {
        if !protocol.eq_ignore_ascii_case("TCP") {
            debug!(%ns, %name, port = port.port, %protocol, "Skipping non-TCP port");
            return None;
        }
    }

    let number = u16::try_from(port.port).ok();
    let node_port = u16::try_from(port.node_port.unwrap_or(0)).ok();
    match number.zip(node_port) {
        Some((number, node_port)) => ServicePort::new(number, node_port),
        None => {
            warn!(%ns, %name, port = port.port, node_port = ?port.node_port, "Ignoring invalid port");
            None
        }
    }
}
