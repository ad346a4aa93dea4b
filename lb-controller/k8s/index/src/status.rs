use anyhow::{bail, Result};
use lb_controller_core::{LoadBalancerService, PublishStatus};
use lb_controller_k8s_api as k8s;
use std::net::IpAddr;
use tokio::time;
use tracing::debug;

const FIELD_MANAGER: &str = "lb-controller";

/// Writes advertised addresses to `status.loadBalancer.ingress`.
#[derive(Clone)]
pub struct ServiceStatusPublisher {
    client: k8s::Client,
    timeout: time::Duration,
}

impl ServiceStatusPublisher {
    pub fn new(client: k8s::Client, timeout: time::Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait::async_trait]
impl PublishStatus for ServiceStatusPublisher {
    async fn publish(&self, svc: &LoadBalancerService) -> Result<()> {
        let api = k8s::Api::<k8s::Service>::namespaced(self.client.clone(), &svc.namespace);
        let params = k8s::PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let patch = k8s::Patch::Merge(make_patch(svc));

        match time::timeout(self.timeout, api.patch_status(&svc.name, &params, &patch)).await {
            Ok(Ok(_)) => {
                debug!(service = %svc, ingress = ?svc.ingress, "Patched service status");
                Ok(())
            }
            Ok(Err(error)) => Err(error.into()),
            Err(_) => bail!("patching {svc} timed out after {:?}", self.timeout),
        }
    }
}

/// Builds a merge patch replacing the service's load balancer ingress list.
///
/// Addresses that parse as IPs are written as `ip`; anything else as `hostname`.
pub(crate) fn make_patch(svc: &LoadBalancerService) -> serde_json::Value {
    let ingress = svc
        .ingress
        .iter()
        .map(|addr| match addr.parse::<IpAddr>() {
            Ok(_) => serde_json::json!({ "ip": addr }),
            Err(_) => serde_json::json!({ "hostname": addr }),
        })
        .collect::<Vec<_>>();

    serde_json::json!({
        "status": {
            "loadBalancer": {
                "ingress": ingress,
            },
        },
    })
}
