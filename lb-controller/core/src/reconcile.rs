use crate::{
    metrics::{Operation, ReconcileMetrics},
    Error, FirewallBackend, LoadBalancerService,
};
use std::{net::Ipv4Addr, sync::Arc};
use tracing::{debug, error, info, instrument};

/// Records a service's advertised addresses upstream.
#[async_trait::async_trait]
pub trait PublishStatus: Send + Sync {
    async fn publish(&self, service: &LoadBalancerService) -> anyhow::Result<()>;
}

/// Installs and removes NAT rules for load balancer services.
///
/// Entry points are driven one event at a time. Per-port failures are logged and counted but do
/// not stop the remaining ports from being processed.
#[derive(Debug)]
pub struct Reconciler<S> {
    node_addr: Ipv4Addr,
    backend: Arc<dyn FirewallBackend>,
    status: S,
    metrics: ReconcileMetrics,
}

/// The number of ports processed by a single entry point call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub applied: usize,
    pub failed: usize,
}

// === impl Reconciler ===

impl<S: PublishStatus> Reconciler<S> {
    pub fn new(
        node_addr: Ipv4Addr,
        backend: Arc<dyn FirewallBackend>,
        status: S,
        metrics: ReconcileMetrics,
    ) -> Self {
        Self {
            node_addr,
            backend,
            status,
            metrics,
        }
    }

    pub fn node_addr(&self) -> Ipv4Addr {
        self.node_addr
    }

    /// Advertises the node address for the service and installs rules for each of its ports.
    ///
    /// If the status cannot be published, no rules are installed for this event.
    #[instrument(skip_all, fields(service = %service))]
    pub async fn on_eligible(&self, service: &LoadBalancerService) -> Reconciled {
        let mut service = service.clone();
        if service.advertise(self.node_addr) {
            debug!(addr = %self.node_addr, "Advertising node address");
        }

        let published = self.status.publish(&service).await;
        self.metrics.status_publication(published.is_ok());
        if let Err(error) = published.map_err(Error::StatusPublicationFailed) {
            error!(%error, "Skipping rule installation");
            return Reconciled::default();
        }

        let mut reconciled = Reconciled::default();
        for mapping in service.mappings(self.node_addr) {
            let res = self.backend.add_port(&mapping).await;
            self.metrics
                .rule_mutation(self.backend.name(), Operation::Add, res.is_ok());
            match res {
                Ok(()) => {
                    info!(%mapping, "Installed port rules");
                    reconciled.applied += 1;
                }
                Err(error) => {
                    error!(%mapping, %error, "Failed to install port rules");
                    reconciled.failed += 1;
                }
            }
        }
        reconciled
    }

    /// Reacts to a service update given its eligibility before the update.
    ///
    /// Nothing is done when eligibility is unchanged, even if the service's ports changed.
    pub async fn on_transition(
        &self,
        was_eligible: bool,
        service: &LoadBalancerService,
    ) -> Reconciled {
        match (was_eligible, service.eligible) {
            (false, true) => self.on_eligible(service).await,
            (true, false) => self.on_removed(service).await,
            _ => {
                debug!(%service, eligible = service.eligible, "Eligibility unchanged");
                Reconciled::default()
            }
        }
    }

    /// Removes the rules for each of the service's ports.
    ///
    /// Advertised addresses are left unchanged.
    #[instrument(skip_all, fields(service = %service))]
    pub async fn on_removed(&self, service: &LoadBalancerService) -> Reconciled {
        let mut reconciled = Reconciled::default();
        for mapping in service.mappings(self.node_addr) {
            let res = self.backend.remove_port(&mapping).await;
            self.metrics
                .rule_mutation(self.backend.name(), Operation::Remove, res.is_ok());
            match res {
                Ok(()) => {
                    info!(%mapping, "Removed port rules");
                    reconciled.applied += 1;
                }
                Err(error) => {
                    error!(%mapping, %error, "Failed to remove port rules");
                    reconciled.failed += 1;
                }
            }
        }
        reconciled
    }
}
