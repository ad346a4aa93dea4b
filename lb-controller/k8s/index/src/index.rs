use crate::service_snapshot;
use futures::prelude::*;
use lb_controller_core::{LoadBalancerService, PublishStatus, Reconciler};
use lb_controller_k8s_api::{self as k8s, watcher, ResourceId};
use prometheus_client::{metrics::gauge::Gauge, registry::Registry};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Tracks the last observed state of every service and forwards changes to the reconciler.
///
/// Owned by a single task: each event is fully processed, including all of the firewall commands
/// it triggers, before the next event is read.
pub struct Index<S> {
    reconciler: Reconciler<S>,
    services: HashMap<ResourceId, LoadBalancerService>,

    /// Services seen since a relist began, or `None` when no relist is in progress.
    relisted: Option<HashSet<ResourceId>>,

    metrics: IndexMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    services: Gauge,
    eligible: Gauge,
}

// === impl Index ===

impl<S: PublishStatus> Index<S> {
    pub fn new(reconciler: Reconciler<S>, metrics: IndexMetrics) -> Self {
        Self {
            reconciler,
            services: HashMap::new(),
            relisted: None,
            metrics,
        }
    }

    /// Processes watch events until the stream ends.
    pub async fn run(mut self, events: impl Stream<Item = watcher::Event<k8s::Service>>) {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            self.process(event).await;
        }
        debug!("Service watch ended");
    }

    pub async fn process(&mut self, event: watcher::Event<k8s::Service>) {
        match event {
            watcher::Event::Apply(svc) => {
                self.apply(svc).await;
            }

            watcher::Event::Delete(svc) => self.delete(svc).await,

            watcher::Event::Init => {
                debug!("Relisting services");
                self.relisted = Some(HashSet::new());
            }

            watcher::Event::InitApply(svc) => {
                if let Some(id) = self.apply(svc).await {
                    self.relisted.get_or_insert_with(HashSet::new).insert(id);
                }
            }

            watcher::Event::InitDone => {
                let seen = self.relisted.take().unwrap_or_default();
                let stale = self
                    .services
                    .keys()
                    .filter(|id| !seen.contains(*id))
                    .cloned()
                    .collect::<Vec<_>>();
                for id in stale {
                    info!(service = %id, "Service removed during relist");
                    self.remove(&id).await;
                }
            }
        }

        self.metrics.update(&self.services);
    }

    pub fn services(&self) -> impl Iterator<Item = &LoadBalancerService> {
        self.services.values()
    }

    async fn apply(&mut self, svc: k8s::Service) -> Option<ResourceId> {
        let Some(mut service) = service_snapshot(&svc) else {
            warn!("Ignoring service without a namespace or name");
            return None;
        };
        let id = ResourceId::new(service.namespace.clone(), service.name.clone());

        match self.services.get(&id) {
            // Rules were installed for the tracked ports. The update may no longer carry node
            // ports, so those are the ones removed.
            Some(tracked) if tracked.eligible && !service.eligible => {
                self.reconciler.on_removed(tracked).await;
            }

            // Port changes are not reconciled while the service stays eligible, so keep
            // tracking the ports that rules exist for.
            Some(tracked) if tracked.eligible => {
                service.ports = tracked.ports.clone();
            }

            tracked => {
                let was_eligible = tracked.map(|svc| svc.eligible).unwrap_or(false);
                self.reconciler.on_transition(was_eligible, &service).await;
            }
        }

        self.services.insert(id.clone(), service);
        Some(id)
    }

    async fn delete(&mut self, svc: k8s::Service) {
        let Some(delivered) = service_snapshot(&svc) else {
            return;
        };
        let id = ResourceId::new(delivered.namespace.clone(), delivered.name.clone());
        let service = self.services.remove(&id).unwrap_or(delivered);

        if service.eligible {
            self.reconciler.on_removed(&service).await;
        }
    }

    async fn remove(&mut self, id: &ResourceId) {
        if let Some(service) = self.services.remove(id) {
            if service.eligible {
                self.reconciler.on_removed(&service).await;
            }
        }
    }
}

// === impl IndexMetrics ===

impl IndexMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "services",
            "The number of services in the index",
            metrics.services.clone(),
        );
        reg.register(
            "eligible_services",
            "The number of indexed services that request a load balancer",
            metrics.eligible.clone(),
        );
        metrics
    }

    fn update(&self, services: &HashMap<ResourceId, LoadBalancerService>) {
        let eligible = services.values().filter(|svc| svc.eligible).count();
        self.services.set(services.len() as i64);
        self.eligible.set(eligible as i64);
    }
}
