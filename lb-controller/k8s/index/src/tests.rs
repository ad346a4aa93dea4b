use crate::{service_snapshot, status::make_patch, Index, IndexMetrics};
use lb_controller_core::{
    FirewallBackend, LoadBalancerService, PublishStatus, ReconcileMetrics, Reconciler,
    ServicePortMapping,
};
use lb_controller_k8s_api::{self as k8s, watcher};
use maplit::btreeset;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::{
    collections::BTreeSet,
    net::Ipv4Addr,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Records the mappings passed to each backend operation.
#[derive(Debug, Default)]
struct RecordingBackend {
    path: PathBuf,
    calls: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl FirewallBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn bootstrap(&self) -> lb_controller_core::Result<()> {
        Ok(())
    }

    async fn add_port(&self, mapping: &ServicePortMapping) -> lb_controller_core::Result<()> {
        self.calls.lock().push(format!("add {mapping}"));
        Ok(())
    }

    async fn remove_port(&self, mapping: &ServicePortMapping) -> lb_controller_core::Result<()> {
        self.calls.lock().push(format!("remove {mapping}"));
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
struct RecordingStatus {
    published: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl PublishStatus for RecordingStatus {
    async fn publish(&self, svc: &LoadBalancerService) -> anyhow::Result<()> {
        self.published.lock().push(svc.to_string());
        Ok(())
    }
}

struct Fixture {
    backend: Arc<RecordingBackend>,
    status: RecordingStatus,
    index: Index<RecordingStatus>,
}

impl Fixture {
    fn new() -> Self {
        let backend = Arc::new(RecordingBackend::default());
        let status = RecordingStatus::default();
        let reconciler = Reconciler::new(
            Ipv4Addr::new(203, 0, 113, 5),
            backend.clone(),
            status.clone(),
            ReconcileMetrics::default(),
        );
        let index = Index::new(reconciler, IndexMetrics::default());
        Self {
            backend,
            status,
            index,
        }
    }

    fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.backend.calls.lock())
    }

    fn names(&self) -> BTreeSet<String> {
        self.index.services().map(|svc| svc.name.clone()).collect()
    }
}

fn mk_svc(name: &str, type_: &str, ports: impl IntoIterator<Item = (i32, Option<i32>)>) -> k8s::Service {
    k8s::Service {
        metadata: k8s::ObjectMeta {
            namespace: Some("default".to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(k8s::ServiceSpec {
            type_: Some(type_.to_string()),
            ports: Some(
                ports
                    .into_iter()
                    .map(|(port, node_port)| k8s::ServicePort {
                        port,
                        node_port,
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

#[tokio::test]
async fn new_load_balancer_service_is_added_once() {
    let mut fx = Fixture::new();

    let svc = mk_svc("svc-a", "LoadBalancer", [(80, Some(31080))]);
    fx.index.process(watcher::Event::Apply(svc.clone())).await;
    assert_eq!(fx.take_calls(), vec!["add 203.0.113.5:80 -> :31080"]);
    assert_eq!(*fx.status.published.lock(), vec!["default/svc-a"]);

    // Re-applying an unchanged eligible service does nothing.
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert!(fx.take_calls().is_empty());
    assert_eq!(fx.status.published.lock().len(), 1);
}

#[tokio::test]
async fn non_load_balancer_service_is_indexed_but_not_programmed() {
    let mut fx = Fixture::new();

    let svc = mk_svc("svc-b", "ClusterIP", [(80, None)]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert!(fx.take_calls().is_empty());
    assert!(fx.status.published.lock().is_empty());
    assert_eq!(fx.names(), btreeset! {"svc-b".to_string()});
}

#[tokio::test]
async fn type_changes_add_and_remove_rules() {
    let mut fx = Fixture::new();

    let svc = mk_svc("svc-c", "NodePort", [(80, Some(31080))]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert!(fx.take_calls().is_empty());

    let svc = mk_svc("svc-c", "LoadBalancer", [(80, Some(31080))]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert_eq!(fx.take_calls(), vec!["add 203.0.113.5:80 -> :31080"]);

    let svc = mk_svc("svc-c", "ClusterIP", [(80, None)]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert_eq!(fx.take_calls(), vec!["remove 203.0.113.5:80 -> :31080"]);
}

#[tokio::test]
async fn becoming_ineligible_removes_previously_installed_ports() {
    let mut fx = Fixture::new();

    let svc = mk_svc("svc-c", "LoadBalancer", [(80, Some(31080)), (443, Some(31443))]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    fx.take_calls();

    // Node ports are released when the type changes away from `LoadBalancer`.
    let svc = mk_svc("svc-c", "ClusterIP", [(80, None), (443, None)]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert_eq!(
        fx.take_calls(),
        vec![
            "remove 203.0.113.5:80 -> :31080",
            "remove 203.0.113.5:443 -> :31443",
        ]
    );

    // Becoming eligible again installs the newly assigned ports.
    let svc = mk_svc("svc-c", "LoadBalancer", [(80, Some(32080))]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert_eq!(fx.take_calls(), vec!["add 203.0.113.5:80 -> :32080"]);
}

#[tokio::test]
async fn delete_removes_ports_that_were_installed() {
    let mut fx = Fixture::new();

    let svc = mk_svc("svc-g", "LoadBalancer", [(80, Some(31080))]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    fx.take_calls();

    let svc = mk_svc("svc-g", "LoadBalancer", [(80, Some(32080))]);
    fx.index.process(watcher::Event::Apply(svc.clone())).await;
    assert!(fx.take_calls().is_empty());

    fx.index.process(watcher::Event::Delete(svc)).await;
    assert_eq!(fx.take_calls(), vec!["remove 203.0.113.5:80 -> :31080"]);
}

#[tokio::test]
async fn port_changes_without_type_change_are_ignored() {
    let mut fx = Fixture::new();

    let svc = mk_svc("svc-d", "LoadBalancer", [(80, None)]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert!(fx.take_calls().is_empty());

    let svc = mk_svc("svc-d", "LoadBalancer", [(80, Some(31080))]);
    fx.index.process(watcher::Event::Apply(svc)).await;
    assert!(fx.take_calls().is_empty());
}

#[tokio::test]
async fn deleted_load_balancer_service_is_removed() {
    let mut fx = Fixture::new();

    let svc = mk_svc("svc-e", "LoadBalancer", [(80, Some(31080)), (443, Some(31443))]);
    fx.index.process(watcher::Event::Apply(svc.clone())).await;
    fx.take_calls();

    fx.index.process(watcher::Event::Delete(svc)).await;
    assert_eq!(
        fx.take_calls(),
        vec![
            "remove 203.0.113.5:80 -> :31080",
            "remove 203.0.113.5:443 -> :31443",
        ]
    );
    assert!(fx.names().is_empty());

    let svc = mk_svc("svc-f", "ClusterIP", [(80, None)]);
    fx.index.process(watcher::Event::Apply(svc.clone())).await;
    fx.index.process(watcher::Event::Delete(svc)).await;
    assert!(fx.take_calls().is_empty());
}

#[tokio::test]
async fn relist_removes_services_that_vanished() {
    let mut fx = Fixture::new();

    let kept = mk_svc("kept", "LoadBalancer", [(80, Some(31080))]);
    let gone = mk_svc("gone", "LoadBalancer", [(25, Some(31025))]);
    fx.index.process(watcher::Event::Apply(kept.clone())).await;
    fx.index.process(watcher::Event::Apply(gone)).await;
    fx.take_calls();

    fx.index.process(watcher::Event::Init).await;
    fx.index.process(watcher::Event::InitApply(kept)).await;
    fx.index.process(watcher::Event::InitDone).await;

    assert_eq!(fx.take_calls(), vec!["remove 203.0.113.5:25 -> :31025"]);
    assert_eq!(fx.names(), btreeset! {"kept".to_string()});
}

#[tokio::test]
async fn initial_list_adds_eligible_services() {
    let mut fx = Fixture::new();

    fx.index.process(watcher::Event::Init).await;
    fx.index
        .process(watcher::Event::InitApply(mk_svc(
            "svc-a",
            "LoadBalancer",
            [(80, Some(31080))],
        )))
        .await;
    fx.index
        .process(watcher::Event::InitApply(mk_svc(
            "svc-b",
            "ClusterIP",
            [(80, None)],
        )))
        .await;
    fx.index.process(watcher::Event::InitDone).await;

    assert_eq!(fx.take_calls(), vec!["add 203.0.113.5:80 -> :31080"]);
    assert_eq!(
        fx.names(),
        btreeset! {"svc-a".to_string(), "svc-b".to_string()}
    );
}

#[test]
fn snapshot_skips_non_tcp_and_invalid_ports() {
    let mut svc = mk_svc(
        "svc-a",
        "LoadBalancer",
        [(80, Some(31080)), (53, Some(31053)), (8080, None), (0, Some(31000))],
    );
    let ports = svc.spec.as_mut().unwrap().ports.as_mut().unwrap();
    ports[1].protocol = Some("UDP".to_string());

    let snapshot = service_snapshot(&svc).unwrap();
    assert!(snapshot.eligible);
    assert_eq!(
        snapshot
            .ports
            .iter()
            .map(|p| (p.port.get(), p.node_port.map(|np| np.get())))
            .collect::<Vec<_>>(),
        vec![(80, Some(31080)), (8080, None)]
    );
}

#[test]
fn snapshot_reads_ingress_ips_and_hostnames() {
    let mut svc = mk_svc("svc-a", "LoadBalancer", [(80, Some(31080))]);
    svc.status = Some(k8s::ServiceStatus {
        load_balancer: Some(k8s::LoadBalancerStatus {
            ingress: Some(vec![
                k8s::LoadBalancerIngress {
                    ip: Some("192.0.2.10".to_string()),
                    ..Default::default()
                },
                k8s::LoadBalancerIngress {
                    hostname: Some("lb.example.com".to_string()),
                    ..Default::default()
                },
            ]),
        }),
        ..Default::default()
    });

    let snapshot = service_snapshot(&svc).unwrap();
    assert_eq!(snapshot.ingress, vec!["192.0.2.10", "lb.example.com"]);
}

#[test]
fn snapshot_requires_a_name() {
    let mut svc = mk_svc("svc-a", "LoadBalancer", [(80, Some(31080))]);
    svc.metadata.name = None;
    assert_eq!(service_snapshot(&svc), None);
}

#[test]
fn status_patch_lists_ips_and_hostnames() {
    let svc = LoadBalancerService {
        namespace: "default".to_string(),
        name: "svc-a".to_string(),
        eligible: true,
        ports: vec![],
        ingress: vec!["lb.example.com".to_string(), "203.0.113.5".to_string()],
    };
    assert_eq!(
        make_patch(&svc),
        serde_json::json!({
            "status": {
                "loadBalancer": {
                    "ingress": [
                        { "hostname": "lb.example.com" },
                        { "ip": "203.0.113.5" },
                    ],
                },
            },
        })
    );
}
