use crate::{
    core::{
        exec::HostExec,
        probe::{self, SearchPath},
        Ipv4Net, ReconcileMetrics, Reconciler,
    },
    index::{Index, IndexMetrics, ServiceStatusPublisher},
    k8s::{self, watcher},
    node,
};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{net::Ipv4Addr, sync::Arc};
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "lb-controller",
    about = "A bare-metal load balancer controller for Kubernetes services"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "lb_controller=info,warn",
        env = "LB_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The address advertised for load balancer services.
    ///
    /// When unset, the first IPv4 address of `--node-interface` is used.
    #[clap(long, env = "LB_CONTROLLER_NODE_IP")]
    node_ip: Option<Ipv4Addr>,

    #[clap(long, default_value = "enp1s0", env = "LB_CONTROLLER_NODE_INTERFACE")]
    node_interface: String,

    /// Source network whose node-port traffic is masqueraded.
    #[clap(long, default_value = crate::core::DEFAULT_MASQUERADE_NETWORK)]
    masquerade_network: Ipv4Net,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            node_ip,
            node_interface,
            masquerade_network,
            patch_timeout_ms,
        } = self;

        let mut prom = <Registry>::default();
        let reconcile_metrics =
            ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));
        let index_metrics = IndexMetrics::register(prom.sub_registry_with_prefix("index"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let node_addr = node::resolve_addr(node_ip, &node_interface)?;

        // Locate the host firewall tool and create the NAT chains before any service is handled.
        let backend = probe::select_backend(
            &SearchPath::from_env(),
            Arc::new(HostExec::default()),
            masquerade_network,
        )?;
        backend.bootstrap().await?;
        info!(
            backend = backend.name(),
            path = %backend.path().display(),
            %node_addr,
            "Firewall initialized"
        );

        let status = ServiceStatusPublisher::new(
            runtime.client(),
            Duration::from_millis(patch_timeout_ms),
        );
        let reconciler = Reconciler::new(node_addr, backend, status, reconcile_metrics);
        let index = Index::new(reconciler, index_metrics);

        // Services are processed one event at a time until the runtime begins shutting down.
        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        let shutdown = runtime.shutdown_handle();
        tokio::spawn(
            async move {
                tokio::select! {
                    _ = index.run(services) => {}
                    release = shutdown.signaled() => {
                        info!("Stopping service watch");
                        drop(release);
                    }
                }
            }
            .instrument(info_span!("services")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
