use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    rule_mutations: Family<RuleLabels, Counter>,
    status_publications: Family<StatusLabels, Counter>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum Operation {
    Add,
    Remove,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, EncodeLabelSet)]
struct RuleLabels {
    backend: &'static str,
    operation: Operation,
    outcome: Outcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, EncodeLabelSet)]
struct StatusLabels {
    outcome: Outcome,
}

impl ReconcileMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        reg.register(
            "rule_mutations",
            "Count of port rule pairs added or removed, by backend and outcome",
            metrics.rule_mutations.clone(),
        );
        reg.register(
            "status_publications",
            "Count of service status updates, by outcome",
            metrics.status_publications.clone(),
        );
        metrics
    }

    pub(crate) fn rule_mutation(&self, backend: &'static str, operation: Operation, ok: bool) {
        self.rule_mutations
            .get_or_create(&RuleLabels {
                backend,
                operation,
                outcome: ok.into(),
            })
            .inc();
    }

    pub(crate) fn status_publication(&self, ok: bool) {
        self.status_publications
            .get_or_create(&StatusLabels { outcome: ok.into() })
            .inc();
    }
}

impl From<bool> for Outcome {
    fn from(ok: bool) -> Self {
        if ok {
            Self::Success
        } else {
            Self::Failure
        }
    }
}
