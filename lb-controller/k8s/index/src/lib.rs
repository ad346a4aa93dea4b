//! Load balancer service index
//!
//! Consumes a watch on `Service` resources and drives the [`Reconciler`] one event at a time. The
//! index remembers the last snapshot of each service so that an update can be compared with the
//! service's prior eligibility, and so that services which vanish during a relist are cleaned up
//! like deleted ones.
//!
//! [`Reconciler`]: lb_controller_core::Reconciler

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod index;
mod snapshot;
mod status;

#[cfg(test)]
mod tests;

pub use self::{
    index::{Index, IndexMetrics},
    snapshot::service_snapshot,
    status::ServiceStatusPublisher,
};
