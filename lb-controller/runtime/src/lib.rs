#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use lb_controller_core as core;
pub use lb_controller_k8s_api as k8s;
pub use lb_controller_k8s_index as index;

mod args;
mod node;

pub use self::args::Args;
