//! Tools for running whole clusters in one process: a lossy in-memory network, a recording event
//! log and a lockstep driver for many nodes.

mod emul_net;
mod failure_config;
mod logging;
mod simulation;

#[rustfmt::skip]
pub use {
  emul_net::EmulNet,
  emul_net::NetStats,
  failure_config::FailureConfig,
  failure_config::FailureConfigMap,
  logging::EventRecorder,
  simulation::Simulation,
};
