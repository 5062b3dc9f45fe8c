//! A key-value store replicated across a cluster whose membership is maintained by gossip.
//!
//! The crate is built in two layers. [`cluster`] keeps every node's view of who is alive, using
//! heartbeats spread by gossip. [`kv`] places each key on three nodes of a consistent hashing ring
//! built from that view, runs client operations to a quorum of two, and re-replicates data when
//! the ring changes near a node.
//!
//! Nothing here owns a thread or a socket. A [`KvNode`] advances one round at a time and is handed
//! its [`Transport`](core::Transport) and [`LogSink`](core::LogSink) on every call, so any number of
//! nodes can share a process. [`testkit::Simulation`] does exactly that over a lossy in-memory
//! network.

pub mod cluster;
pub mod core;
pub mod kv;
mod node;
pub mod testkit;

#[cfg(test)]
mod test_commons;

pub use node::KvNode;
