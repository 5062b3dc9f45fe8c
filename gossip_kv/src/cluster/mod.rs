//! Cluster membership through gossip.
//!
//! Every node keeps a [`MembershipTable`]: for each peer it knows of, the highest heartbeat it has
//! seen from that peer and the local time it saw that heartbeat increase. Nodes join by sending a
//! join request to a well-known bootstrap node, which answers with its own view. From then on,
//! each round a member increments its own heartbeat and sends its view to a random subset of its
//! peers (each peer is picked independently with probability
//! [`gossip_prob`](ClusterConfig::gossip_prob)).
//!
//! ### Failure Detection
//! A peer whose heartbeat has not increased for [`t_fail`](ClusterConfig::t_fail) rounds is
//! suspected. Suspects are kept but no longer passed on, so news of a dead node stops spreading.
//! After [`t_remove`](ClusterConfig::t_remove) rounds the entry is evicted. Heartbeats only ever
//! move forward: receiving an old heartbeat does nothing, which keeps stale gossip from reviving
//! an evicted node.

mod gossip;
mod membership;
mod utils;

#[rustfmt::skip]
pub use {
  gossip::GossipEngine,
  gossip::MachineState,
  membership::merge_entry,
  membership::MembershipTable,
  utils::ClusterConfig,
  utils::ClusterEvent,
  utils::MembershipEntry,
};
