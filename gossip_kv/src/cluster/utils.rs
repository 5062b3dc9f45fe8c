use crate::core::{Address, KvError, Result};
use serde::{Deserialize, Serialize};

/// Configures a [`KvNode`](crate::KvNode). All durations are measured in rounds of the shared
/// logical clock. EVERY NODE IN THE CLUSTER MUST USE THE SAME VALUES.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
  /// The node every other node sends its join request to. The node at this address starts the
  /// cluster by itself.
  ///
  /// default: `1:0`
  pub bootstrap: Address,
  /// How long a peer may go without a heartbeat increase before it is suspected. Suspects stay
  /// in the membership table but are no longer gossiped.
  ///
  /// default: `5`
  pub t_fail: u64,
  /// How long a peer may go without a heartbeat increase before it is evicted.
  ///
  /// default: `20`
  pub t_remove: u64,
  /// The probability of sending a heartbeat to each known peer in a given round.
  ///
  /// default: `0.7`
  pub gossip_prob: f64,
  /// The number of ring nodes holding a copy of each key.
  ///
  /// default: `3`
  pub replication_factor: usize,
  /// The number of successful replica replies a client operation needs.
  ///
  /// default: `2`
  pub quorum: usize,
  /// How old a pending transaction may get before it fails.
  ///
  /// default: `4`
  pub trans_timeout: u64,
  /// The modulus of the consistent-hashing ring. Nodes and keys are hashed into `0..ring_size`.
  ///
  /// default: `512`
  pub ring_size: u64,
  /// Seeds each node's gossip randomness, mixed with the node's address. Entropy is used if unset.
  ///
  /// default: `None`
  pub seed: Option<u64>,
}
impl Default for ClusterConfig {
  #[inline]
  fn default() -> Self {
    ClusterConfig {
      bootstrap: Address::new(1, 0),
      t_fail: 5,
      t_remove: 20,
      gossip_prob: 0.7,
      replication_factor: 3,
      quorum: 2,
      trans_timeout: 4,
      ring_size: 512,
      seed: None,
    }
  }
}
impl ClusterConfig {
  pub fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.gossip_prob) {
      return Err(KvError::Config(format!(
        "gossip_prob {} is not a probability",
        self.gossip_prob
      )));
    }
    if self.t_fail >= self.t_remove {
      return Err(KvError::Config(format!(
        "t_fail ({}) must be less than t_remove ({})",
        self.t_fail, self.t_remove
      )));
    }
    if self.quorum == 0 || self.quorum > self.replication_factor {
      return Err(KvError::Config(format!(
        "quorum {} is impossible with replication factor {}",
        self.quorum, self.replication_factor
      )));
    }
    if self.ring_size == 0 {
      return Err(KvError::Config("ring_size must be positive".to_string()));
    }
    Ok(())
  }

  /// Negative replies after which a transaction can no longer reach quorum.
  pub fn quorum_failure(&self) -> usize {
    self.replication_factor - self.quorum + 1
  }
}

/// A change to a node's membership table.
#[derive(Clone, Copy, Serialize, Deserialize, Hash, PartialEq, Eq, Debug)]
pub enum ClusterEvent {
  Added(Address),
  Removed(Address),
}

/// What one node knows about the liveness of another.
///
/// `heartbeat` is only ever incremented by `member` itself. `timestamp` is local to the node
/// holding the entry: the time it last saw `heartbeat` increase. Timestamps received over the
/// wire are never trusted.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MembershipEntry {
  pub member: Address,
  pub heartbeat: u64,
  pub timestamp: u64,
}
impl MembershipEntry {
  pub fn new(member: Address, heartbeat: u64, timestamp: u64) -> MembershipEntry {
    MembershipEntry {
      member: member,
      heartbeat: heartbeat,
      timestamp: timestamp,
    }
  }

  pub fn age(&self, now: u64) -> u64 {
    now.saturating_sub(self.timestamp)
  }
}

#[test]
fn test_config_validation() {
  assert!(ClusterConfig::default().validate().is_ok());
  assert_eq!(ClusterConfig::default().quorum_failure(), 2);
  let mut cfg = ClusterConfig::default();
  cfg.gossip_prob = 1.5;
  assert!(cfg.validate().is_err());
  let mut cfg = ClusterConfig::default();
  cfg.t_remove = cfg.t_fail;
  assert!(cfg.validate().is_err());
  let mut cfg = ClusterConfig::default();
  cfg.quorum = 4;
  assert!(cfg.validate().is_err());
}
