use crate::cluster::{ClusterConfig, GossipEngine, MachineState};
use crate::core::{
  Address, HashTable, KvError, LocalStore, LogSink, Message, OpKind, Result, Transport,
};
use crate::kv::{Coordinator, NodeRing, Transactions};
use std::collections::VecDeque;
use tracing::{info, warn};

/// One process of the cluster.
///
/// A node does nothing on its own. Whoever drives it calls [`recv_loop`](KvNode::recv_loop) and
/// [`node_loop`](KvNode::node_loop) once per round, passing the current round and the
/// collaborators to use. Within [`node_loop`](KvNode::node_loop) the node:
///
/// 1. handles queued membership messages,
/// 2. runs its gossip duties if it is a member,
/// 3. rebuilds the ring, and re-replicates its records if a ring neighbor vanished,
/// 4. handles queued data messages,
/// 5. closes the transactions that have reached quorum, lost it, or timed out.
pub struct KvNode<S = HashTable> {
  address: Address,
  gossip: GossipEngine,
  ring: NodeRing,
  coordinator: Coordinator<S>,
  membership_queue: VecDeque<Message>,
  data_queue: VecDeque<Message>,
}
impl<S: LocalStore> KvNode<S> {
  pub fn new(address: Address, config: ClusterConfig, store: S) -> Result<KvNode<S>> {
    config.validate()?;
    Ok(KvNode {
      address: address,
      gossip: GossipEngine::new(address, config.clone()),
      ring: NodeRing::new(config.replication_factor, config.ring_size),
      coordinator: Coordinator::new(address, config, store),
      membership_queue: VecDeque::new(),
      data_queue: VecDeque::new(),
    })
  }

  pub fn address(&self) -> &Address {
    &self.address
  }

  pub fn state(&self) -> MachineState {
    self.gossip.state()
  }

  pub fn is_failed(&self) -> bool {
    self.state() == MachineState::Failed
  }

  pub fn gossip(&self) -> &GossipEngine {
    &self.gossip
  }

  /// Peers in the membership table, not including this node.
  pub fn members(&self) -> im::OrdSet<Address> {
    self.gossip.members()
  }

  pub fn ring(&self) -> &NodeRing {
    &self.ring
  }

  pub fn store(&self) -> &S {
    self.coordinator.store()
  }

  pub fn pending(&self) -> &Transactions {
    self.coordinator.transactions()
  }

  pub fn start<T: Transport + ?Sized>(&mut self, now: u64, net: &mut T) {
    self.gossip.start(now, net);
  }

  /// Stops the node for good. Every later call is a no-op.
  pub fn fail(&mut self) {
    info!(node = %self.address, "failed");
    self.gossip.fail();
  }

  /// Takes every deliverable payload off the transport and queues it for
  /// [`node_loop`](KvNode::node_loop). Returns the number of payloads queued.
  pub fn recv_loop<T: Transport + ?Sized>(&mut self, net: &mut T) -> usize {
    if self.is_failed() {
      return 0;
    }
    let own = self.address;
    let membership = &mut self.membership_queue;
    let data = &mut self.data_queue;
    let mut received = 0;
    net.receive(&own, &mut |bytes: Vec<u8>| match Message::decode(&bytes) {
      Ok(msg) if msg.is_membership() => {
        membership.push_back(msg);
        received += 1;
      }
      Ok(msg) => {
        data.push_back(msg);
        received += 1;
      }
      Err(e) => warn!(node = %own, error = %e, "dropping undecodable payload"),
    });
    received
  }

  pub fn node_loop<T, L>(&mut self, now: u64, net: &mut T, log: &mut L)
  where
    T: Transport + ?Sized,
    L: LogSink + ?Sized,
  {
    if self.is_failed() {
      return;
    }
    while let Some(msg) = self.membership_queue.pop_front() {
      self.gossip.handle(msg, now, net, log);
    }
    self.gossip.tick(now, net, log);

    let ring = self.ring.build(self.gossip.members(), self.address);
    if self.ring.replace(ring, &self.address) {
      info!(node = %self.address, ring = self.ring.len(), "ring neighborhood changed");
      self.coordinator.stabilize(&self.ring, net);
    }

    while let Some(msg) = self.data_queue.pop_front() {
      self.coordinator.handle(msg, net, log);
    }
    self.coordinator.sweep(now, log);
  }

  /// [`recv_loop`](KvNode::recv_loop) followed by [`node_loop`](KvNode::node_loop).
  pub fn round<T, L>(&mut self, now: u64, net: &mut T, log: &mut L)
  where
    T: Transport + ?Sized,
    L: LogSink + ?Sized,
  {
    self.recv_loop(net);
    self.node_loop(now, net, log);
  }

  pub fn client_create<T: Transport + ?Sized>(
    &mut self,
    key: &str,
    value: &str,
    now: u64,
    net: &mut T,
  ) -> Result<u64> {
    self.client_op(OpKind::Create, key, Some(value), now, net)
  }

  pub fn client_read<T: Transport + ?Sized>(
    &mut self,
    key: &str,
    now: u64,
    net: &mut T,
  ) -> Result<u64> {
    self.client_op(OpKind::Read, key, None, now, net)
  }

  pub fn client_update<T: Transport + ?Sized>(
    &mut self,
    key: &str,
    value: &str,
    now: u64,
    net: &mut T,
  ) -> Result<u64> {
    self.client_op(OpKind::Update, key, Some(value), now, net)
  }

  pub fn client_delete<T: Transport + ?Sized>(
    &mut self,
    key: &str,
    now: u64,
    net: &mut T,
  ) -> Result<u64> {
    self.client_op(OpKind::Delete, key, None, now, net)
  }

  fn client_op<T: Transport + ?Sized>(
    &mut self,
    kind: OpKind,
    key: &str,
    value: Option<&str>,
    now: u64,
    net: &mut T,
  ) -> Result<u64> {
    if self.is_failed() {
      return Err(KvError::NodeFailed(self.address));
    }
    self.coordinator.client_op(kind, key, value, &self.ring, now, net)
  }
}

#[cfg(test)]
use crate::core::LogEvent;
#[cfg(test)]
use crate::test_commons::{addr, seeded, Outbox};

#[test]
fn test_failed_node_is_inert() {
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let mut node = KvNode::new(addr(1), seeded(), HashTable::new()).unwrap();
  node.start(0, &mut net);
  assert_eq!(node.state(), MachineState::Member);
  node.fail();
  node.round(1, &mut net, &mut log);
  assert_eq!(node.gossip().heartbeat(), 0);
  assert!(matches!(
    node.client_create("k1", "v1", 1, &mut net),
    Err(KvError::NodeFailed(_))
  ));
  assert!(net.0.is_empty());
  assert!(log.is_empty());
}

#[test]
fn test_lonely_node_is_unavailable() {
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let mut node = KvNode::new(addr(1), seeded(), HashTable::new()).unwrap();
  node.start(0, &mut net);
  node.round(1, &mut net, &mut log);
  assert_eq!(node.ring().len(), 1);
  assert!(matches!(
    node.client_read("k1", 1, &mut net),
    Err(KvError::Unavailable { members: 1, .. })
  ));
  assert!(node.pending().is_empty());
}

#[test]
fn test_rejects_bad_config() {
  let mut cfg = seeded();
  cfg.quorum = 0;
  assert!(matches!(
    KvNode::new(addr(1), cfg, HashTable::new()),
    Err(KvError::Config(_))
  ));
}
