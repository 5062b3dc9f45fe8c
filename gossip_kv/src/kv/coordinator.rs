use crate::cluster::ClusterConfig;
use crate::core::{
  send_msg, Address, FailReason, KvError, LocalStore, LogEvent, LogSink, Message, OpKind, Outcome,
  ReplicaType, Result, Role, Transport, REPAIR_TRANS_ID,
};
use crate::kv::{stabilize, NodeRing, Transaction, Transactions};
use tracing::{debug, trace};

/// The replicated store as seen from one node. It serves requests as a replica and drives client
/// operations to quorum as a coordinator.
pub struct Coordinator<S> {
  address: Address,
  config: ClusterConfig,
  store: S,
  transactions: Transactions,
}
impl<S: LocalStore> Coordinator<S> {
  pub fn new(address: Address, config: ClusterConfig, store: S) -> Coordinator<S> {
    Coordinator {
      address: address,
      config: config,
      store: store,
      transactions: Transactions::new(),
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn transactions(&self) -> &Transactions {
    &self.transactions
  }

  /// Opens a transaction for `kind` on `key` and sends a request to each replica. Fails without
  /// opening anything if the ring is too small to place `key`.
  pub fn client_op<T: Transport + ?Sized>(
    &mut self,
    kind: OpKind,
    key: &str,
    value: Option<&str>,
    ring: &NodeRing,
    now: u64,
    net: &mut T,
  ) -> Result<u64> {
    let replicas = ring.find_replicas(key);
    if replicas.is_empty() {
      return Err(KvError::Unavailable {
        key: key.to_string(),
        members: ring.len(),
      });
    }
    let value = value.map(str::to_string);
    let id = self.transactions.open(now, kind, key.to_string(), value.clone());
    debug!(node = %self.address, trans_id = id, %kind, key, "client request");
    for (i, replica) in replicas.iter().enumerate() {
      let msg = Message::Request {
        trans_id: id,
        sender: self.address,
        kind: kind,
        key: key.to_string(),
        value: value.clone(),
        replica: ReplicaType::from_position(i),
      };
      send_msg(net, &self.address, &replica.address, &msg);
    }
    Ok(id)
  }

  /// Handles one data message: a request to serve, or a reply to a pending transaction.
  pub fn handle<T, L>(&mut self, msg: Message, net: &mut T, log: &mut L)
  where
    T: Transport + ?Sized,
    L: LogSink + ?Sized,
  {
    match msg {
      Message::Request { trans_id, sender, kind, key, value, replica } => {
        self.serve(trans_id, sender, kind, key, value, replica, net, log)
      }
      Message::Reply { trans_id, success, .. } => {
        if let Some(t) = self.transactions.get_mut(trans_id) {
          t.record_reply(success);
        }
      }
      Message::ReadReply { trans_id, value, .. } => {
        if let Some(t) = self.transactions.get_mut(trans_id) {
          t.record_read(value);
        }
      }
      _ => {}
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn serve<T, L>(
    &mut self,
    trans_id: u64,
    sender: Address,
    kind: OpKind,
    key: String,
    value: Option<String>,
    replica: ReplicaType,
    net: &mut T,
    log: &mut L,
  ) where
    T: Transport + ?Sized,
    L: LogSink + ?Sized,
  {
    let value = value.unwrap_or_default();
    let (success, detail) = match kind {
      OpKind::Create => (self.store.create(&key, &value), Some(value)),
      OpKind::Update => (self.store.update(&key, &value), Some(value)),
      OpKind::Delete => (self.store.delete(&key), None),
      OpKind::Read => {
        let content = self.store.read(&key).unwrap_or_default();
        (!content.is_empty(), Some(content))
      }
    };
    if trans_id == REPAIR_TRANS_ID {
      trace!(node = %self.address, from = %sender, key = key.as_str(), "repair write");
      return;
    }
    debug!(node = %self.address, trans_id, %kind, ?replica, success, "served");
    let reply = match kind {
      OpKind::Read => Message::ReadReply {
        trans_id: trans_id,
        sender: self.address,
        value: detail.clone().unwrap_or_default(),
      },
      _ => Message::Reply {
        trans_id: trans_id,
        sender: self.address,
        success: success,
      },
    };
    send_msg(net, &self.address, &sender, &reply);
    let outcome = if success {
      Outcome::Success
    } else {
      Outcome::Failure(FailReason::Replica)
    };
    log.log(LogEvent::Operation {
      node: self.address,
      role: Role::Replica,
      trans_id: trans_id,
      kind: kind,
      key: key,
      value: detail.filter(|v| !v.is_empty()),
      outcome: outcome,
    });
  }

  /// Decides every pending transaction that can be decided at `now` and logs the outcome.
  pub fn sweep<L: LogSink + ?Sized>(
    &mut self,
    now: u64,
    log: &mut L,
  ) -> Vec<(Transaction, Outcome)> {
    let decided = self.transactions.sweep(now, &self.config);
    for (t, outcome) in decided.iter() {
      debug!(node = %self.address, trans_id = t.id, ?outcome, "transaction closed");
      log.log(LogEvent::Operation {
        node: self.address,
        role: Role::Coordinator,
        trans_id: t.id,
        kind: t.kind,
        key: t.key.clone(),
        value: t.value.clone(),
        outcome: *outcome,
      });
    }
    decided
  }

  pub fn stabilize<T: Transport + ?Sized>(&self, ring: &NodeRing, net: &mut T) -> usize {
    stabilize(&self.address, &self.store, ring, net)
  }
}

#[cfg(test)]
use crate::core::HashTable;
#[cfg(test)]
use crate::test_commons::{addr, Outbox};

#[cfg(test)]
fn three_nodes() -> (NodeRing, Vec<Coordinator<HashTable>>) {
  let cfg = ClusterConfig::default();
  let ring = NodeRing::new(3, cfg.ring_size).build(vec![addr(2), addr(3)], addr(1));
  let nodes = (1..=3)
    .map(|id| Coordinator::new(addr(id), cfg.clone(), HashTable::new()))
    .collect();
  (ring, nodes)
}

/// Delivers everything in `net` to the coordinators it is addressed to.
#[cfg(test)]
fn deliver(net: &mut Outbox, nodes: &mut [Coordinator<HashTable>], log: &mut Vec<LogEvent>) {
  let msgs = std::mem::take(&mut net.0);
  for (_, to, msg) in msgs {
    let node = nodes.iter_mut().find(|n| n.address == to).unwrap();
    node.handle(msg, net, log);
  }
}

#[cfg(test)]
fn coordinator_outcomes(log: &[LogEvent]) -> Vec<(u64, OpKind, Outcome)> {
  log
    .iter()
    .filter_map(|e| match e {
      LogEvent::Operation { role: Role::Coordinator, trans_id, kind, outcome, .. } => {
        Some((*trans_id, *kind, *outcome))
      }
      _ => None,
    })
    .collect()
}

#[test]
fn test_create_then_read_reach_quorum() {
  let (ring, mut nodes) = three_nodes();
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();

  let id = nodes[0]
    .client_op(OpKind::Create, "k1", Some("v1"), &ring, 0, &mut net)
    .unwrap();
  assert_eq!(net.0.len(), 3);
  deliver(&mut net, &mut nodes, &mut log);
  for n in nodes.iter() {
    assert_eq!(n.store().read("k1"), Some("v1".to_string()));
  }
  assert_eq!(net.0.len(), 3);
  deliver(&mut net, &mut nodes, &mut log);
  assert_eq!(nodes[0].transactions().get(id).unwrap().successes, 3);
  nodes[0].sweep(1, &mut log);
  assert_eq!(coordinator_outcomes(&log), vec![(id, OpKind::Create, Outcome::Success)]);
  assert!(nodes[0].transactions().is_empty());

  log.clear();
  let id = nodes[1].client_op(OpKind::Read, "k1", None, &ring, 2, &mut net).unwrap();
  deliver(&mut net, &mut nodes, &mut log);
  deliver(&mut net, &mut nodes, &mut log);
  let decided = nodes[1].sweep(3, &mut log);
  assert_eq!(decided.len(), 1);
  assert_eq!(decided[0].0.value, Some("v1".to_string()));
  assert_eq!(coordinator_outcomes(&log), vec![(id, OpKind::Read, Outcome::Success)]);
  let replica_reads = log
    .iter()
    .filter(|e| matches!(e, LogEvent::Operation { role: Role::Replica, .. }))
    .count();
  assert_eq!(replica_reads, 3);
}

#[test]
fn test_read_of_missing_key_fails_on_quorum() {
  let (ring, mut nodes) = three_nodes();
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let id = nodes[2].client_op(OpKind::Read, "nope", None, &ring, 0, &mut net).unwrap();
  deliver(&mut net, &mut nodes, &mut log);
  deliver(&mut net, &mut nodes, &mut log);
  nodes[2].sweep(1, &mut log);
  assert_eq!(
    coordinator_outcomes(&log),
    vec![(id, OpKind::Read, Outcome::Failure(FailReason::Quorum))]
  );
  nodes[2].sweep(2, &mut log);
  assert_eq!(coordinator_outcomes(&log).len(), 1);
}

#[test]
fn test_repair_requests_are_not_answered() {
  let (_, mut nodes) = three_nodes();
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let msg = Message::Request {
    trans_id: REPAIR_TRANS_ID,
    sender: addr(1),
    kind: OpKind::Create,
    key: "k1".to_string(),
    value: Some("v1".to_string()),
    replica: ReplicaType::Secondary,
  };
  nodes[1].handle(msg, &mut net, &mut log);
  assert_eq!(nodes[1].store().read("k1"), Some("v1".to_string()));
  assert!(net.0.is_empty());
  assert!(log.is_empty());
}

#[test]
fn test_unavailable_opens_nothing() {
  let mut coordinator = Coordinator::new(addr(1), ClusterConfig::default(), HashTable::new());
  let ring = NodeRing::new(3, 512).build(vec![addr(2)], addr(1));
  let mut net = Outbox::default();
  let res = coordinator.client_op(OpKind::Create, "k1", Some("v1"), &ring, 0, &mut net);
  assert!(matches!(res, Err(KvError::Unavailable { members: 2, .. })));
  assert!(coordinator.transactions().is_empty());
  assert!(net.0.is_empty());
}

#[test]
fn test_lost_replies_time_out() {
  let (ring, mut nodes) = three_nodes();
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let id = nodes[0]
    .client_op(OpKind::Update, "k1", Some("v2"), &ring, 10, &mut net)
    .unwrap();
  net.0.clear();
  assert!(nodes[0].sweep(14, &mut log).is_empty());
  nodes[0].sweep(15, &mut log);
  assert_eq!(
    coordinator_outcomes(&log),
    vec![(id, OpKind::Update, Outcome::Failure(FailReason::Timeout))]
  );
}
