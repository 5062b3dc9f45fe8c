use crate::cluster::ClusterConfig;
use crate::core::{FailReason, OpKind, Outcome, REPAIR_TRANS_ID};
use std::collections::BTreeMap;

/// A client operation waiting on its replicas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
  pub id: u64,
  /// Round the transaction was issued in.
  pub timestamp: u64,
  pub kind: OpKind,
  pub key: String,
  /// The value written, or for reads, the last value a replica returned.
  pub value: Option<String>,
  pub replies: usize,
  pub successes: usize,
}
impl Transaction {
  pub fn record_reply(&mut self, success: bool) {
    self.replies += 1;
    if success {
      self.successes += 1;
    }
  }

  /// An empty value is a miss.
  pub fn record_read(&mut self, value: String) {
    let hit = !value.is_empty();
    if hit {
      self.value = Some(value);
    }
    self.record_reply(hit);
  }

  /// Decides the transaction, if it can be decided at `now`. Failure is checked first.
  pub fn verdict(&self, now: u64, config: &ClusterConfig) -> Option<Outcome> {
    if self.replies - self.successes >= config.quorum_failure() {
      Some(Outcome::Failure(FailReason::Quorum))
    } else if now.saturating_sub(self.timestamp) > config.trans_timeout {
      Some(Outcome::Failure(FailReason::Timeout))
    } else if self.successes >= config.quorum {
      Some(Outcome::Success)
    } else {
      None
    }
  }
}

/// The transactions a coordinator has issued and not yet decided, by id.
#[derive(Default, Debug)]
pub struct Transactions {
  pending: BTreeMap<u64, Transaction>,
  next_id: u64,
}
impl Transactions {
  pub fn new() -> Transactions {
    Transactions::default()
  }

  pub fn open(&mut self, now: u64, kind: OpKind, key: String, value: Option<String>) -> u64 {
    let id = self.next_id;
    self.next_id += 1;
    // Never hand out the repair sentinel.
    if self.next_id == REPAIR_TRANS_ID {
      self.next_id = 0;
    }
    let t = Transaction {
      id: id,
      timestamp: now,
      kind: kind,
      key: key,
      value: value,
      replies: 0,
      successes: 0,
    };
    self.pending.insert(id, t);
    id
  }

  pub fn get(&self, id: u64) -> Option<&Transaction> {
    self.pending.get(&id)
  }

  pub fn get_mut(&mut self, id: u64) -> Option<&mut Transaction> {
    self.pending.get_mut(&id)
  }

  /// Removes and returns every transaction that can be decided at `now`, in id order.
  pub fn sweep(&mut self, now: u64, config: &ClusterConfig) -> Vec<(Transaction, Outcome)> {
    let decided = self
      .pending
      .values()
      .filter_map(|t| t.verdict(now, config).map(|o| (t.id, o)))
      .collect::<Vec<_>>();
    decided
      .into_iter()
      .filter_map(|(id, o)| self.pending.remove(&id).map(|t| (t, o)))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.pending.len()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }
}

#[test]
fn test_quorum_success_once() {
  let cfg = ClusterConfig::default();
  let mut txs = Transactions::new();
  let id = txs.open(10, OpKind::Create, "k".to_string(), Some("v".to_string()));
  txs.get_mut(id).unwrap().record_reply(true);
  assert!(txs.sweep(11, &cfg).is_empty());
  txs.get_mut(id).unwrap().record_reply(true);
  let decided = txs.sweep(11, &cfg);
  assert_eq!(decided.len(), 1);
  assert_eq!(decided[0].1, Outcome::Success);
  assert!(txs.is_empty());
  assert!(txs.sweep(12, &cfg).is_empty());
}

#[test]
fn test_quorum_failure() {
  let cfg = ClusterConfig::default();
  let mut txs = Transactions::new();
  let id = txs.open(0, OpKind::Delete, "k".to_string(), None);
  let t = txs.get_mut(id).unwrap();
  t.record_reply(true);
  t.record_reply(false);
  assert_eq!(t.verdict(0, &cfg), None);
  t.record_reply(false);
  assert_eq!(t.verdict(0, &cfg), Some(Outcome::Failure(FailReason::Quorum)));
  assert_eq!(txs.sweep(0, &cfg).len(), 1);
  assert!(txs.sweep(0, &cfg).is_empty());
}

#[test]
fn test_timeout_without_replies() {
  let cfg = ClusterConfig::default();
  let mut txs = Transactions::new();
  txs.open(3, OpKind::Update, "k".to_string(), Some("v".to_string()));
  assert!(txs.sweep(7, &cfg).is_empty());
  let decided = txs.sweep(8, &cfg);
  assert_eq!(decided.len(), 1);
  assert_eq!(decided[0].1, Outcome::Failure(FailReason::Timeout));
  assert_eq!(decided[0].0.replies, 0);
}

#[test]
fn test_read_caches_hit() {
  let cfg = ClusterConfig::default();
  let mut txs = Transactions::new();
  let first = txs.open(0, OpKind::Read, "k".to_string(), None);
  let id = txs.open(0, OpKind::Read, "k".to_string(), None);
  assert_eq!(id, first + 1);
  let t = txs.get_mut(id).unwrap();
  t.record_read("v1".to_string());
  t.record_read(String::new());
  assert_eq!(t.value, Some("v1".to_string()));
  assert_eq!((t.replies, t.successes), (2, 1));
  t.record_read("v1".to_string());
  assert_eq!(t.verdict(0, &cfg), Some(Outcome::Success));
}
