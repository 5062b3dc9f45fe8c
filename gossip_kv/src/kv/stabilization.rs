use crate::core::{
  send_msg, Address, LocalStore, Message, OpKind, ReplicaType, Transport, REPAIR_TRANS_ID,
};
use crate::kv::NodeRing;
use tracing::debug;

/// Pushes every record in `store` to its preference list on `ring`, this node included.
///
/// Everything is re-sent, not just what moved. The requests carry [`REPAIR_TRANS_ID`], so replicas
/// overwrite their copy without replying and no transaction is opened. Returns the number of
/// requests sent.
pub fn stabilize<S, T>(own: &Address, store: &S, ring: &NodeRing, net: &mut T) -> usize
where
  S: LocalStore + ?Sized,
  T: Transport + ?Sized,
{
  let mut sent = 0;
  let entries = store.entries();
  debug!(node = %own, keys = entries.len(), ring = ring.len(), "stabilizing");
  for (key, value) in entries {
    for (i, replica) in ring.find_replicas(&key).into_iter().enumerate() {
      let msg = Message::Request {
        trans_id: REPAIR_TRANS_ID,
        sender: *own,
        kind: OpKind::Create,
        key: key.clone(),
        value: Some(value.clone()),
        replica: ReplicaType::from_position(i),
      };
      send_msg(net, own, &replica.address, &msg);
      sent += 1;
    }
  }
  sent
}

#[cfg(test)]
use crate::core::HashTable;
#[cfg(test)]
use crate::test_commons::{addr, Outbox};

#[test]
fn test_stabilize_pushes_every_key() {
  let mut store = HashTable::new();
  store.create("k1", "v1");
  store.create("k2", "v2");
  store.create("k3", "v3");
  let ring = NodeRing::new(3, 512).build((2..=5).map(addr), addr(1));
  let mut net = Outbox::default();
  assert_eq!(stabilize(&addr(1), &store, &ring, &mut net), 9);

  for (key, value) in store.entries() {
    let expected = ring
      .find_replicas(&key)
      .iter()
      .map(|n| n.address)
      .collect::<Vec<_>>();
    let targets = net
      .0
      .iter()
      .filter_map(|(from, to, msg)| match msg {
        Message::Request { trans_id, kind, key: k, value: v, .. } if k == &key => {
          assert_eq!(*from, addr(1));
          assert_eq!(*trans_id, REPAIR_TRANS_ID);
          assert_eq!(*kind, OpKind::Create);
          assert_eq!(v.as_ref(), Some(&value));
          Some(*to)
        }
        _ => None,
      })
      .collect::<Vec<_>>();
    assert_eq!(targets, expected);
  }
}

#[test]
fn test_stabilize_on_small_ring_sends_nothing() {
  let mut store = HashTable::new();
  store.create("k1", "v1");
  let ring = NodeRing::new(3, 512).build(vec![addr(2)], addr(1));
  let mut net = Outbox::default();
  assert_eq!(stabilize(&addr(1), &store, &ring, &mut net), 0);
  assert!(net.0.is_empty());
}
