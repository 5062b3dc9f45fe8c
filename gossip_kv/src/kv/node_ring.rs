use crate::core::Address;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use wyhash::WyHash;

/// A node's position on the ring. Ordering is by hash code, then address.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Debug)]
pub struct RingNode {
  pub hash_code: u64,
  pub address: Address,
}
impl RingNode {
  pub fn new(address: Address, ring_size: u64) -> RingNode {
    RingNode {
      hash_code: hash_code(&address, ring_size),
      address: address,
    }
  }
}

/// A consistent hashing ring, rebuilt every round from the membership table.
///
/// Each key belongs to the first node at or after the key's hash (wrapping around to the lowest
/// node), and is copied to the `rep_factor - 1` nodes after that one. These nodes together are the
/// key's preference list.
#[derive(Clone, Debug)]
pub struct NodeRing {
  nodes: Vec<RingNode>,
  rep_factor: usize,
  ring_size: u64,
}
impl NodeRing {
  pub fn new(rep_factor: usize, ring_size: u64) -> NodeRing {
    NodeRing {
      nodes: Vec::new(),
      rep_factor: rep_factor,
      ring_size: ring_size,
    }
  }

  /// Builds a ring from `members` and the local node.
  pub fn build<I>(&self, members: I, own: Address) -> NodeRing
  where
    I: IntoIterator<Item = Address>,
  {
    let nodes = members
      .into_iter()
      .chain(std::iter::once(own))
      .unique()
      .map(|a| RingNode::new(a, self.ring_size))
      .sorted()
      .collect();
    NodeRing {
      nodes: nodes,
      rep_factor: self.rep_factor,
      ring_size: self.ring_size,
    }
  }

  pub fn nodes(&self) -> &[RingNode] {
    &self.nodes
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn position(&self, address: &Address) -> Option<usize> {
    self.nodes.iter().position(|n| &n.address == address)
  }

  /// The preference list for `key`, starting with its owner. Empty if the ring has fewer than
  /// `rep_factor` nodes.
  pub fn find_replicas(&self, key: &str) -> Vec<RingNode> {
    let n = self.nodes.len();
    if n < self.rep_factor || n == 0 {
      return Vec::new();
    }
    let pos = hash_code(key, self.ring_size);
    let owner = if pos <= self.nodes[0].hash_code || pos > self.nodes[n - 1].hash_code {
      0
    } else {
      self
        .nodes
        .iter()
        .position(|node| pos <= node.hash_code)
        .unwrap_or(0)
    };
    self
      .nodes
      .iter()
      .cycle()
      .skip(owner)
      .take(self.rep_factor)
      .copied()
      .collect()
  }

  /// Installs `new` in place of this ring. Returns whether a node within `rep_factor - 1` places
  /// of `own` on the old ring is gone from the new one.
  pub fn replace(&mut self, new: NodeRing, own: &Address) -> bool {
    let changed = match self.position(own) {
      Some(pos) => {
        neighborhood_changed(&self.nodes, &new.nodes, pos, self.rep_factor.saturating_sub(1))
      }
      None => false,
    };
    *self = new;
    changed
  }
}

/// Whether any node of `old` within `window` places (either direction, wrapping) of `self_pos`
/// is missing from `new`.
pub fn neighborhood_changed(
  old: &[RingNode],
  new: &[RingNode],
  self_pos: usize,
  window: usize,
) -> bool {
  let n = old.len();
  if self_pos >= n {
    return false;
  }
  old.iter().enumerate().any(|(i, node)| {
    let d = if i > self_pos { i - self_pos } else { self_pos - i };
    let d = std::cmp::min(d, n - d);
    d <= window && !new.iter().any(|x| x.address == node.address)
  })
}

pub fn hash_code<H: Hash + ?Sized>(item: &H, ring_size: u64) -> u64 {
  let mut hasher = WyHash::with_seed(0);
  item.hash(&mut hasher);
  hasher.finish() % ring_size
}

#[cfg(test)]
fn synthetic(hashes: &[u64]) -> Vec<RingNode> {
  hashes
    .iter()
    .enumerate()
    .map(|(i, h)| RingNode {
      hash_code: *h,
      address: Address::new(i as u32 + 1, 0),
    })
    .collect()
}

#[test]
fn test_find_replicas() {
  let members = (1u32..=6).map(|id| Address::new(id, 0)).collect::<Vec<_>>();
  let ring = NodeRing::new(3, 512).build(members[1..].iter().copied(), members[0]);
  assert_eq!(ring.len(), 6);
  assert!(ring.nodes().windows(2).all(|w| w[0] <= w[1]));
  for i in 0..200 {
    let key = format!("key{}", i);
    let pos = hash_code(key.as_str(), 512);
    let owner = ring
      .nodes()
      .iter()
      .position(|n| n.hash_code >= pos)
      .unwrap_or(0);
    let replicas = ring.find_replicas(&key);
    let expected = (0..3)
      .map(|j| ring.nodes()[(owner + j) % 6])
      .collect::<Vec<_>>();
    assert_eq!(replicas, expected, "{}", key);
    assert_eq!(replicas.iter().unique().count(), 3);
  }
}

#[test]
fn test_find_replicas_wraps() {
  let ring = NodeRing {
    nodes: synthetic(&[0, 100, 200, 300]),
    rep_factor: 3,
    ring_size: 512,
  };
  let ids = |key: &str| {
    ring
      .find_replicas(key)
      .iter()
      .map(|n| n.address.id)
      .collect::<Vec<_>>()
  };
  for i in 0..100 {
    let key = format!("k{}", i);
    let pos = hash_code(key.as_str(), 512);
    let expected = if pos == 0 || pos > 300 {
      vec![1, 2, 3]
    } else if pos <= 100 {
      vec![2, 3, 4]
    } else if pos <= 200 {
      vec![3, 4, 1]
    } else {
      vec![4, 1, 2]
    };
    assert_eq!(ids(&key), expected, "{} -> {}", key, pos);
  }
}

#[test]
fn test_small_ring_has_no_replicas() {
  let ring = NodeRing::new(3, 512).build(vec![Address::new(2, 0)], Address::new(1, 0));
  assert_eq!(ring.len(), 2);
  assert!(ring.find_replicas("k1").is_empty());
}

#[test]
fn test_neighborhood_changed() {
  let old = synthetic(&[10, 20, 30, 40, 50, 60]);
  let without = |gone: usize| {
    old
      .iter()
      .enumerate()
      .filter(|(i, _)| *i != gone)
      .map(|(_, n)| *n)
      .collect::<Vec<_>>()
  };
  assert!(neighborhood_changed(&old, &without(1), 0, 2));
  assert!(neighborhood_changed(&old, &without(2), 0, 2));
  assert!(neighborhood_changed(&old, &without(4), 0, 2));
  assert!(neighborhood_changed(&old, &without(5), 0, 2));
  assert!(!neighborhood_changed(&old, &without(3), 0, 2));
  assert!(!neighborhood_changed(&old, &old, 0, 2));

  let mut grown = old.clone();
  grown.push(RingNode { hash_code: 35, address: Address::new(99, 0) });
  grown.sort();
  assert!(!neighborhood_changed(&old, &grown, 0, 2));
  assert!(!neighborhood_changed(&[], &grown, 0, 2));
}

#[test]
fn test_replace() {
  let own = Address::new(1, 0);
  let others = (2u32..=6).map(|id| Address::new(id, 0)).collect::<Vec<_>>();
  let mut ring = NodeRing::new(3, 512);
  let full = ring.build(others.iter().copied(), own);
  assert!(!ring.replace(full.clone(), &own));
  assert!(!ring.replace(full.clone(), &own));
  let pos = ring.position(&own).unwrap();
  let neighbor = ring.nodes()[(pos + 1) % ring.len()].address;
  let shrunk = ring.build(others.iter().copied().filter(|a| *a != neighbor), own);
  assert!(ring.replace(shrunk, &own));
  assert_eq!(ring.len(), 5);
}
