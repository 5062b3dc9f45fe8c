use crate::core::{Address, Transport};
use crate::testkit::FailureConfigMap;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::trace;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct NetStats {
  pub sent: u64,
  pub dropped: u64,
  pub delivered: u64,
  pub bytes_sent: u64,
  pub bytes_delivered: u64,
}

struct Packet {
  from: Address,
  deliver_at: u64,
  bytes: Vec<u8>,
}

/// An in-process [`Transport`] shared by every node of a simulation.
///
/// A payload sent during round `r` can be received from round `r + 1` on, later if the
/// [`FailureConfig`](crate::testkit::FailureConfig) for its destination adds a delay. Payloads
/// may also be dropped outright. Payloads to a node that has been [shut down](EmulNet::shut_down)
/// are always dropped.
pub struct EmulNet {
  round: u64,
  in_flight: BTreeMap<Address, VecDeque<Packet>>,
  down: BTreeSet<Address>,
  fail_map: FailureConfigMap,
  rng: SmallRng,
  stats: NetStats,
}
impl EmulNet {
  pub fn new(fail_map: FailureConfigMap, seed: Option<u64>) -> EmulNet {
    EmulNet {
      round: 0,
      in_flight: BTreeMap::new(),
      down: BTreeSet::new(),
      fail_map: fail_map,
      rng: seed.map_or_else(SmallRng::from_entropy, SmallRng::seed_from_u64),
      stats: NetStats::default(),
    }
  }

  pub fn set_round(&mut self, round: u64) {
    self.round = round;
  }

  pub fn stats(&self) -> &NetStats {
    &self.stats
  }

  pub fn fail_map_mut(&mut self) -> &mut FailureConfigMap {
    &mut self.fail_map
  }

  /// Payloads sent but not yet received.
  pub fn in_flight(&self) -> usize {
    self.in_flight.values().map(VecDeque::len).sum()
  }

  pub fn queued_for(&self, dest: &Address) -> usize {
    self.in_flight.get(dest).map_or(0, VecDeque::len)
  }

  /// Discards everything queued for `address` and drops whatever is sent to it from now on.
  /// Returns the number of payloads discarded.
  pub fn shut_down(&mut self, address: &Address) -> usize {
    self.down.insert(*address);
    let discarded = self.in_flight.remove(address).map_or(0, |q| q.len());
    self.stats.dropped += discarded as u64;
    discarded
  }
}
impl Transport for EmulNet {
  fn send(&mut self, from: &Address, to: &Address, bytes: Vec<u8>) {
    let cfg = *self.fail_map.get(to);
    self.stats.sent += 1;
    self.stats.bytes_sent += bytes.len() as u64;
    if self.down.contains(to) || self.rng.gen::<f64>() < cfg.drop_prob {
      trace!(%from, %to, "dropped");
      self.stats.dropped += 1;
      return;
    }
    let delay = match cfg.delay {
      Some((min, max)) => self.rng.gen_range(min..=max),
      None => 0,
    };
    self.in_flight.entry(*to).or_default().push_back(Packet {
      from: *from,
      deliver_at: self.round + 1 + delay,
      bytes: bytes,
    });
  }

  fn receive(&mut self, own: &Address, on_message: &mut dyn FnMut(Vec<u8>)) {
    let queue = match self.in_flight.get_mut(own) {
      Some(q) => q,
      None => return,
    };
    let round = self.round;
    let (ready, waiting): (VecDeque<_>, VecDeque<_>) =
      queue.drain(..).partition(|p| p.deliver_at <= round);
    *queue = waiting;
    for packet in ready {
      trace!(from = %packet.from, to = %own, "delivered");
      self.stats.delivered += 1;
      self.stats.bytes_delivered += packet.bytes.len() as u64;
      on_message(packet.bytes);
    }
  }
}

#[cfg(test)]
use crate::testkit::FailureConfig;

#[cfg(test)]
fn drain(net: &mut EmulNet, own: &Address) -> Vec<Vec<u8>> {
  let mut got = Vec::new();
  net.receive(own, &mut |b: Vec<u8>| got.push(b));
  got
}

#[test]
fn test_delivery_next_round() {
  let (a, b) = (Address::new(1, 0), Address::new(2, 0));
  let mut net = EmulNet::new(FailureConfigMap::default(), Some(1));
  net.set_round(5);
  net.send(&a, &b, vec![1]);
  net.send(&a, &b, vec![2]);
  assert!(drain(&mut net, &b).is_empty());
  net.set_round(6);
  assert!(drain(&mut net, &a).is_empty());
  assert_eq!(drain(&mut net, &b), vec![vec![1], vec![2]]);
  assert_eq!(net.in_flight(), 0);
  assert_eq!(net.stats().delivered, 2);
}

#[test]
fn test_drop_and_delay() {
  let (a, b, c) = (Address::new(1, 0), Address::new(2, 0), Address::new(3, 0));
  let mut map = FailureConfigMap::default();
  map.node_wide.insert(b, FailureConfig { drop_prob: 1.0, delay: None });
  map.node_wide.insert(c, FailureConfig { drop_prob: 0.0, delay: Some((2, 2)) });
  let mut net = EmulNet::new(map, Some(1));
  net.send(&a, &b, vec![1]);
  net.send(&a, &c, vec![2]);
  assert_eq!(net.stats().dropped, 1);
  net.set_round(2);
  assert!(drain(&mut net, &c).is_empty());
  net.set_round(3);
  assert_eq!(drain(&mut net, &c), vec![vec![2]]);
  assert!(drain(&mut net, &b).is_empty());
}

#[test]
fn test_shut_down_discards() {
  let (a, b) = (Address::new(1, 0), Address::new(2, 0));
  let mut net = EmulNet::new(FailureConfigMap::default(), Some(1));
  net.send(&a, &b, vec![1]);
  net.send(&b, &a, vec![2]);
  assert_eq!(net.shut_down(&b), 1);
  assert_eq!(net.queued_for(&b), 0);
  net.send(&a, &b, vec![3]);
  assert_eq!(net.queued_for(&b), 0);
  assert_eq!(net.in_flight(), 1);
  assert_eq!(net.stats().dropped, 2);
  net.set_round(1);
  assert!(drain(&mut net, &b).is_empty());
  assert_eq!(drain(&mut net, &a), vec![vec![2]]);
}
