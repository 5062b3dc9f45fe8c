use crate::cluster::{ClusterConfig, ClusterEvent, MembershipEntry, MembershipTable};
use crate::core::{send_msg, Address, LogEvent, LogSink, Message, Transport};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use tracing::{debug, info, trace};
use wyhash::WyHash;

use MachineState::*;

#[derive(Serialize, Deserialize, Hash, PartialEq, Eq, Clone, Copy, Debug)]
pub enum MachineState {
  Uninitialized,
  Joining,
  Member,
  Failed,
}

/// Runs the membership protocol for one node: joining through the bootstrap node, beating its
/// own heart, spreading its view of the cluster and forgetting peers that have gone quiet.
pub struct GossipEngine {
  address: Address,
  config: ClusterConfig,
  state: MachineState,
  heartbeat: u64,
  table: MembershipTable,
  rng: SmallRng,
}
impl GossipEngine {
  pub fn new(address: Address, config: ClusterConfig) -> GossipEngine {
    let rng = match config.seed {
      Some(seed) => {
        let mut hasher = WyHash::with_seed(seed);
        address.hash(&mut hasher);
        SmallRng::seed_from_u64(hasher.finish())
      }
      None => SmallRng::from_entropy(),
    };
    GossipEngine {
      address: address,
      config: config,
      state: Uninitialized,
      heartbeat: 0,
      table: MembershipTable::new(),
      rng: rng,
    }
  }

  pub fn state(&self) -> MachineState {
    self.state
  }

  pub fn heartbeat(&self) -> u64 {
    self.heartbeat
  }

  pub fn table(&self) -> &MembershipTable {
    &self.table
  }

  /// Peers this node currently believes are alive, suspects included.
  pub fn members(&self) -> im::OrdSet<Address> {
    self.table.members()
  }

  pub fn suspects(&self, now: u64) -> Vec<Address> {
    self.table.suspects(now, self.config.t_fail)
  }

  pub fn start<T: Transport + ?Sized>(&mut self, now: u64, net: &mut T) {
    if self.state != Uninitialized {
      return;
    }
    if self.address == self.config.bootstrap {
      info!(node = %self.address, "starting up group");
      self.state = Member;
    } else {
      info!(node = %self.address, bootstrap = %self.config.bootstrap, "trying to join");
      self.state = Joining;
      let msg = Message::JoinRequest {
        sender: self.address,
        entries: self.view(now),
      };
      send_msg(net, &self.address, &self.config.bootstrap, &msg);
    }
  }

  pub fn fail(&mut self) {
    self.state = Failed;
  }

  /// Handles one membership message. Data messages are ignored.
  pub fn handle<T, L>(&mut self, msg: Message, now: u64, net: &mut T, log: &mut L)
  where
    T: Transport + ?Sized,
    L: LogSink + ?Sized,
  {
    if matches!(self.state, Uninitialized | Failed) {
      return;
    }
    match msg {
      Message::JoinRequest { sender, entries } => {
        debug!(node = %self.address, from = %sender, "join request");
        self.merge(entries, now, log);
        let reply = Message::JoinResponse {
          sender: self.address,
          entries: self.view(now),
        };
        send_msg(net, &self.address, &sender, &reply);
      }
      Message::JoinResponse { sender, entries } | Message::Heartbeat { sender, entries } => {
        trace!(node = %self.address, from = %sender, entries = entries.len(), "gossip");
        self.merge(entries, now, log);
        if self.state == Joining {
          info!(node = %self.address, "joined the group");
        }
        self.state = Member;
      }
      _ => {}
    }
  }

  /// Per-round duties of a member: heartbeat, eviction, then gossip.
  pub fn tick<T, L>(&mut self, now: u64, net: &mut T, log: &mut L)
  where
    T: Transport + ?Sized,
    L: LogSink + ?Sized,
  {
    if self.state != Member {
      return;
    }
    self.heartbeat += 1;
    let events = self.table.evict(now, self.config.t_remove);
    self.report(events, log);
    let view = self.view(now);
    for peer in self.table.members() {
      if self.rng.gen::<f64>() >= self.config.gossip_prob {
        continue;
      }
      let msg = Message::Heartbeat {
        sender: self.address,
        entries: view.clone(),
      };
      send_msg(net, &self.address, &peer, &msg);
    }
  }

  /// The fresh part of the table plus this node's own entry.
  fn view(&self, now: u64) -> Vec<MembershipEntry> {
    let mut entries = self.table.fresh(now, self.config.t_fail);
    entries.push(MembershipEntry::new(self.address, self.heartbeat, now));
    entries
  }

  fn merge<L: LogSink + ?Sized>(&mut self, entries: Vec<MembershipEntry>, now: u64, log: &mut L) {
    let events = self.table.merge(&self.address, entries, now);
    self.report(events, log);
  }

  fn report<L: LogSink + ?Sized>(&self, events: Vec<ClusterEvent>, log: &mut L) {
    for event in events {
      let event = match event {
        ClusterEvent::Added(added) => LogEvent::NodeAdded {
          observer: self.address,
          added: added,
        },
        ClusterEvent::Removed(removed) => LogEvent::NodeRemoved {
          observer: self.address,
          removed: removed,
        },
      };
      debug!("{}", event);
      log.log(event);
    }
  }
}

#[cfg(test)]
use crate::core::LogEvent::*;

#[cfg(test)]
use crate::test_commons::{seeded, Outbox};

#[test]
fn test_bootstrap_and_join() {
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let boot_addr = Address::new(1, 0);
  let joiner_addr = Address::new(2, 0);
  let mut boot = GossipEngine::new(boot_addr, seeded());
  let mut joiner = GossipEngine::new(joiner_addr, seeded());

  boot.start(0, &mut net);
  assert_eq!(boot.state(), Member);
  assert!(net.0.is_empty());

  joiner.start(0, &mut net);
  assert_eq!(joiner.state(), Joining);
  let (from, to, req) = net.0.pop().unwrap();
  assert_eq!((from, to), (joiner_addr, boot_addr));

  boot.handle(req, 1, &mut net, &mut log);
  assert_eq!(log, vec![NodeAdded { observer: boot_addr, added: joiner_addr }]);
  let (_, to, resp) = net.0.pop().unwrap();
  assert_eq!(to, joiner_addr);
  assert!(matches!(resp, Message::JoinResponse { .. }));

  joiner.handle(resp, 2, &mut net, &mut log);
  assert_eq!(joiner.state(), Member);
  assert_eq!(joiner.members(), im::ordset![boot_addr]);
}

#[test]
fn test_heartbeat_completes_join() {
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let boot_addr = Address::new(1, 0);
  let joiner_addr = Address::new(2, 0);
  let mut joiner = GossipEngine::new(joiner_addr, seeded());
  joiner.start(0, &mut net);
  assert_eq!(joiner.state(), Joining);
  assert_eq!(joiner.heartbeat(), 0);

  joiner.handle(
    Message::Heartbeat {
      sender: boot_addr,
      entries: vec![MembershipEntry::new(boot_addr, 3, 0)],
    },
    2,
    &mut net,
    &mut log,
  );
  assert_eq!(joiner.state(), Member);
  assert_eq!(joiner.members(), im::ordset![boot_addr]);
  assert_eq!(log, vec![NodeAdded { observer: joiner_addr, added: boot_addr }]);

  joiner.tick(3, &mut net, &mut log);
  assert_eq!(joiner.heartbeat(), 1);
}

#[test]
fn test_tick_gossips_fresh_view() {
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let me = Address::new(1, 0);
  let mut cfg = seeded();
  cfg.gossip_prob = 1.0;
  let mut engine = GossipEngine::new(me, cfg);
  engine.start(0, &mut net);
  let hb = |id: u32, heartbeat: u64| MembershipEntry::new(Address::new(id, 0), heartbeat, 0);
  engine.handle(
    Message::Heartbeat { sender: Address::new(2, 0), entries: vec![hb(2, 1)] },
    0,
    &mut net,
    &mut log,
  );
  engine.handle(
    Message::Heartbeat { sender: Address::new(3, 0), entries: vec![hb(3, 1)] },
    4,
    &mut net,
    &mut log,
  );

  engine.tick(8, &mut net, &mut log);
  assert_eq!(engine.heartbeat(), 1);
  assert_eq!(engine.suspects(8), vec![Address::new(2, 0)]);
  assert_eq!(net.0.len(), 2);
  for (_, _, msg) in net.0.drain(..) {
    match msg {
      Message::Heartbeat { entries, .. } => {
        let ids = entries.iter().map(|e| e.member.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(entries[1].heartbeat, 1);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  log.clear();
  engine.tick(20, &mut net, &mut log);
  assert_eq!(log, vec![NodeRemoved { observer: me, removed: Address::new(2, 0) }]);
  engine.tick(21, &mut net, &mut log);
  assert_eq!(log.len(), 1);
}

#[test]
fn test_failed_engine_is_inert() {
  let mut net = Outbox::default();
  let mut log: Vec<LogEvent> = Vec::new();
  let mut engine = GossipEngine::new(Address::new(1, 0), seeded());
  engine.start(0, &mut net);
  engine.fail();
  engine.handle(
    Message::Heartbeat {
      sender: Address::new(2, 0),
      entries: vec![MembershipEntry::new(Address::new(2, 0), 1, 0)],
    },
    1,
    &mut net,
    &mut log,
  );
  engine.tick(1, &mut net, &mut log);
  assert_eq!(engine.state(), Failed);
  assert_eq!(engine.heartbeat(), 0);
  assert!(engine.table().is_empty());
  assert!(log.is_empty());
}
