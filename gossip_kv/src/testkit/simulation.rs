use crate::cluster::ClusterConfig;
use crate::core::{Address, HashTable, KvError, Result};
use crate::testkit::{EmulNet, EventRecorder, FailureConfigMap};
use crate::KvNode;
use std::collections::BTreeMap;
use tracing::debug;

/// Many [`KvNode`]s driven in lockstep over one [`EmulNet`].
///
/// Each [`step`](Simulation::step) advances the shared clock by one round, lets every live node
/// receive, and only then runs every node's round. Client operations issued between steps are
/// sent in the current round and reach the replicas on the next step.
pub struct Simulation {
  config: ClusterConfig,
  nodes: BTreeMap<Address, KvNode<HashTable>>,
  net: EmulNet,
  log: EventRecorder,
  now: u64,
}
impl Simulation {
  pub fn new(config: ClusterConfig, fail_map: FailureConfigMap) -> Result<Simulation> {
    config.validate()?;
    Ok(Simulation {
      net: EmulNet::new(fail_map, config.seed),
      config: config,
      nodes: BTreeMap::new(),
      log: EventRecorder::new(),
      now: 0,
    })
  }

  pub fn now(&self) -> u64 {
    self.now
  }

  /// Starts a node at `address`, which joins through the bootstrap node.
  pub fn add_node(&mut self, address: Address) -> Result<()> {
    let mut node = KvNode::new(address, self.config.clone(), HashTable::new())?;
    node.start(self.now, &mut self.net);
    self.nodes.insert(address, node);
    Ok(())
  }

  pub fn fail_node(&mut self, address: &Address) -> Result<()> {
    let node = self
      .nodes
      .get_mut(address)
      .ok_or(KvError::UnknownNode(*address))?;
    node.fail();
    let discarded = self.net.shut_down(address);
    debug!(node = %address, discarded, "node failed");
    Ok(())
  }

  pub fn step(&mut self) {
    self.now += 1;
    self.net.set_round(self.now);
    for node in self.nodes.values_mut() {
      node.recv_loop(&mut self.net);
    }
    for node in self.nodes.values_mut() {
      node.node_loop(self.now, &mut self.net, &mut self.log);
    }
    debug!(round = self.now, in_flight = self.net.in_flight(), "round complete");
  }

  pub fn run(&mut self, rounds: u64) {
    for _ in 0..rounds {
      self.step();
    }
  }

  pub fn node(&self, address: &Address) -> Option<&KvNode<HashTable>> {
    self.nodes.get(address)
  }

  pub fn nodes(&self) -> impl Iterator<Item = &KvNode<HashTable>> {
    self.nodes.values()
  }

  pub fn live_nodes(&self) -> impl Iterator<Item = &KvNode<HashTable>> {
    self.nodes.values().filter(|n| !n.is_failed())
  }

  pub fn log(&self) -> &EventRecorder {
    &self.log
  }

  pub fn net(&self) -> &EmulNet {
    &self.net
  }

  pub fn net_mut(&mut self) -> &mut EmulNet {
    &mut self.net
  }

  pub fn create(&mut self, coordinator: &Address, key: &str, value: &str) -> Result<u64> {
    let (now, net) = (self.now, &mut self.net);
    Self::coordinator(&mut self.nodes, coordinator)?.client_create(key, value, now, net)
  }

  pub fn read(&mut self, coordinator: &Address, key: &str) -> Result<u64> {
    let (now, net) = (self.now, &mut self.net);
    Self::coordinator(&mut self.nodes, coordinator)?.client_read(key, now, net)
  }

  pub fn update(&mut self, coordinator: &Address, key: &str, value: &str) -> Result<u64> {
    let (now, net) = (self.now, &mut self.net);
    Self::coordinator(&mut self.nodes, coordinator)?.client_update(key, value, now, net)
  }

  pub fn delete(&mut self, coordinator: &Address, key: &str) -> Result<u64> {
    let (now, net) = (self.now, &mut self.net);
    Self::coordinator(&mut self.nodes, coordinator)?.client_delete(key, now, net)
  }

  fn coordinator<'a>(
    nodes: &'a mut BTreeMap<Address, KvNode<HashTable>>,
    address: &Address,
  ) -> Result<&'a mut KvNode<HashTable>> {
    nodes.get_mut(address).ok_or(KvError::UnknownNode(*address))
  }
}
