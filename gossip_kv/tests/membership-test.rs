use gossip_kv::cluster::{ClusterConfig, MachineState};
use gossip_kv::core::Address;
use gossip_kv::testkit::{FailureConfig, FailureConfigMap, Simulation};
use itertools::Itertools;
use tracing_subscriber::EnvFilter;

const BOOT: Address = Address::new(1, 0);

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

fn addr(id: u32) -> Address {
  Address::new(id, 0)
}

fn config(seed: u64) -> ClusterConfig {
  let mut cfg = ClusterConfig::default();
  cfg.bootstrap = BOOT;
  cfg.seed = Some(seed);
  cfg
}

/// Boots `BOOT`, then joins the rest one round apart.
fn boot(sim: &mut Simulation, ids: &[u32]) {
  for id in ids {
    sim.add_node(addr(*id)).unwrap();
    sim.step();
  }
}

fn assert_converged(sim: &Simulation, expected: &[u32]) {
  for node in sim.live_nodes() {
    assert_eq!(node.state(), MachineState::Member, "{}", node.address());
    let mut view = node.members();
    view.insert(*node.address());
    let ids = view.iter().map(|a| a.id).collect_vec();
    assert_eq!(ids, expected, "view of {}", node.address());
  }
}

#[test]
fn four_nodes_converge() {
  init_tracing();
  let mut sim = Simulation::new(config(11), FailureConfigMap::default()).unwrap();
  boot(&mut sim, &[1, 2, 3, 4]);
  sim.run(30);
  assert_converged(&sim, &[1, 2, 3, 4]);
  for id in 1..=4 {
    let added = sim.log().added_by(&addr(id));
    let expected = (1..=4).filter(|x| *x != id).map(addr).collect_vec();
    assert_eq!(added.iter().copied().sorted().collect_vec(), expected);
    assert!(sim.log().removed_by(&addr(id)).is_empty());
  }
  assert_eq!(sim.net().stats().dropped, 0);
}

#[test]
fn failed_node_is_evicted_once() {
  init_tracing();
  let cfg = config(12);
  let t_remove = cfg.t_remove;
  let mut sim = Simulation::new(cfg, FailureConfigMap::default()).unwrap();
  boot(&mut sim, &[1, 2, 3, 4]);
  sim.run(30);
  sim.fail_node(&addr(3)).unwrap();
  sim.run(5);
  assert_eq!(sim.net().queued_for(&addr(3)), 0);
  sim.run(t_remove + 10);
  assert_converged(&sim, &[1, 2, 4]);
  for id in [1, 2, 4].iter() {
    assert_eq!(sim.log().removed_by(&addr(*id)), vec![addr(3)]);
  }
  assert_eq!(sim.node(&addr(3)).unwrap().state(), MachineState::Failed);
}

#[test]
fn suspects_before_eviction() {
  init_tracing();
  let cfg = config(13);
  let t_fail = cfg.t_fail;
  let mut sim = Simulation::new(cfg, FailureConfigMap::default()).unwrap();
  boot(&mut sim, &[1, 2, 3]);
  sim.run(20);
  sim.fail_node(&addr(2)).unwrap();
  sim.run(t_fail + 5);
  let now = sim.now();
  let boot_node = sim.node(&BOOT).unwrap();
  assert_eq!(boot_node.gossip().suspects(now), vec![addr(2)]);
  assert!(boot_node.members().contains(&addr(2)));
}

#[test]
fn lossy_network_converges() {
  init_tracing();
  let mut fail_map = FailureConfigMap::default();
  fail_map.cluster_wide = FailureConfig {
    drop_prob: 0.1,
    delay: Some((0, 1)),
  };
  // Joins are never retried, so the path to the bootstrap node stays clean.
  fail_map.node_wide.insert(BOOT, FailureConfig::default());
  let mut sim = Simulation::new(config(14), fail_map).unwrap();
  boot(&mut sim, &[1, 2, 3, 4, 5, 6]);
  sim.run(40);
  assert_converged(&sim, &[1, 2, 3, 4, 5, 6]);
  assert!(sim.net().stats().dropped > 0);
  for id in 1..=6 {
    assert!(sim.log().removed_by(&addr(id)).is_empty());
  }
}
