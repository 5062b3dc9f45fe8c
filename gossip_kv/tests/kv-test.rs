use gossip_kv::cluster::ClusterConfig;
use gossip_kv::core::{
  Address, FailReason, KvError, LocalStore, LogEvent, OpKind, Outcome, Role,
};
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

fn cluster(seed: u64, size: u32) -> Simulation {
  let mut cfg = ClusterConfig::default();
  cfg.bootstrap = BOOT;
  cfg.seed = Some(seed);
  let mut sim = Simulation::new(cfg, FailureConfigMap::default()).unwrap();
  for id in 1..=size {
    sim.add_node(addr(id)).unwrap();
    sim.step();
  }
  sim.run(30);
  for node in sim.nodes() {
    assert_eq!(node.ring().len(), size as usize, "ring of {}", node.address());
  }
  sim
}

fn replicas(sim: &Simulation, key: &str) -> Vec<Address> {
  let ring = sim.node(&BOOT).unwrap().ring();
  ring.find_replicas(key).into_iter().map(|r| r.address).collect()
}

fn read_value(sim: &Simulation, coordinator: &Address, trans_id: u64) -> Option<String> {
  sim.log().events().iter().find_map(|e| match e {
    LogEvent::Operation {
      node,
      role: Role::Coordinator,
      trans_id: t,
      kind: OpKind::Read,
      value,
      ..
    } if node == coordinator && *t == trans_id => value.clone(),
    _ => None,
  })
}

#[test]
fn create_on_three_nodes() {
  init_tracing();
  let mut sim = cluster(21, 3);
  let id = sim.create(&addr(2), "k1", "v1").unwrap();
  sim.run(2);
  assert_eq!(sim.log().outcomes(&addr(2), id), vec![Outcome::Success]);
  for node in sim.nodes() {
    assert_eq!(node.store().read("k1"), Some("v1".to_string()));
    assert!(node.pending().is_empty());
  }
  let replica_logs = sim
    .log()
    .events()
    .iter()
    .filter(|e| matches!(e, LogEvent::Operation { role: Role::Replica, .. }))
    .count();
  assert_eq!(replica_logs, 3);

  sim.run(5);
  assert_eq!(sim.log().outcomes(&addr(2), id).len(), 1);
}

#[test]
fn update_read_delete() {
  init_tracing();
  let mut sim = cluster(22, 4);
  let coordinator = addr(3);
  let id = sim.create(&coordinator, "k1", "v1").unwrap();
  sim.run(2);
  assert_eq!(sim.log().outcomes(&coordinator, id), vec![Outcome::Success]);

  let id = sim.update(&coordinator, "k1", "v2").unwrap();
  sim.run(2);
  assert_eq!(sim.log().outcomes(&coordinator, id), vec![Outcome::Success]);

  let id = sim.read(&coordinator, "k1").unwrap();
  sim.run(2);
  assert_eq!(sim.log().outcomes(&coordinator, id), vec![Outcome::Success]);
  assert_eq!(read_value(&sim, &coordinator, id), Some("v2".to_string()));

  let id = sim.delete(&coordinator, "k1").unwrap();
  sim.run(2);
  assert_eq!(sim.log().outcomes(&coordinator, id), vec![Outcome::Success]);
  for node in sim.nodes() {
    assert_eq!(node.store().read("k1"), None);
  }

  let id = sim.read(&coordinator, "k1").unwrap();
  sim.run(2);
  assert_eq!(
    sim.log().outcomes(&coordinator, id),
    vec![Outcome::Failure(FailReason::Quorum)]
  );
}

#[test]
fn delete_missing_key_fails() {
  init_tracing();
  let mut sim = cluster(23, 3);
  let id = sim.delete(&addr(1), "nope").unwrap();
  sim.run(2);
  assert_eq!(
    sim.log().outcomes(&addr(1), id),
    vec![Outcome::Failure(FailReason::Quorum)]
  );
}

#[test]
fn too_few_nodes_is_unavailable() {
  init_tracing();
  let mut sim = cluster(24, 2);
  assert!(matches!(
    sim.create(&addr(1), "k1", "v1"),
    Err(KvError::Unavailable { members: 2, .. })
  ));
  assert!(matches!(
    sim.read(&addr(9), "k1"),
    Err(KvError::UnknownNode(_))
  ));
}

#[test]
fn quorum_without_one_replica() {
  init_tracing();
  let mut sim = cluster(25, 4);
  let owners = replicas(&sim, "k1");
  let (deaf, coordinator) = (owners[0], owners[1]);
  sim.net_mut().fail_map_mut().node_wide.insert(
    deaf,
    FailureConfig {
      drop_prob: 1.0,
      delay: None,
    },
  );
  let id = sim.create(&coordinator, "k1", "v1").unwrap();
  sim.run(2);
  assert_eq!(sim.log().outcomes(&coordinator, id), vec![Outcome::Success]);
  assert_eq!(sim.node(&deaf).unwrap().store().read("k1"), None);
}

#[test]
fn unanswered_transaction_times_out() {
  init_tracing();
  let mut sim = cluster(26, 3);
  let coordinator = addr(2);
  sim.net_mut().fail_map_mut().node_wide.insert(
    coordinator,
    FailureConfig {
      drop_prob: 1.0,
      delay: None,
    },
  );
  let id = sim.create(&coordinator, "k1", "v1").unwrap();
  sim.run(4);
  assert!(sim.log().outcomes(&coordinator, id).is_empty());
  sim.run(2);
  assert_eq!(
    sim.log().outcomes(&coordinator, id),
    vec![Outcome::Failure(FailReason::Timeout)]
  );
  assert!(sim.node(&coordinator).unwrap().pending().is_empty());
}

#[test]
fn stabilization_restores_replicas() {
  init_tracing();
  let mut sim = cluster(27, 4);
  let owners = replicas(&sim, "k1");
  let spare = (1..=4).map(addr).find(|a| !owners.contains(a)).unwrap();
  let coordinator = owners[1];

  let id = sim.create(&coordinator, "k1", "v1").unwrap();
  sim.run(2);
  assert_eq!(sim.log().outcomes(&coordinator, id), vec![Outcome::Success]);
  assert_eq!(sim.node(&spare).unwrap().store().read("k1"), None);

  sim.fail_node(&owners[0]).unwrap();
  sim.run(35);
  let live = sim.live_nodes().map(|n| *n.address()).collect_vec();
  assert_eq!(live.len(), 3);
  for node in sim.live_nodes() {
    assert_eq!(node.ring().len(), 3);
    assert_eq!(node.store().read("k1"), Some("v1".to_string()));
  }

  let id = sim.read(&coordinator, "k1").unwrap();
  sim.run(2);
  assert_eq!(sim.log().outcomes(&coordinator, id), vec![Outcome::Success]);
  assert_eq!(read_value(&sim, &coordinator, id), Some("v1".to_string()));
}
