use crate::core::Address;
use im::HashMap;
use serde::{Deserialize, Serialize};
use std::env::var;

/// How unreliable delivery to a node is. Delays are in rounds, inclusive.
#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct FailureConfig {
  pub drop_prob: f64,
  pub delay: Option<(u64, u64)>,
}
impl FailureConfig {
  /// Reads `KV_PACKET_DROP`, `KV_MIN_DELAY` and `KV_MAX_DELAY`. Unset or unparsable variables
  /// mean a reliable network. The delay is only used if both bounds are set and ordered.
  pub fn from_env() -> FailureConfig {
    let drop_prob = var("KV_PACKET_DROP")
      .ok()
      .and_then(|x| x.parse::<f64>().ok())
      .unwrap_or(0.0);
    let delay = var("KV_MIN_DELAY")
      .ok()
      .and_then(|x| x.parse::<u64>().ok())
      .zip(var("KV_MAX_DELAY").ok().and_then(|x| x.parse::<u64>().ok()))
      .filter(|(x, y)| x <= y);
    FailureConfig {
      drop_prob: drop_prob,
      delay: delay,
    }
  }
}

/// Failure settings for the whole cluster, with overrides for payloads sent to particular nodes.
#[derive(Clone, Default, Serialize, Deserialize, Debug)]
pub struct FailureConfigMap {
  pub cluster_wide: FailureConfig,
  pub node_wide: HashMap<Address, FailureConfig>,
}
impl FailureConfigMap {
  pub fn get(&self, dest: &Address) -> &FailureConfig {
    self.node_wide.get(dest).unwrap_or(&self.cluster_wide)
  }
}

#[test]
fn test_failure_config_map() {
  let lossy = FailureConfig {
    drop_prob: 0.5,
    delay: Some((1, 3)),
  };
  let mut map = FailureConfigMap::default();
  map.node_wide.insert(Address::new(2, 0), lossy);
  assert_eq!(map.get(&Address::new(2, 0)), &lossy);
  assert_eq!(map.get(&Address::new(3, 0)), &FailureConfig::default());
}

#[cfg(test)]
use std::env::{remove_var, set_var};

#[test]
fn test_failure_config_from_env() {
  set_var("KV_PACKET_DROP", "0.25");
  set_var("KV_MIN_DELAY", "1");
  set_var("KV_MAX_DELAY", "3");
  assert_eq!(
    FailureConfig::from_env(),
    FailureConfig {
      drop_prob: 0.25,
      delay: Some((1, 3)),
    }
  );

  set_var("KV_MIN_DELAY", "4");
  assert_eq!(FailureConfig::from_env().delay, None);

  remove_var("KV_MIN_DELAY");
  set_var("KV_MAX_DELAY", "3");
  assert_eq!(FailureConfig::from_env().delay, None);

  set_var("KV_PACKET_DROP", "often");
  set_var("KV_MIN_DELAY", "soon");
  assert_eq!(FailureConfig::from_env(), FailureConfig::default());

  remove_var("KV_PACKET_DROP");
  remove_var("KV_MIN_DELAY");
  remove_var("KV_MAX_DELAY");
  assert_eq!(FailureConfig::from_env(), FailureConfig::default());
}
