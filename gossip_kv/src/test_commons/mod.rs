use crate::cluster::ClusterConfig;
use crate::core::{Address, Message, Transport};

/// Captures everything sent through it, decoded.
#[derive(Default)]
pub struct Outbox(pub Vec<(Address, Address, Message)>);
impl Transport for Outbox {
  fn send(&mut self, from: &Address, to: &Address, bytes: Vec<u8>) {
    self.0.push((*from, *to, Message::decode(&bytes).unwrap()));
  }

  fn receive(&mut self, _: &Address, _: &mut dyn FnMut(Vec<u8>)) {}
}

pub fn seeded() -> ClusterConfig {
  let mut cfg = ClusterConfig::default();
  cfg.seed = Some(7);
  cfg
}

pub fn addr(id: u32) -> Address {
  Address::new(id, 0)
}
