use crate::core::Address;

/// Unreliable point-to-point delivery of byte payloads between [`Address`]es.
///
/// Payloads may be delayed or lost, but are never corrupted. Nothing in this crate waits on a
/// send; every exchange is matched up later through transaction ids or heartbeat counters.
pub trait Transport {
  fn send(&mut self, from: &Address, to: &Address, bytes: Vec<u8>);

  /// Hands every payload currently deliverable to `own` to `on_message`, in arrival order.
  fn receive(&mut self, own: &Address, on_message: &mut dyn FnMut(Vec<u8>));
}
