//! A key-value store replicated over a consistent hashing ring.
//!
//! Each round, every node rebuilds its [`NodeRing`] from its membership table. A key is stored on
//! the first node at or after the key's hash and on the two nodes after it. Client operations are
//! sent to all three and succeed once two of them agree. They fail once two of them have said no,
//! or once the transaction has waited too long.
//!
//! When a node near this one on the ring disappears, the node re-sends every record it holds to
//! the record's current preference list. This is how the store gets back to three copies of each
//! key after a failure.

mod coordinator;
mod node_ring;
mod stabilization;
mod transaction;

#[rustfmt::skip]
pub use {
  coordinator::Coordinator,
  node_ring::hash_code,
  node_ring::neighborhood_changed,
  node_ring::NodeRing,
  node_ring::RingNode,
  stabilization::stabilize,
  transaction::Transaction,
  transaction::Transactions,
};
