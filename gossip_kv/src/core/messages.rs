use crate::cluster::MembershipEntry;
use crate::core::{Address, Result, Transport};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Transaction id carried by stabilization traffic. Replicas apply requests carrying it but never
/// reply, and no coordinator tracks it.
pub const REPAIR_TRANS_ID: u64 = u64::MAX;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Hash, PartialEq, Eq, Ord, PartialOrd)]
pub enum OpKind {
  Create,
  Read,
  Update,
  Delete,
}
impl fmt::Display for OpKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      OpKind::Create => "create",
      OpKind::Read => "read",
      OpKind::Update => "update",
      OpKind::Delete => "delete",
    };
    f.write_str(s)
  }
}

/// Position of the receiving replica within a key's preference list.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ReplicaType {
  Primary,
  Secondary,
  Tertiary,
}
impl ReplicaType {
  pub fn from_position(pos: usize) -> ReplicaType {
    match pos {
      0 => ReplicaType::Primary,
      1 => ReplicaType::Secondary,
      _ => ReplicaType::Tertiary,
    }
  }
}

/// Everything one node can say to another. The first three variants belong to the membership
/// protocol, the rest to the replicated store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Message {
  JoinRequest {
    sender: Address,
    entries: Vec<MembershipEntry>,
  },
  JoinResponse {
    sender: Address,
    entries: Vec<MembershipEntry>,
  },
  Heartbeat {
    sender: Address,
    entries: Vec<MembershipEntry>,
  },
  Request {
    trans_id: u64,
    sender: Address,
    kind: OpKind,
    key: String,
    value: Option<String>,
    replica: ReplicaType,
  },
  Reply {
    trans_id: u64,
    sender: Address,
    success: bool,
  },
  /// An empty `value` is a miss.
  ReadReply {
    trans_id: u64,
    sender: Address,
    value: String,
  },
}
impl Message {
  pub fn is_membership(&self) -> bool {
    matches!(
      self,
      Message::JoinRequest { .. } | Message::JoinResponse { .. } | Message::Heartbeat { .. }
    )
  }

  pub fn encode(&self) -> Result<Vec<u8>> {
    Ok(serde_cbor::to_vec(self)?)
  }

  pub fn decode(bytes: &[u8]) -> Result<Message> {
    Ok(serde_cbor::from_slice(bytes)?)
  }
}

/// Serializes `msg` and hands it to the transport. Sends are fire-and-forget, so an encoding
/// failure is reported and otherwise looks like a lost packet.
pub fn send_msg<T: Transport + ?Sized>(net: &mut T, from: &Address, to: &Address, msg: &Message) {
  match msg.encode() {
    Ok(bytes) => net.send(from, to, bytes),
    Err(e) => warn!(%from, %to, error = %e, "could not encode message"),
  }
}

#[test]
fn test_message_cbor() {
  let msg = Message::Request {
    trans_id: 7,
    sender: Address::new(3, 0),
    kind: OpKind::Update,
    key: "k1".to_string(),
    value: Some("v2".to_string()),
    replica: ReplicaType::from_position(1),
  };
  let bytes = msg.encode().unwrap();
  assert_eq!(Message::decode(&bytes).unwrap(), msg);
  assert!(!msg.is_membership());
  assert!(Message::decode(&bytes[..bytes.len() - 1]).is_err());
}
