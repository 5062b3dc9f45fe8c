use crate::core::Address;

pub type Result<T> = std::result::Result<T, KvError>;

#[derive(thiserror::Error, Debug)]
pub enum KvError {
  #[error("no replica set for key {key:?}: ring has {members} member(s)")]
  Unavailable { key: String, members: usize },

  #[error("CBOR error: {0}")]
  Codec(#[from] serde_cbor::Error),

  #[error("invalid cluster config: {0}")]
  Config(String),

  #[error("node {0} has failed")]
  NodeFailed(Address),

  #[error("no node at {0}")]
  UnknownNode(Address),
}
