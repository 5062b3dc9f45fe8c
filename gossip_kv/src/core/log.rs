use crate::core::{Address, OpKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the logging node issued the transaction or served it as a replica.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Role {
  Coordinator,
  Replica,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum FailReason {
  /// The local store refused the operation, or a read missed.
  Replica,
  /// Too many replicas answered negatively for a quorum to be possible.
  Quorum,
  /// The transaction outlived its timeout without a quorum.
  Timeout,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Outcome {
  Success,
  Failure(FailReason),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum LogEvent {
  NodeAdded {
    observer: Address,
    added: Address,
  },
  NodeRemoved {
    observer: Address,
    removed: Address,
  },
  Operation {
    node: Address,
    role: Role,
    trans_id: u64,
    kind: OpKind,
    key: String,
    value: Option<String>,
    outcome: Outcome,
  },
}
impl fmt::Display for LogEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LogEvent::NodeAdded { observer, added } => write!(f, "[{}] node {} joined", observer, added),
      LogEvent::NodeRemoved { observer, removed } => {
        write!(f, "[{}] node {} removed", observer, removed)
      }
      LogEvent::Operation { node, role, trans_id, kind, key, value, outcome } => {
        write!(f, "[{}] {:?} {} {} key={}", node, role, kind, trans_id, key)?;
        if let Some(v) = value {
          write!(f, " value={}", v)?;
        }
        match outcome {
          Outcome::Success => write!(f, " success"),
          Outcome::Failure(r) => write!(f, " fail ({:?})", r),
        }
      }
    }
  }
}

/// Receives membership changes and operation outcomes. Fire-and-forget.
pub trait LogSink {
  fn log(&mut self, event: LogEvent);
}
impl LogSink for Vec<LogEvent> {
  fn log(&mut self, event: LogEvent) {
    self.push(event);
  }
}
