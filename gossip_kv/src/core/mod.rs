//! Types shared by every layer: addresses, wire messages and the collaborators a node is driven
//! through ([`Transport`], [`LocalStore`] and [`LogSink`]).

mod address;
mod error;
mod log;
mod messages;
mod store;
mod transport;

#[rustfmt::skip]
pub use {
  address::Address,
  error::KvError,
  error::Result,
  log::FailReason,
  log::LogEvent,
  log::LogSink,
  log::Outcome,
  log::Role,
  messages::send_msg,
  messages::Message,
  messages::OpKind,
  messages::ReplicaType,
  messages::REPAIR_TRANS_ID,
  store::HashTable,
  store::LocalStore,
  transport::Transport,
};
