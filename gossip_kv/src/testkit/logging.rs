use crate::core::{Address, LogEvent, LogSink, Outcome, Role};
use tracing::info;

/// A [`LogSink`] that keeps every event, for inspection by tests.
#[derive(Clone, Default, Debug)]
pub struct EventRecorder {
  events: Vec<LogEvent>,
}
impl EventRecorder {
  pub fn new() -> EventRecorder {
    EventRecorder::default()
  }

  pub fn events(&self) -> &[LogEvent] {
    &self.events
  }

  pub fn clear(&mut self) {
    self.events.clear();
  }

  /// Every peer `observer` has added, in order.
  pub fn added_by(&self, observer: &Address) -> Vec<Address> {
    self
      .events
      .iter()
      .filter_map(|e| match e {
        LogEvent::NodeAdded { observer: o, added } if o == observer => Some(*added),
        _ => None,
      })
      .collect()
  }

  /// Every peer `observer` has removed, in order.
  pub fn removed_by(&self, observer: &Address) -> Vec<Address> {
    self
      .events
      .iter()
      .filter_map(|e| match e {
        LogEvent::NodeRemoved { observer: o, removed } if o == observer => Some(*removed),
        _ => None,
      })
      .collect()
  }

  /// Every outcome `coordinator` logged for transaction `trans_id`. A decided transaction has
  /// exactly one.
  pub fn outcomes(&self, coordinator: &Address, trans_id: u64) -> Vec<Outcome> {
    self
      .events
      .iter()
      .filter_map(|e| match e {
        LogEvent::Operation { node, role: Role::Coordinator, trans_id: t, outcome, .. }
          if node == coordinator && *t == trans_id =>
        {
          Some(*outcome)
        }
        _ => None,
      })
      .collect()
  }
}
impl LogSink for EventRecorder {
  fn log(&mut self, event: LogEvent) {
    info!("{}", event);
    self.events.push(event);
  }
}
