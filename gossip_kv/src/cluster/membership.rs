use crate::cluster::{ClusterEvent, MembershipEntry};
use crate::core::Address;
use std::collections::BTreeMap;

use ClusterEvent::*;

/// Folds a received entry into the one already stored for the same member.
///
/// Only a strictly greater heartbeat is news. Anything else leaves `stored` untouched, timestamp
/// included, so stale gossip can never keep a dead member alive.
pub fn merge_entry(
  stored: &MembershipEntry,
  incoming: &MembershipEntry,
  now: u64,
) -> MembershipEntry {
  if incoming.heartbeat > stored.heartbeat {
    MembershipEntry::new(stored.member, incoming.heartbeat, now)
  } else {
    *stored
  }
}

/// One node's view of which other nodes are alive. The owning node is never stored here.
#[derive(Clone, Default, Debug)]
pub struct MembershipTable {
  entries: BTreeMap<Address, MembershipEntry>,
}
impl MembershipTable {
  pub fn new() -> MembershipTable {
    MembershipTable::default()
  }

  pub fn merge<I>(&mut self, owner: &Address, incoming: I, now: u64) -> Vec<ClusterEvent>
  where
    I: IntoIterator<Item = MembershipEntry>,
  {
    let mut events = Vec::new();
    for entry in incoming {
      if &entry.member == owner {
        continue;
      }
      match self.entries.get_mut(&entry.member) {
        Some(stored) => *stored = merge_entry(stored, &entry, now),
        None => {
          self
            .entries
            .insert(entry.member, MembershipEntry::new(entry.member, entry.heartbeat, now));
          events.push(Added(entry.member));
        }
      }
    }
    events
  }

  /// Evicts every entry that has not been refreshed for `t_remove` rounds or more.
  pub fn evict(&mut self, now: u64, t_remove: u64) -> Vec<ClusterEvent> {
    let dead = self
      .entries
      .values()
      .filter(|e| e.age(now) >= t_remove)
      .map(|e| e.member)
      .collect::<Vec<_>>();
    for member in dead.iter() {
      self.entries.remove(member);
    }
    dead.into_iter().map(Removed).collect()
  }

  /// Entries refreshed within the last `t_fail` rounds. Only these are worth gossiping.
  pub fn fresh(&self, now: u64, t_fail: u64) -> Vec<MembershipEntry> {
    self
      .entries
      .values()
      .filter(|e| e.age(now) <= t_fail)
      .copied()
      .collect()
  }

  pub fn suspects(&self, now: u64, t_fail: u64) -> Vec<Address> {
    self
      .entries
      .values()
      .filter(|e| e.age(now) > t_fail)
      .map(|e| e.member)
      .collect()
  }

  pub fn members(&self) -> im::OrdSet<Address> {
    self.entries.keys().copied().collect()
  }

  pub fn get(&self, member: &Address) -> Option<&MembershipEntry> {
    self.entries.get(member)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn addr(id: u32) -> Address {
  Address::new(id, 0)
}

#[test]
fn test_merge_entry_monotonic() {
  let stored = MembershipEntry::new(addr(2), 10, 40);
  assert_eq!(merge_entry(&stored, &MembershipEntry::new(addr(2), 9, 99), 50), stored);
  assert_eq!(merge_entry(&stored, &MembershipEntry::new(addr(2), 10, 99), 50), stored);
  assert_eq!(
    merge_entry(&stored, &MembershipEntry::new(addr(2), 11, 99), 50),
    MembershipEntry::new(addr(2), 11, 50)
  );
}

#[test]
fn test_table_merge() {
  let me = addr(1);
  let mut table = MembershipTable::new();
  let events = table.merge(
    &me,
    vec![
      MembershipEntry::new(addr(1), 4, 0),
      MembershipEntry::new(addr(2), 3, 0),
      MembershipEntry::new(addr(3), 1, 0),
    ],
    10,
  );
  assert_eq!(events, vec![Added(addr(2)), Added(addr(3))]);
  let events = table.merge(
    &me,
    vec![
      MembershipEntry::new(addr(2), 2, 12),
      MembershipEntry::new(addr(3), 5, 12),
      MembershipEntry::new(addr(4), 1, 12),
    ],
    12,
  );
  assert_eq!(events, vec![Added(addr(4))]);
  let expected = btreemap! {
    addr(2) => MembershipEntry::new(addr(2), 3, 10),
    addr(3) => MembershipEntry::new(addr(3), 5, 12),
    addr(4) => MembershipEntry::new(addr(4), 1, 12),
  };
  assert_eq!(table.entries, expected);
  assert!(table.get(&me).is_none());
}

#[test]
fn test_table_aging() {
  let me = addr(1);
  let mut table = MembershipTable::new();
  table.merge(&me, vec![MembershipEntry::new(addr(2), 1, 0)], 0);
  table.merge(&me, vec![MembershipEntry::new(addr(3), 1, 0)], 10);
  assert_eq!(table.fresh(10, 5), vec![MembershipEntry::new(addr(3), 1, 10)]);
  assert_eq!(table.suspects(10, 5), vec![addr(2)]);
  assert!(table.evict(19, 20).is_empty());
  assert_eq!(table.evict(20, 20), vec![Removed(addr(2))]);
  assert!(table.evict(21, 20).is_empty());
  assert_eq!(table.members(), im::ordset![addr(3)]);
}
