use std::collections::HashMap;

/// The single-node storage engine each replica writes to. Keys are matched exactly.
pub trait LocalStore {
  /// Inserts or overwrites `key`.
  fn create(&mut self, key: &str, value: &str) -> bool;
  fn read(&self, key: &str) -> Option<String>;
  fn update(&mut self, key: &str, value: &str) -> bool;
  /// Returns `false` if there was nothing to delete.
  fn delete(&mut self, key: &str) -> bool;
  /// Every record currently held, used to re-replicate after the ring changes.
  fn entries(&self) -> Vec<(String, String)>;
  fn len(&self) -> usize;
}

/// An in-memory [`LocalStore`]. It is always available, so creates and updates always succeed.
#[derive(Clone, Default, Debug)]
pub struct HashTable {
  table: HashMap<String, String>,
}
impl HashTable {
  pub fn new() -> HashTable {
    HashTable::default()
  }
}
impl LocalStore for HashTable {
  fn create(&mut self, key: &str, value: &str) -> bool {
    self.table.insert(key.to_string(), value.to_string());
    true
  }

  fn read(&self, key: &str) -> Option<String> {
    self.table.get(key).cloned()
  }

  fn update(&mut self, key: &str, value: &str) -> bool {
    self.table.insert(key.to_string(), value.to_string());
    true
  }

  fn delete(&mut self, key: &str) -> bool {
    self.table.remove(key).is_some()
  }

  fn entries(&self) -> Vec<(String, String)> {
    let mut v = self
      .table
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect::<Vec<_>>();
    v.sort();
    v
  }

  fn len(&self) -> usize {
    self.table.len()
  }
}

#[test]
fn test_hash_table() {
  let mut ht = HashTable::new();
  assert!(ht.create("a", "1"));
  assert!(ht.create("a", "2"));
  assert_eq!(ht.read("a"), Some("2".to_string()));
  assert!(ht.update("b", "3"));
  assert_eq!(
    ht.entries(),
    vec![("a".to_string(), "2".to_string()), ("b".to_string(), "3".to_string())]
  );
  assert!(ht.delete("a"));
  assert!(!ht.delete("a"));
  assert_eq!(ht.read("a"), None);
  assert_eq!(ht.len(), 1);
}
