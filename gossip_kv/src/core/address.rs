use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The identity of a process in the cluster, which doubles as its network address on the
/// [`Transport`](crate::core::Transport).
///
/// Two processes never share an [`Address`]. The textual form is `id:port`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
pub struct Address {
  /// The numeric identifier of the process.
  pub id: u32,
  /// The port the process receives on.
  pub port: u16,
}
impl Address {
  /// Creates a new [`Address`]
  pub const fn new(id: u32, port: u16) -> Address {
    Address { id: id, port: port }
  }
}
impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.id, self.port)
  }
}
impl FromStr for Address {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (id, port) = s
      .split_once(':')
      .ok_or_else(|| format!("missing ':' in address {:?}", s))?;
    let id = id.parse().map_err(|e| format!("bad id in {:?}: {}", s, e))?;
    let port = port.parse().map_err(|e| format!("bad port in {:?}: {}", s, e))?;
    Ok(Address::new(id, port))
  }
}
impl Default for Address {
  fn default() -> Self {
    Address::new(0, 0)
  }
}

#[test]
fn test_address_text_form() {
  let addr = Address::new(17, 0);
  assert_eq!(addr.to_string(), "17:0");
  assert_eq!("17:0".parse::<Address>(), Ok(addr));
  assert!("17".parse::<Address>().is_err());
  assert!("x:0".parse::<Address>().is_err());
}
