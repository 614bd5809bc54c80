use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

/// Username to password table, read once at startup and immutable afterwards.
/// Each session holds a shared reference; no synchronisation is needed.
#[derive(Debug, Default)]
pub struct Credentials {
  users: HashMap<String, String>,
}

impl Credentials {
  /// Reads the credentials file. Each non-empty line is
  /// `<username> <password>`; lines missing either field are skipped.
  /// A missing file leaves the table empty, so every login fails.
  pub fn load(path: &Path) -> Self {
    let contents = match std::fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(err) => {
        warn!("couldn't read credentials file {}: {err}", path.display());
        return Self::default();
      }
    };
    Self::parse(&contents)
  }

  fn parse(contents: &str) -> Self {
    let mut users = HashMap::new();
    for line in contents.lines() {
      let mut fields = line.split_whitespace();
      if let (Some(user), Some(password)) = (fields.next(), fields.next()) {
        users.insert(user.to_string(), password.to_string());
      }
    }
    Self { users }
  }

  pub fn from_pairs<I>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (String, String)>,
  {
    Self {
      users: pairs.into_iter().collect(),
    }
  }

  /// Byte-for-byte password check. The comparison is constant-time over the
  /// stored password so a mismatch position cannot be probed.
  pub fn verify(&self, username: &str, password: &str) -> bool {
    match self.users.get(username) {
      Some(stored) => constant_time_eq(stored.as_bytes(), password.as_bytes()),
      None => false,
    }
  }

  pub fn len(&self) -> usize {
    self.users.len()
  }

  pub fn is_empty(&self) -> bool {
    self.users.is_empty()
  }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  let mut diff = 0u8;
  for (x, y) in a.iter().zip(b) {
    diff |= x ^ y;
  }
  diff == 0
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn parses_space_separated_lines() {
    let credentials = Credentials::parse("admin admin\nalice secret\n\nbroken\n");
    assert_eq!(credentials.len(), 2);
    assert!(credentials.verify("admin", "admin"));
    assert!(credentials.verify("alice", "secret"));
    assert!(!credentials.verify("broken", ""));
  }

  #[test]
  fn rejects_wrong_password_and_unknown_user() {
    let credentials = Credentials::parse("admin admin\n");
    assert!(!credentials.verify("admin", "wrong"));
    assert!(!credentials.verify("admin", "admi"));
    assert!(!credentials.verify("nobody", "admin"));
  }

  #[test]
  fn passwords_are_case_sensitive() {
    let credentials = Credentials::parse("admin Secret\n");
    assert!(credentials.verify("admin", "Secret"));
    assert!(!credentials.verify("admin", "secret"));
  }

  #[test]
  fn loads_from_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "admin admin").unwrap();
    let credentials = Credentials::load(file.path());
    assert!(credentials.verify("admin", "admin"));
  }

  #[test]
  fn missing_file_yields_an_empty_table() {
    let credentials = Credentials::load(Path::new("/nonexistent/userfile.txt"));
    assert!(credentials.is_empty());
    assert!(!credentials.verify("admin", "admin"));
  }

  #[test]
  fn constant_time_eq_handles_length_mismatch() {
    assert!(constant_time_eq(b"abc", b"abc"));
    assert!(!constant_time_eq(b"abc", b"abd"));
    assert!(!constant_time_eq(b"abc", b"abcd"));
    assert!(constant_time_eq(b"", b""));
  }
}
