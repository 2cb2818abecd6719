pub mod token;

use serde::Deserialize;

/// Body of `POST /api/admin/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
  pub username: String,
  pub password: String,
}

/// The single admin account, taken from configuration.
#[derive(Clone)]
pub struct Admin {
  pub name: String,
  password: String,
}

impl Admin {
  pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      password: password.into(),
    }
  }

  pub fn verify(&self, credentials: &Credentials) -> bool {
    constant_time_eq(credentials.username.as_bytes(), self.name.as_bytes())
      & constant_time_eq(credentials.password.as_bytes(), self.password.as_bytes())
  }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
  if a.len() != b.len() {
    return false;
  }
  a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
