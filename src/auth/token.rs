use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const TOKEN_VALIDITY_SECONDS: i64 = 60 * 60 * 12; // 12 hours

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  pub sub: String,
  pub iat: i64,
  pub exp: usize,
}

/// Signs admin session tokens with a key that lives as long as the process.
pub struct TokenManager {
  encoding_key: EncodingKey,
  decoding_key: DecodingKey,
}

impl Default for TokenManager {
  fn default() -> Self {
    Self::new()
  }
}

impl TokenManager {
  pub fn new() -> Self {
    let mut key_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key_bytes);

    let encoding_key = EncodingKey::from_secret(&key_bytes);
    let decoding_key = DecodingKey::from_secret(&key_bytes);

    Self {
      encoding_key,
      decoding_key,
    }
  }

  pub fn generate_token(&self, subject: &str) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
      sub: subject.to_string(),
      iat: now.timestamp(),
      exp: (now + Duration::seconds(TOKEN_VALIDITY_SECONDS))
        .timestamp()
        .try_into()?,
    };
    Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
  }

  pub fn parse_token(&self, token: &str) -> Option<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &self.decoding_key, &validation)
      .ok()
      .map(|data| data.claims)
  }
}
