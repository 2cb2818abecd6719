use crate::game::room::RoomSettings;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Party quiz room server.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct Config {
  /// Address to listen on
  #[arg(long, env = "PARTY_ADDR", default_value = "0.0.0.0:3001")]
  pub addr: SocketAddr,

  /// Question pool file (JSON array)
  #[arg(long, env = "PARTY_POOL", default_value = "questions.json")]
  pub pool: PathBuf,

  /// Admin login name
  #[arg(long, env = "PARTY_ADMIN_USER", default_value = "admin")]
  pub admin_user: String,

  /// Admin password; a random one is generated when unset
  #[arg(long, env = "PARTY_ADMIN_PASSWORD", hide_env_values = true)]
  pub admin_password: Option<String>,

  /// Seconds an offline player keeps their seat
  #[arg(long, env = "PARTY_RECONNECT_GRACE_SECS", default_value_t = 30)]
  pub reconnect_grace_secs: u64,

  /// Override for the question timer
  #[arg(long, env = "PARTY_QUESTION_SECS")]
  pub question_secs: Option<u32>,

  /// Override for the word-builder round length
  #[arg(long, env = "PARTY_WORD_ROUND_SECS")]
  pub word_round_secs: Option<u32>,
}

impl Config {
  pub fn load() -> Self {
    Self::parse()
  }

  pub fn reconnect_grace(&self) -> Duration {
    Duration::from_secs(self.reconnect_grace_secs)
  }

  /// Settings every new room starts from.
  pub fn room_settings(&self) -> RoomSettings {
    let mut settings = RoomSettings::default();
    if let Some(secs) = self.question_secs {
      settings.timing.question_secs = secs.max(1);
    }
    if let Some(secs) = self.word_round_secs {
      settings.timing.word_round_secs = secs.max(1);
    }
    settings
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = Config::parse_from(["party-quiz"]);
    assert_eq!(config.addr.port(), 3001);
    assert_eq!(config.reconnect_grace(), Duration::from_secs(30));
    assert_eq!(config.room_settings(), RoomSettings::default());
  }

  #[test]
  fn timer_overrides() {
    let config = Config::parse_from(["party-quiz", "--question-secs", "20", "--word-round-secs", "0"]);
    let settings = config.room_settings();
    assert_eq!(settings.timing.question_secs, 20);
    assert_eq!(settings.timing.word_round_secs, 1);
  }
}
