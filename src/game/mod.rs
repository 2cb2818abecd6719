use crate::models::{ConnectionId, GameType, Phase, QuestionView, Team};
use serde::Serialize;
use strum::Display;

pub mod board;
pub mod buzzer;
pub mod definitions;
pub mod letters;
pub mod normalize;
pub mod registry;
pub mod room;
pub mod timer;
pub mod words;

pub use board::LuckEffect;

/// Why an intent was refused. A refused intent leaves the room untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
  #[error("room not found")]
  RoomNotFound,
  #[error("room already exists")]
  RoomExists,
  #[error("you are not in this room")]
  NotInRoom,
  #[error("not allowed while the room is in {0}")]
  WrongPhase(Phase),
  #[error("not your turn")]
  NotYourTurn,
  #[error("only the host can do that")]
  NotHost,
  #[error("not available in {0}")]
  WrongGameType(GameType),
  #[error("you already tried this question")]
  AlreadyAttempted,
  #[error("someone else holds the buzzer")]
  BuzzerTaken,
  #[error("buzz first")]
  NotBuzzed,
  #[error("unknown category")]
  UnknownCategory,
  #[error("no open question with that value")]
  UnknownValue,
  #[error("cell {0} is not available")]
  CellUnavailable(usize),
  #[error("that name is taken")]
  NameTaken,
  #[error("invalid player name")]
  InvalidName,
  #[error("no questions available")]
  NoQuestions,
  #[error("already answered this round")]
  AlreadyAnswered,
  #[error("unknown option")]
  UnknownOption,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
  pub id: String,
  pub category: String,
  pub value: i64,
  pub question: String,
  pub answer: String,
  pub options: Vec<String>,
  pub is_answered: bool,
}

impl Question {
  pub fn view(&self) -> QuestionView {
    QuestionView {
      id: self.id.clone(),
      category: self.category.clone(),
      value: self.value,
      question: self.question.clone(),
      options: self.options.clone(),
      is_answered: self.is_answered,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedbackKind {
  Correct,
  Wrong,
  AllWrong,
  TimeUp,
  Override,
  Luck,
}

/// Outcome shown between turns. `answer` is only set once the question is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
  pub kind: FeedbackKind,
  pub player_id: Option<ConnectionId>,
  pub points: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub answer: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub luck: Option<LuckEffect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Winner {
  Player {
    id: ConnectionId,
    name: String,
    score: i64,
  },
  Team {
    team: Team,
  },
}

pub fn generate_room_code() -> String {
  use rand::Rng;
  const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
  let mut rng = rand::thread_rng();
  (0..6)
    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
    .collect()
}

pub fn generate_random_password() -> String {
  use rand::Rng;
  use rand::distributions::Alphanumeric;
  rand::thread_rng()
    .sample_iter(&Alphanumeric)
    .take(20)
    .map(char::from)
    .collect()
}
