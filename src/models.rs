use crate::game::board::BoardView;
use crate::game::definitions::DefinitionsView;
use crate::game::letters::LettersView;
use crate::game::room::RoomSettings;
use crate::game::words::WordsView;
use crate::game::{Feedback, Winner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Transport connection id. Ephemeral: a reconnecting player gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
  pub fn new() -> Self {
    Self(Uuid::now_v7())
  }
}

impl Default for ConnectionId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for ConnectionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GameType {
  #[default]
  QuizBoard,
  LetterClaim,
  WordBuilder,
  WordDefinition,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
  #[default]
  Lobby,
  SelectingCategory, // Quiz board
  SelectingValue,    // Quiz board
  SelectingLetter,   // Letter claim
  Question,
  Feedback,
  Countdown, // Round modes
  RoundActive,
  RoundScoring,
  GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Team {
  Red,
  Blue,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Topology {
  /// 4-neighbour rectangular grid.
  #[default]
  Square,
  /// 6-neighbour honeycomb, odd rows shifted right.
  Hex,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WordCategory {
  Girl,
  Boy,
  Thing,
  Food,
  Animal,
  Place,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InternalMsg {
  StateUpdated,
  Log {
    who: String,
    text: String,
    time: String,
  },
}

/// Inbound frame: `{"room_id": "R1", "intent": {"type": "buzz"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMsg {
  #[serde(default)]
  pub room_id: String,
  pub intent: Intent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
  CreateRoom {
    #[serde(default)]
    game_type: GameType,
    player_name: String,
  },
  JoinRoom {
    player_name: String,
    #[serde(default)]
    game_type: Option<GameType>,
    #[serde(default)]
    token: Option<Uuid>,
  },
  RejoinRoom {
    player_name: String,
    #[serde(default)]
    token: Option<Uuid>,
  },
  UpdateSettings {
    settings: SettingsPatch,
  },
  StartGame,
  PickCategory {
    category: String,
  },
  PickLetter {
    cell_id: usize,
  },
  PickValue {
    value: i64,
  },
  Buzz,
  SubmitAnswer {
    answer: String,
  },
  AnswerQuestion {
    is_correct: bool,
  },
  SubmitRound {
    answers: HashMap<String, String>,
    #[serde(default)]
    finished: bool,
  },
  SubmitChoice {
    answer: String,
  },
  CloseFeedback,
  Forfeit,
  GetRoomStatus,
  LeaveRoom,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
  #[serde(default)]
  pub questions_per_category: Option<usize>,
  #[serde(default)]
  pub round_count: Option<u32>,
  #[serde(default)]
  pub luck_rate: Option<f64>,
  #[serde(default)]
  pub topology: Option<Topology>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
  Welcome {
    connection_id: ConnectionId,
  },
  Joined {
    room_id: String,
    player_name: String,
    token: Uuid,
  },
  Update(Box<RoomSnapshot>),
  Log {
    who: String,
    text: String,
    time: String,
  },
  Rejected {
    room_id: String,
    reason: String,
  },
}

#[derive(Debug, Serialize)]
pub struct RoomSummary {
  pub id: String,
  pub game_type: GameType,
  pub phase: Phase,
  pub player_count: usize,
}

/// Full room view broadcast after every change. Holds no answers of open questions
/// and no reconnection tokens.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
  pub id: String,
  pub game_type: GameType,
  pub status: Phase,
  pub players: Vec<PlayerView>,
  pub current_player_index: usize,
  pub creator_id: Option<ConnectionId>,
  pub timer: u32,
  pub settings: RoomSettings,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub feedback: Option<Feedback>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub winner: Option<Winner>,

  // Mode specific
  #[serde(skip_serializing_if = "Option::is_none")]
  pub board: Option<BoardView>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub letters: Option<LettersView>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub words: Option<WordsView>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub definitions: Option<DefinitionsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
  pub id: ConnectionId,
  pub name: String,
  pub score: i64,
  pub number: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub team: Option<Team>,
  pub is_online: bool,
}

/// A question as clients see it: never carries the answer.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
  pub id: String,
  pub category: String,
  pub value: i64,
  pub question: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
  pub is_answered: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn intent_frames_parse() {
    let msg: ClientMsg =
      serde_json::from_str(r#"{"room_id":"R1","intent":{"type":"pick_value","value":200}}"#)
        .unwrap();
    assert_eq!(msg.room_id, "R1");
    assert!(matches!(msg.intent, Intent::PickValue { value: 200 }));

    let msg: ClientMsg =
      serde_json::from_str(r#"{"room_id":"R1","intent":{"type":"buzz"}}"#).unwrap();
    assert!(matches!(msg.intent, Intent::Buzz));

    let msg: ClientMsg = serde_json::from_str(
      r#"{"room_id":"R1","intent":{"type":"join_room","player_name":"Sara","game_type":"letter_claim"}}"#,
    )
    .unwrap();
    match msg.intent {
      Intent::JoinRoom {
        player_name,
        game_type,
        token,
      } => {
        assert_eq!(player_name, "Sara");
        assert_eq!(game_type, Some(GameType::LetterClaim));
        assert!(token.is_none());
      }
      other => panic!("unexpected intent {other:?}"),
    }
  }

  #[test]
  fn server_frames_are_tagged() {
    let id = ConnectionId::new();
    let json = serde_json::to_value(ServerMsg::Welcome { connection_id: id }).unwrap();
    assert_eq!(json["type"], "welcome");
    assert_eq!(json["data"]["connection_id"], id.to_string());
  }

  #[test]
  fn phases_use_snake_case() {
    assert_eq!(Phase::SelectingCategory.to_string(), "selecting_category");
    assert_eq!(
      serde_json::to_value(Phase::RoundScoring).unwrap(),
      "round_scoring"
    );
    assert_eq!("word_builder".parse::<GameType>().unwrap(), GameType::WordBuilder);
  }
}
