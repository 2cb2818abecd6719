use crate::game::registry::SharedRoom;
use crate::game::room::Room;
use crate::game::{Rejection, generate_room_code};
use crate::models::{ClientMsg, ConnectionId, GameType, Intent, InternalMsg, ServerMsg};
use crate::state::AppState;
use std::time::Instant;
use tokio::sync::broadcast;

const ROOM_CODE_ATTEMPTS: usize = 8;

/// What the connection should do with its room subscription after an intent.
pub enum Membership {
  Keep,
  Enter {
    room_id: String,
    rx: broadcast::Receiver<InternalMsg>,
  },
  Leave,
}

/// Frames for the sender plus the membership change, if any.
pub struct Dispatched {
  pub replies: Vec<ServerMsg>,
  pub membership: Membership,
}

impl Dispatched {
  fn reply(msg: ServerMsg) -> Self {
    Self {
      replies: vec![msg],
      membership: Membership::Keep,
    }
  }

  fn rejected(room_id: &str, err: Rejection) -> Self {
    Self::reply(ServerMsg::Rejected {
      room_id: room_id.to_string(),
      reason: err.to_string(),
    })
  }

  fn none() -> Self {
    Self {
      replies: vec![],
      membership: Membership::Keep,
    }
  }
}

/// Runs one inbound intent for `conn`, currently a member of `joined` (if any).
pub async fn dispatch(
  state: &AppState,
  conn: ConnectionId,
  joined: Option<&str>,
  msg: ClientMsg,
) -> Dispatched {
  let ClientMsg { room_id, intent } = msg;
  let target = if room_id.is_empty() {
    joined.unwrap_or_default().to_string()
  } else {
    room_id
  };

  let result = match intent {
    Intent::CreateRoom {
      game_type,
      player_name,
    } => create_room(state, conn, joined, &target, game_type, &player_name).await,
    Intent::JoinRoom {
      player_name,
      game_type,
      token,
    } => {
      if target.is_empty() {
        Err(Rejection::RoomNotFound)
      } else {
        let room = room_for_join(state, &target, game_type.unwrap_or_default()).await;
        enter(state, conn, joined, &target, room, &player_name, token).await
      }
    }
    Intent::RejoinRoom { player_name, token } => match state.rooms.get(&target) {
      Some(room) => enter(state, conn, joined, &target, room, &player_name, token).await,
      None => Err(Rejection::RoomNotFound),
    },
    Intent::GetRoomStatus => match state.rooms.get(&target) {
      Some(room) => Ok(Dispatched::reply(ServerMsg::Update(Box::new(
        room.read().await.snapshot(),
      )))),
      None => Err(Rejection::RoomNotFound),
    },
    Intent::LeaveRoom => leave(state, conn, &target).await,
    intent => act(state, conn, &target, intent).await,
  };

  result.unwrap_or_else(|err| {
    tracing::debug!(room_id = %target, %conn, reason = %err, "intent rejected");
    Dispatched::rejected(&target, err)
  })
}

/// The room to join, created with a snapshot of the pool when it does not exist yet.
async fn room_for_join(state: &AppState, id: &str, game_type: GameType) -> SharedRoom {
  if let Some(room) = state.rooms.get(id) {
    return room;
  }
  let questions = state.pool.read().await.questions_for(game_type);
  state.rooms.get_or_insert_with(id, || {
    Room::new(id.to_string(), game_type, questions, state.config.room_settings())
  })
}

async fn create_room(
  state: &AppState,
  conn: ConnectionId,
  joined: Option<&str>,
  requested: &str,
  game_type: GameType,
  player_name: &str,
) -> Result<Dispatched, Rejection> {
  let questions = state.pool.read().await.questions_for(game_type);
  let settings = state.config.room_settings();

  let (room_id, room) = if requested.is_empty() {
    let mut created = None;
    for _ in 0..ROOM_CODE_ATTEMPTS {
      let id = generate_room_code();
      let room = Room::new(id.clone(), game_type, questions.clone(), settings.clone());
      if let Ok(shared) = state.rooms.insert(room) {
        created = Some((id, shared));
        break;
      }
    }
    created.ok_or(Rejection::RoomExists)?
  } else {
    let room = Room::new(requested.to_string(), game_type, questions, settings);
    (requested.to_string(), state.rooms.insert(room)?)
  };

  let entered = enter(state, conn, joined, &room_id, room, player_name, None).await;
  if entered.is_err() {
    state.rooms.remove_if_empty(&room_id);
  }
  entered
}

/// Joins or re-binds `conn` in `room`, leaving any other room first.
async fn enter(
  state: &AppState,
  conn: ConnectionId,
  joined: Option<&str>,
  room_id: &str,
  room: SharedRoom,
  player_name: &str,
  token: Option<uuid::Uuid>,
) -> Result<Dispatched, Rejection> {
  let (receipt, rx, snapshot) = {
    let mut guard = room.write().await;
    let rx = guard.tx.subscribe();
    let receipt = match guard.join(conn, player_name, token, Instant::now()) {
      Ok(receipt) => receipt,
      Err(err) => {
        let empty = guard.is_empty();
        drop(guard);
        if empty {
          state.rooms.remove_if_empty(room_id);
        }
        return Err(err);
      }
    };
    (receipt, rx, guard.snapshot())
  };
  state.rooms.reattach(room_id, &room);

  if let Some(old) = joined.filter(|old| *old != room_id) {
    leave_quietly(state, conn, old).await;
  }

  Ok(Dispatched {
    replies: vec![
      ServerMsg::Joined {
        room_id: room_id.to_string(),
        player_name: receipt.name,
        token: receipt.token,
      },
      ServerMsg::Update(Box::new(snapshot)),
    ],
    membership: Membership::Enter {
      room_id: room_id.to_string(),
      rx,
    },
  })
}

async fn leave(state: &AppState, conn: ConnectionId, room_id: &str) -> Result<Dispatched, Rejection> {
  let room = state.rooms.get(room_id).ok_or(Rejection::RoomNotFound)?;
  room.write().await.leave(conn)?;
  state.rooms.remove_if_empty(room_id);
  Ok(Dispatched {
    replies: vec![],
    membership: Membership::Leave,
  })
}

async fn leave_quietly(state: &AppState, conn: ConnectionId, room_id: &str) {
  if let Err(err) = leave(state, conn, room_id).await {
    tracing::debug!(room_id, %conn, reason = %err, "nothing to leave");
  }
}

/// Intents handled entirely by the room's state machine.
async fn act(
  state: &AppState,
  conn: ConnectionId,
  room_id: &str,
  intent: Intent,
) -> Result<Dispatched, Rejection> {
  let room = state.rooms.get(room_id).ok_or(Rejection::RoomNotFound)?;
  let mut room = room.write().await;
  match intent {
    Intent::UpdateSettings { settings } => room.update_settings(conn, &settings),
    Intent::StartGame => room.start(conn),
    Intent::PickCategory { category } => room.pick_category(conn, &category),
    Intent::PickLetter { cell_id } => room.pick_letter(conn, cell_id),
    Intent::PickValue { value } => room.pick_value(conn, value),
    Intent::Buzz => room.buzz(conn),
    Intent::SubmitAnswer { answer } => room.submit_answer(conn, &answer),
    Intent::AnswerQuestion { is_correct } => room.answer_question(conn, is_correct),
    Intent::SubmitRound { answers, finished } => room.submit_round(conn, &answers, finished),
    Intent::SubmitChoice { answer } => room.submit_choice(conn, &answer),
    Intent::CloseFeedback => room.close_feedback(conn),
    Intent::Forfeit => room.forfeit(conn),
    Intent::CreateRoom { .. }
    | Intent::JoinRoom { .. }
    | Intent::RejoinRoom { .. }
    | Intent::GetRoomStatus
    | Intent::LeaveRoom => return Ok(Dispatched::none()),
  }?;
  Ok(Dispatched::none())
}

/// Socket closed: the player goes offline and keeps their seat for the grace period.
pub async fn disconnect(state: &AppState, room_id: &str, conn: ConnectionId) {
  if let Some(room) = state.rooms.get(room_id) {
    room.write().await.disconnect(conn, Instant::now());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::conf::Config;
  use crate::models::Phase;
  use crate::pool::{PoolEntry, QuestionPool};
  use clap::Parser;
  use std::sync::Arc;

  fn state() -> AppState {
    let entries: Vec<PoolEntry> = serde_json::from_str(
      r#"[
        {"id": "1", "category": "Science", "value": 100, "question": "H2O?", "answer": "water"},
        {"id": "2", "category": "Science", "value": 200, "question": "Fe?", "answer": "iron"}
      ]"#,
    )
    .unwrap();
    AppState::new(
      Config::parse_from(["party-quiz"]),
      QuestionPool::from_entries("unused.json", entries),
      "pw".into(),
    )
  }

  fn msg(room_id: &str, intent: &str) -> ClientMsg {
    serde_json::from_str(&format!(r#"{{"room_id":"{room_id}","intent":{intent}}}"#)).unwrap()
  }

  fn joined_token(d: &Dispatched) -> uuid::Uuid {
    match &d.replies[0] {
      ServerMsg::Joined { token, .. } => *token,
      other => panic!("expected joined, got {other:?}"),
    }
  }

  fn rejection(d: &Dispatched) -> String {
    match &d.replies[..] {
      [ServerMsg::Rejected { reason, .. }] => reason.clone(),
      other => panic!("expected a rejection, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn create_generates_code_and_enters() {
    let state = state();
    let host = ConnectionId::new();
    let d = dispatch(
      &state,
      host,
      None,
      msg("", r#"{"type":"create_room","player_name":"Sara"}"#),
    )
    .await;
    let Membership::Enter { room_id, .. } = &d.membership else {
      panic!("expected to enter a room");
    };
    assert_eq!(room_id.len(), 6);
    let room = state.rooms.get(room_id).unwrap();
    assert!(room.read().await.is_host(host));
    assert!(matches!(d.replies[1], ServerMsg::Update(_)));
  }

  #[tokio::test]
  async fn explicit_create_conflicts() {
    let state = state();
    let create = r#"{"type":"create_room","player_name":"Sara"}"#;
    dispatch(&state, ConnectionId::new(), None, msg("R1", create)).await;
    let d = dispatch(&state, ConnectionId::new(), None, msg("R1", create)).await;
    assert_eq!(rejection(&d), Rejection::RoomExists.to_string());
  }

  #[tokio::test]
  async fn join_creates_on_first_use_and_host_starts() {
    let state = state();
    let (sara, omar) = (ConnectionId::new(), ConnectionId::new());
    dispatch(&state, sara, None, msg("R1", r#"{"type":"join_room","player_name":"Sara"}"#)).await;
    dispatch(&state, omar, None, msg("R1", r#"{"type":"join_room","player_name":"Omar"}"#)).await;

    let d = dispatch(&state, omar, Some("R1"), msg("", r#"{"type":"start_game"}"#)).await;
    assert_eq!(rejection(&d), Rejection::NotHost.to_string());

    let d = dispatch(&state, sara, Some("R1"), msg("", r#"{"type":"start_game"}"#)).await;
    assert!(d.replies.is_empty());
    let room = state.rooms.get("R1").unwrap();
    assert_eq!(room.read().await.phase, Phase::SelectingCategory);
  }

  #[tokio::test]
  async fn join_waits_for_pool_edits_before_creating_room() {
    let state = Arc::new(state());
    let guard = state.pool.write().await;
    let sara = ConnectionId::new();
    let joining = {
      let state = state.clone();
      tokio::spawn(async move {
        dispatch(&state, sara, None, msg("R1", r#"{"type":"join_room","player_name":"Sara"}"#)).await
      })
    };
    tokio::task::yield_now().await;
    drop(guard);
    let d = joining.await.unwrap();
    assert!(matches!(d.membership, Membership::Enter { .. }));

    let d = dispatch(&state, sara, Some("R1"), msg("", r#"{"type":"start_game"}"#)).await;
    assert!(d.replies.is_empty());
    let room = state.rooms.get("R1").unwrap();
    assert_eq!(room.read().await.phase, Phase::SelectingCategory);
  }

  #[tokio::test]
  async fn status_of_missing_room_is_rejected() {
    let state = state();
    let d = dispatch(&state, ConnectionId::new(), None, msg("NOPE", r#"{"type":"get_room_status"}"#)).await;
    assert_eq!(rejection(&d), Rejection::RoomNotFound.to_string());
    let d = dispatch(
      &state,
      ConnectionId::new(),
      None,
      msg("NOPE", r#"{"type":"rejoin_room","player_name":"Sara"}"#),
    )
    .await;
    assert_eq!(rejection(&d), Rejection::RoomNotFound.to_string());
    assert!(state.rooms.is_empty());
  }

  #[tokio::test]
  async fn invalid_name_leaves_no_room_behind() {
    let state = state();
    let d = dispatch(&state, ConnectionId::new(), None, msg("R1", r#"{"type":"join_room","player_name":"   "}"#)).await;
    assert_eq!(rejection(&d), Rejection::InvalidName.to_string());
    assert!(state.rooms.is_empty());
  }

  #[tokio::test]
  async fn leave_drops_empty_room() {
    let state = state();
    let sara = ConnectionId::new();
    dispatch(&state, sara, None, msg("R1", r#"{"type":"join_room","player_name":"Sara"}"#)).await;
    let d = dispatch(&state, sara, Some("R1"), msg("", r#"{"type":"leave_room"}"#)).await;
    assert!(matches!(d.membership, Membership::Leave));
    assert!(state.rooms.is_empty());
  }

  #[tokio::test]
  async fn switching_rooms_leaves_the_old_one() {
    let state = state();
    let sara = ConnectionId::new();
    dispatch(&state, sara, None, msg("R1", r#"{"type":"join_room","player_name":"Sara"}"#)).await;
    dispatch(&state, sara, Some("R1"), msg("R2", r#"{"type":"join_room","player_name":"Sara"}"#)).await;
    assert!(state.rooms.get("R1").is_none());
    assert!(state.rooms.get("R2").is_some());
  }

  #[tokio::test]
  async fn rejoin_with_token_after_disconnect() {
    let state = state();
    let first = ConnectionId::new();
    let d = dispatch(&state, first, None, msg("R1", r#"{"type":"join_room","player_name":"Sara"}"#)).await;
    let token = joined_token(&d);
    disconnect(&state, "R1", first).await;

    let second = ConnectionId::new();
    let d = dispatch(
      &state,
      second,
      None,
      msg("R1", &format!(r#"{{"type":"rejoin_room","player_name":"Sara","token":"{token}"}}"#)),
    )
    .await;
    assert_eq!(joined_token(&d), token);
    let room = state.rooms.get("R1").unwrap();
    let room = room.read().await;
    assert_eq!(room.players.len(), 1);
    assert_eq!(room.players[0].id, second);
    assert!(room.players[0].connected);
  }
}
