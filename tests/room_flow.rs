use axum::body::Body;
use axum::http::{Request, StatusCode};
use clap::Parser;
use party_quiz::conf::Config;
use party_quiz::dispatch::{Dispatched, Membership, dispatch};
use party_quiz::models::{ClientMsg, ConnectionId, InternalMsg, Phase, ServerMsg};
use party_quiz::pool::{PoolEntry, QuestionPool};
use party_quiz::routes;
use party_quiz::state::AppState;
use std::sync::Arc;
use tower::ServiceExt;

fn state() -> Arc<AppState> {
  let entries: Vec<PoolEntry> = serde_json::from_str(
    r#"[
      {"id": "1", "category": "Science", "value": 100, "question": "What is H2O?", "answer": "Water"},
      {"id": "2", "game": "word_definition", "question": "الغيث", "answer": "المطر"}
    ]"#,
  )
  .unwrap();
  Arc::new(AppState::new(
    Config::parse_from(["party-quiz"]),
    QuestionPool::from_entries("unused.json", entries),
    "pw".into(),
  ))
}

async fn send(state: &AppState, conn: ConnectionId, joined: Option<&str>, room: &str, intent: &str) -> Dispatched {
  let msg: ClientMsg =
    serde_json::from_str(&format!(r#"{{"room_id":"{room}","intent":{intent}}}"#)).unwrap();
  dispatch(state, conn, joined, msg).await
}

async fn status(state: &AppState, room: &str) -> serde_json::Value {
  let d = send(state, ConnectionId::new(), None, room, r#"{"type":"get_room_status"}"#).await;
  match &d.replies[..] {
    [ServerMsg::Update(snapshot)] => serde_json::to_value(snapshot).unwrap(),
    other => panic!("expected a snapshot, got {other:?}"),
  }
}

fn accepted(d: &Dispatched) {
  assert!(
    !d.replies.iter().any(|r| matches!(r, ServerMsg::Rejected { .. })),
    "intent rejected: {:?}",
    d.replies
  );
}

#[tokio::test]
async fn quiz_board_game_to_the_end() {
  let state = state();
  let (sara, omar) = (ConnectionId::new(), ConnectionId::new());

  let d = send(&state, sara, None, "", r#"{"type":"create_room","player_name":"Sara"}"#).await;
  let Membership::Enter { room_id, mut rx } = d.membership else {
    panic!("host did not enter the room");
  };
  let room = room_id.as_str();
  accepted(&send(&state, omar, None, room, r#"{"type":"join_room","player_name":"Omar"}"#).await);
  assert!(matches!(rx.recv().await, Ok(InternalMsg::Log { .. }) | Ok(InternalMsg::StateUpdated)));

  accepted(
    &send(
      &state,
      sara,
      Some(room),
      "",
      r#"{"type":"update_settings","settings":{"luck_rate":0.0}}"#,
    )
    .await,
  );
  accepted(&send(&state, sara, Some(room), "", r#"{"type":"start_game"}"#).await);
  assert_eq!(status(&state, room).await["status"], "selecting_category");

  let d = send(&state, omar, Some(room), "", r#"{"type":"pick_category","category":"Science"}"#).await;
  assert!(matches!(d.replies[..], [ServerMsg::Rejected { .. }]));

  accepted(&send(&state, sara, Some(room), "", r#"{"type":"pick_category","category":"Science"}"#).await);
  accepted(&send(&state, sara, Some(room), "", r#"{"type":"pick_value","value":100}"#).await);

  let snapshot = status(&state, room).await;
  assert_eq!(snapshot["status"], "question");
  assert!(snapshot["timer"].as_u64().unwrap() > 0);
  assert!(!snapshot.to_string().contains("Water"));

  accepted(&send(&state, omar, Some(room), "", r#"{"type":"buzz"}"#).await);
  let d = send(&state, sara, Some(room), "", r#"{"type":"buzz"}"#).await;
  assert!(matches!(d.replies[..], [ServerMsg::Rejected { .. }]));
  accepted(&send(&state, omar, Some(room), "", r#"{"type":"submit_answer","answer":"  water "}"#).await);

  let snapshot = status(&state, room).await;
  assert_eq!(snapshot["status"], "feedback");
  assert_eq!(snapshot["players"][1]["score"], 100);

  accepted(&send(&state, sara, Some(room), "", r#"{"type":"close_feedback"}"#).await);
  let snapshot = status(&state, room).await;
  assert_eq!(snapshot["status"], "game_over");
  assert_eq!(snapshot["winner"]["kind"], "player");
  assert_eq!(snapshot["winner"]["name"], "Omar");
}

#[tokio::test]
async fn rooms_show_up_over_http() {
  let state = state();
  let sara = ConnectionId::new();
  send(
    &state,
    sara,
    None,
    "DEFS",
    r#"{"type":"create_room","game_type":"word_definition","player_name":"Sara"}"#,
  )
  .await;

  let app = routes::app(state.clone());
  let response = app
    .clone()
    .oneshot(Request::builder().uri("/api/rooms").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
  let rooms: serde_json::Value = serde_json::from_slice(&body).unwrap();
  assert_eq!(rooms[0]["id"], "DEFS");
  assert_eq!(rooms[0]["game_type"], "word_definition");
  assert_eq!(rooms[0]["player_count"], 1);

  let response = app
    .oneshot(Request::builder().uri("/api/rooms/DEFS").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
  let snapshot: serde_json::Value = serde_json::from_slice(&body).unwrap();
  assert_eq!(snapshot["status"], "lobby");
  assert!(snapshot["players"][0].get("token").is_none());
}

#[tokio::test]
async fn leaving_last_player_closes_room() {
  let state = state();
  let sara = ConnectionId::new();
  send(&state, sara, None, "R9", r#"{"type":"join_room","player_name":"Sara"}"#).await;
  assert_eq!(state.rooms.len(), 1);
  let d = send(&state, sara, Some("R9"), "", r#"{"type":"leave_room"}"#).await;
  assert!(matches!(d.membership, Membership::Leave));
  assert!(state.rooms.is_empty());
  let d = send(&state, sara, None, "R9", r#"{"type":"get_room_status"}"#).await;
  assert!(matches!(d.replies[..], [ServerMsg::Rejected { .. }]));
}

#[tokio::test]
async fn forfeit_hands_the_win_to_the_other_player() {
  let state = state();
  let (sara, omar) = (ConnectionId::new(), ConnectionId::new());
  send(&state, sara, None, "F1", r#"{"type":"join_room","player_name":"Sara"}"#).await;
  send(&state, omar, None, "F1", r#"{"type":"join_room","player_name":"Omar"}"#).await;
  accepted(&send(&state, sara, Some("F1"), "", r#"{"type":"start_game"}"#).await);
  accepted(&send(&state, sara, Some("F1"), "", r#"{"type":"forfeit"}"#).await);

  let snapshot = status(&state, "F1").await;
  assert_eq!(snapshot["status"], Phase::GameOver.to_string());
  assert_eq!(snapshot["winner"]["name"], "Omar");
}
