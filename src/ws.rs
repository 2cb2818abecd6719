use crate::dispatch::{self, Membership};
use crate::models::{ClientMsg, ConnectionId, InternalMsg, ServerMsg};
use crate::state::AppState;
use axum::{
  extract::{
    State,
    ws::{Message, WebSocket, WebSocketUpgrade},
  },
  response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::{
  sync::Arc,
  time::{Duration, Instant},
};
use tokio::sync::broadcast::{self, error::RecvError};

pub async fn ws_handler(
  State(state): State<Arc<AppState>>,
  ws: WebSocketUpgrade,
) -> impl IntoResponse {
  ws.on_upgrade(move |socket| handle_socket(socket, state))
}

struct Joined {
  room_id: String,
  rx: broadcast::Receiver<InternalMsg>,
}

/// Waits on the room subscription, or forever when not in a room.
async fn next_event(joined: &mut Option<Joined>) -> Result<InternalMsg, RecvError> {
  match joined {
    Some(j) => j.rx.recv().await,
    None => std::future::pending().await,
  }
}

fn encode(msg: &ServerMsg) -> Option<Message> {
  match serde_json::to_string(msg) {
    Ok(json) => Some(Message::text(json)),
    Err(e) => {
      tracing::error!("failed to encode frame: {e}");
      None
    }
  }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
  let (mut sender, mut receiver) = socket.split();
  let conn = ConnectionId::new();
  tracing::debug!(%conn, "socket connected");

  const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
  const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);
  let mut heartbeat_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
  heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

  if let Some(frame) = encode(&ServerMsg::Welcome { connection_id: conn }) {
    if sender.send(frame).await.is_err() {
      return;
    }
  }

  let mut joined: Option<Joined> = None;
  let mut last_heartbeat = Instant::now();

  loop {
    tokio::select! {
      inbound = receiver.next() => {
        let Some(Ok(msg)) = inbound else { break };
        last_heartbeat = Instant::now();
        match msg {
          Message::Text(text) => {
            let msg = match serde_json::from_str::<ClientMsg>(&text) {
              Ok(msg) => msg,
              Err(e) => {
                tracing::debug!(%conn, "malformed frame: {e}");
                continue;
              }
            };
            let current = joined.as_ref().map(|j| j.room_id.clone());
            let outcome = dispatch::dispatch(&state, conn, current.as_deref(), msg).await;
            match outcome.membership {
              Membership::Keep => {}
              Membership::Enter { room_id, rx } => joined = Some(Joined { room_id, rx }),
              Membership::Leave => joined = None,
            }
            let mut closed = false;
            for reply in &outcome.replies {
              if let Some(frame) = encode(reply) {
                if sender.send(frame).await.is_err() {
                  closed = true;
                  break;
                }
              }
            }
            if closed { break; }
          },
          Message::Pong(_) => {},
          Message::Close(_) => break,
          _ => {}
        }
      }
      event = next_event(&mut joined) => {
        let out = match event {
          Ok(InternalMsg::StateUpdated) | Err(RecvError::Lagged(_)) => {
            let Some(room) = joined.as_ref().and_then(|j| state.rooms.get(&j.room_id)) else {
              joined = None;
              continue;
            };
            let snapshot = room.read().await.snapshot();
            ServerMsg::Update(Box::new(snapshot))
          }
          Ok(InternalMsg::Log { who, text, time }) => ServerMsg::Log { who, text, time },
          Err(RecvError::Closed) => {
            joined = None;
            continue;
          }
        };
        if let Some(frame) = encode(&out) {
          if sender.send(frame).await.is_err() { break; }
        }
      }
      // Heartbeat check using interval to avoid reset on other events
      _ = heartbeat_interval.tick() => {
        if Instant::now().duration_since(last_heartbeat) > CLIENT_TIMEOUT {
          tracing::debug!(%conn, "client timed out");
          break;
        }
        let _ = sender.send(Message::Ping(vec![].into())).await;
      }
    }
  }

  // Cleanup on disconnect
  if let Some(j) = joined {
    dispatch::disconnect(&state, &j.room_id, conn).await;
  }
  tracing::debug!(%conn, "socket closed");
}
