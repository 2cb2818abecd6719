use crate::{
  auth::Credentials, error::AppError, middleware::admin_middleware, pool::PoolEntry,
  state::AppState, ws,
};
use axum::{
  Json, Router,
  extract::{Path, State},
  http::{Method, StatusCode},
  middleware,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn app(state: Arc<AppState>) -> Router {
  let admin_routes = Router::new()
    .route("/questions", get(list_questions).post(create_question))
    .route(
      "/questions/{id}",
      get(get_question).put(update_question).delete(delete_question),
    )
    .route_layer(middleware::from_fn_with_state(
      state.clone(),
      admin_middleware,
    ));

  let cors = CorsLayer::new()
    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
    .allow_origin(Any)
    .allow_headers(Any);

  Router::new()
    .route("/health", get(|| async { "OK" }))
    .route("/ws", get(ws::ws_handler))
    .route("/api/rooms", get(list_rooms))
    .route("/api/rooms/{id}", get(get_room))
    .route("/api/admin/login", post(admin_login))
    .nest("/api/admin", admin_routes)
    .layer(
      ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new().deflate(true).gzip(true))
        .layer(cors),
    )
    .with_state(state)
}

async fn list_rooms(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.rooms.summaries().await)
}

async fn get_room(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
  match state.rooms.get(&id) {
    Some(room) => Json(room.read().await.snapshot()).into_response(),
    None => (StatusCode::NOT_FOUND, "Room not found").into_response(),
  }
}

#[derive(Serialize)]
struct LoginResponse {
  token: String,
}

async fn admin_login(
  State(state): State<Arc<AppState>>,
  Json(credentials): Json<Credentials>,
) -> Result<Response, AppError> {
  if !state.admin.verify(&credentials) {
    tracing::warn!(username = %credentials.username, "failed admin login");
    return Ok((StatusCode::UNAUTHORIZED, "Invalid credentials").into_response());
  }
  let token = state.token_manager.generate_token(&state.admin.name)?;
  tracing::info!(username = %credentials.username, "admin logged in");
  Ok(Json(LoginResponse { token }).into_response())
}

async fn list_questions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.pool.read().await.list().to_vec())
}

async fn get_question(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
  match state.pool.read().await.get(&id) {
    Some(entry) => Json(entry.clone()).into_response(),
    None => StatusCode::NOT_FOUND.into_response(),
  }
}

async fn create_question(
  State(state): State<Arc<AppState>>,
  Json(entry): Json<PoolEntry>,
) -> Result<Response, AppError> {
  let created = state
    .pool
    .write()
    .await
    .edit(|pool| pool.insert(entry).clone())
    .await?;
  tracing::info!(id = %created.id, game = %created.game, "question added");
  Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn update_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(entry): Json<PoolEntry>,
) -> Result<Response, AppError> {
  let mut pool = state.pool.write().await;
  if pool.get(&id).is_none() {
    return Ok(StatusCode::NOT_FOUND.into_response());
  }
  let updated = pool
    .edit(|pool| {
      pool.update(&id, entry);
      pool.get(&id).cloned()
    })
    .await?;
  tracing::info!(%id, "question updated");
  Ok(Json(updated).into_response())
}

async fn delete_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
  let mut pool = state.pool.write().await;
  if pool.get(&id).is_none() {
    return Ok(StatusCode::NOT_FOUND);
  }
  pool.edit(|pool| pool.remove(&id)).await?;
  tracing::info!(%id, "question deleted");
  Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::conf::Config;
  use crate::pool::QuestionPool;
  use axum::{body::Body, http::Request};
  use clap::Parser;
  use tower::ServiceExt;
  use uuid::Uuid;

  fn test_state() -> Arc<AppState> {
    let path = std::env::temp_dir().join(format!("party-quiz-routes-{}.json", Uuid::now_v7()));
    Arc::new(AppState::new(
      Config::parse_from(["party-quiz"]),
      QuestionPool::from_entries(path, vec![]),
      "letmein".into(),
    ))
  }

  async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&body).unwrap()
  }

  fn login(username: &str, password: &str) -> Request<Body> {
    Request::builder()
      .method("POST")
      .uri("/api/admin/login")
      .header("content-type", "application/json")
      .body(Body::from(
        serde_json::json!({ "username": username, "password": password }).to_string(),
      ))
      .unwrap()
  }

  #[tokio::test]
  async fn health_and_empty_listing() {
    let app = app(test_state());
    let response = app
      .clone()
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
      .clone()
      .oneshot(Request::builder().uri("/api/rooms").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));

    let response = app
      .oneshot(Request::builder().uri("/api/rooms/NOPE").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn failed_save_keeps_pool_unchanged() {
    let state = Arc::new(AppState::new(
      Config::parse_from(["party-quiz"]),
      QuestionPool::from_entries(std::env::temp_dir(), vec![]),
      "letmein".into(),
    ));
    let app = app(state.clone());
    let token = state.token_manager.generate_token("admin").unwrap();
    let response = app
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/api/admin/questions")
          .header("authorization", format!("Bearer {token}"))
          .header("content-type", "application/json")
          .body(Body::from(r#"{"id":"q1","question":"?"}"#))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.pool.read().await.is_empty());
  }

  #[tokio::test]
  async fn admin_routes_need_a_token() {
    let app = app(test_state());
    let response = app
      .clone()
      .oneshot(
        Request::builder()
          .uri("/api/admin/questions")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
      .clone()
      .oneshot(
        Request::builder()
          .uri("/api/admin/questions")
          .header("authorization", "Bearer not-a-token")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(login("admin", "wrong")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn admin_edits_the_pool() {
    let state = test_state();
    let app = app(state.clone());

    let response = app.clone().oneshot(login("admin", "letmein")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let token = body_json(response).await["token"]
      .as_str()
      .unwrap()
      .to_string();
    let bearer = format!("Bearer {token}");

    let response = app
      .clone()
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/api/admin/questions")
          .header("authorization", &bearer)
          .header("content-type", "application/json")
          .body(Body::from(
            r#"{"id":"q1","category":"Geo","value":300,"question":"Capital of Peru?","answer":"Lima"}"#,
          ))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(state.pool.read().await.len(), 1);

    let response = app
      .clone()
      .oneshot(
        Request::builder()
          .method("PUT")
          .uri("/api/admin/questions/q1")
          .header("authorization", &bearer)
          .header("content-type", "application/json")
          .body(Body::from(r#"{"question":"Capital of Chile?","answer":"Santiago"}"#))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], "q1");
    assert_eq!(json["answer"], "Santiago");
    assert_eq!(json["value"], 100);

    let response = app
      .clone()
      .oneshot(
        Request::builder()
          .method("DELETE")
          .uri("/api/admin/questions/q1")
          .header("authorization", &bearer)
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
      .oneshot(
        Request::builder()
          .method("DELETE")
          .uri("/api/admin/questions/q1")
          .header("authorization", &bearer)
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(state.pool.read().await.is_empty());
  }
}
