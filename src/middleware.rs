use crate::state::AppState;
use axum::{
  extract::{Request, State},
  http::StatusCode,
  middleware::Next,
  response::{IntoResponse, Response},
};
use headers::{Authorization, HeaderMapExt, authorization::Bearer};
use std::sync::Arc;

/// Lets a request through only with a valid admin bearer token.
pub async fn admin_middleware(
  State(state): State<Arc<AppState>>,
  mut req: Request,
  next: Next,
) -> Response {
  let claims = req
    .headers()
    .typed_get::<Authorization<Bearer>>()
    .and_then(|auth| state.token_manager.parse_token(auth.token()));

  match claims {
    Some(claims) if claims.sub == state.admin.name => {
      req.extensions_mut().insert(claims);
      next.run(req).await
    }
    _ => {
      tracing::debug!(path = %req.uri().path(), "admin request without a valid token");
      (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
  }
}
