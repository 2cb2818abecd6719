use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use std::fmt::Debug;

// Wraps `anyhow::Error` so handlers can use `?`.
pub struct AppError(anyhow::Error);

impl<E> From<E> for AppError
where
  E: Into<anyhow::Error>,
{
  fn from(err: E) -> Self {
    Self(err.into())
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    tracing::error!("Application error: {:#}", self.0);

    #[cfg(debug_assertions)]
    let message = format!(
      "Something went wrong:\n{}\n\nBacktrace:\n{}",
      self.0,
      self.0.backtrace()
    );

    #[cfg(not(debug_assertions))]
    let message = format!("Something went wrong: {}", self.0);

    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
  }
}

impl Debug for AppError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:?}", self.0)
  }
}
