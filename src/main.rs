use anyhow::Context;
use party_quiz::{
  conf::Config, game::generate_random_password, pool::QuestionPool, routes, scheduler,
  state::AppState,
};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::load();
  let admin_password = match config.admin_password.clone() {
    Some(password) => password,
    None => {
      let password = generate_random_password();
      tracing::warn!(
        user = %config.admin_user,
        %password,
        "no admin password configured, generated one"
      );
      password
    }
  };

  let pool = QuestionPool::load(&config.pool)?;
  let addr = config.addr;
  let state = Arc::new(AppState::new(config, pool, admin_password));

  tokio::spawn(scheduler::run(state.clone()));

  let app = routes::app(state);
  let listener = tokio::net::TcpListener::bind(addr)
    .await
    .with_context(|| format!("failed to bind {addr}"))?;
  tracing::info!("listening on {}", addr);
  axum::serve(listener, app).await?;
  Ok(())
}
