use crate::state::AppState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

pub const TICK: Duration = Duration::from_secs(1);

/// Drives every room's timers and reconnect grace, once a second, forever.
pub async fn run(state: Arc<AppState>) {
  let mut interval = tokio::time::interval(TICK);
  interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
  let grace = state.config.reconnect_grace();
  loop {
    interval.tick().await;
    state.rooms.tick_all(Instant::now(), grace).await;
  }
}
