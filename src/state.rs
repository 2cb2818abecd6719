use crate::auth::Admin;
use crate::auth::token::TokenManager;
use crate::conf::Config;
use crate::game::registry::RoomRegistry;
use crate::pool::QuestionPool;
use tokio::sync::RwLock;

pub struct AppState {
  pub config: Config,
  pub rooms: RoomRegistry,
  pub pool: RwLock<QuestionPool>,
  pub admin: Admin,
  pub token_manager: TokenManager,
}

impl AppState {
  pub fn new(config: Config, pool: QuestionPool, admin_password: String) -> Self {
    let admin = Admin::new(config.admin_user.clone(), admin_password);
    Self {
      config,
      rooms: RoomRegistry::new(),
      pool: RwLock::new(pool),
      admin,
      token_manager: TokenManager::new(),
    }
  }
}
