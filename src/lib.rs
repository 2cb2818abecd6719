pub mod auth;
pub mod conf;
pub mod dispatch;
pub mod error;
pub mod game;
pub mod middleware;
pub mod models;
pub mod pool;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod ws;
