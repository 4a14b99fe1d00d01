pub mod actions;
pub mod app;
pub mod auth;
pub mod backend;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod realtime;
pub mod remote;
pub mod state;
pub mod storage;
pub mod summary;
pub mod ui;

pub use app::router;
pub use backend::{select_backend, Backend};
pub use config::Config;
pub use state::AppState;
