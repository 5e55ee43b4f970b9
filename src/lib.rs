pub mod app;
pub mod calculator;
pub mod client;
pub mod config;
pub mod crud;
pub mod error_report;
pub mod errors;
pub mod export;
pub mod handlers;
pub mod session;
pub mod state;
pub mod storage;
pub mod tracker;
pub mod ui;

pub use app::router;
pub use calculator::{calculate, Calculated, GoalInputs};
pub use config::Config;
pub use state::AppState;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use tracker::GoalTracker;
