pub mod commands;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod keyboard;
pub mod resolve;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;
