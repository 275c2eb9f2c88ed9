pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod exit;
pub mod explain;
pub mod output;
pub mod probe;
pub mod runtime;
pub mod targets;
pub mod turn;
