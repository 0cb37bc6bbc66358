pub mod api;
pub mod config;
pub mod export;
pub mod schedule;
pub mod ui;
