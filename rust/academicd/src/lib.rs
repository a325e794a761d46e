pub mod api;
pub mod config;
pub mod db;
pub mod export;
pub mod forms;
pub mod ipc;
pub mod progress;
