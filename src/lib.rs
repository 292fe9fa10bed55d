pub mod bot;
pub mod config;
pub mod models;
pub mod monitor;
pub mod notifications;
pub mod probe;
pub mod storage;
pub mod telegram;
pub mod version;
