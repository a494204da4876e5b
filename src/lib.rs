pub mod api;
pub mod config;
pub mod geocoding;
pub mod models;
pub mod ranking;
pub mod workers;
