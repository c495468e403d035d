pub mod alerts;
pub mod auth;
pub mod client;
pub mod collector;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod monitors;
pub mod notify;
pub mod server;
