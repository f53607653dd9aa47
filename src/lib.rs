pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod intake;
pub mod metrics;
pub mod rate_limit;
pub mod registry;
pub mod scope;
pub mod scoreboard;
pub mod scoring;
