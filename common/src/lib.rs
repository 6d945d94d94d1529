// Shared library for the scholarship web server and the digest scheduler

pub mod analytics;
pub mod auth;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod csrf;
pub mod db;
pub mod digest;
pub mod errors;
pub mod export;
pub mod make;
pub mod matching;
pub mod models;
pub mod notion;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
pub mod validation;
