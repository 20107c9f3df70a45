// Common library for the latest-file dispatcher: platform client, scheduling,
// callback verification and shared configuration

pub mod callback;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod models;
pub mod scanner;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod wecom;
