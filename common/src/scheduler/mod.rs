// Scheduler module: the recurring dispatch trigger

pub mod engine;

pub use engine::{JobScheduler, JobTask};
