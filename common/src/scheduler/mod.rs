// Background scheduling of the daily digest

pub mod engine;

pub use engine::{DigestScheduler, Scheduler};
