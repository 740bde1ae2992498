pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod lifecycle;
pub mod live;
pub mod metrics;
pub mod models;
pub mod paper;
pub mod risk;
pub mod scheduler;
pub mod strategy;
pub mod time_sync;

pub use error::{EngineError, EngineResult};
pub use models::*;
