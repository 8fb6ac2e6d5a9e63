//! HTTP handlers

pub mod cases;
pub mod contracts;
pub mod health;

pub use cases::*;
pub use contracts::*;
pub use health::{HealthResponse, __path_health_check, health_check};
