pub mod controller;

pub use controller::{HealthResponse, health_check};
