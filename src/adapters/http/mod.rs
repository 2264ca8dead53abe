//! HTTP adapters: outbound collector and controller clients, inbound
//! scheduler API and worker probes.

pub mod api;
pub mod collector;
pub mod controller;
pub mod health;

pub use api::ApiState;
pub use collector::HttpCollector;
pub use controller::ControllerReporter;
pub use health::HealthState;
