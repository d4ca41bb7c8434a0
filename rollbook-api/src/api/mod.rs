//! HTTP API handlers for rollbook-api

pub mod attendance;
pub mod chat;
pub mod health;
pub mod students;

pub use attendance::attendance_routes;
pub use chat::chat_routes;
pub use health::health_routes;
pub use students::student_routes;
