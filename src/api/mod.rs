//! API endpoint modules.

pub mod health;
pub mod jobs;
pub mod openapi;

pub use health::configure_health_routes;
pub use jobs::configure_routes as configure_job_routes;
pub use openapi::ApiDoc;
