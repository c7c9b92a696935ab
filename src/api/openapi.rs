//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Multi-Arch Test Harness",
        version = "0.3.0",
        description = "API server for running a test command across CPU architectures in Docker, with per-architecture status tracking"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Job endpoints
        api::jobs::create_job,
        api::jobs::list_jobs,
        api::jobs::get_job,
        api::jobs::get_target_log,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Jobs
            models::JobStatus,
            models::TargetStatus,
            models::FailureReason,
            models::CreateJobRequest,
            models::CreateJobResponse,
            models::JobView,
            models::JobTargetView,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Jobs", description = "Multi-architecture test jobs")
    )
)]
pub struct ApiDoc;
