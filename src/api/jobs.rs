//! Job API handlers.

use actix_web::{web, HttpResponse};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CreateJobRequest, CreateJobResponse, Job, JobView, ListJobsQuery};
use crate::runner::Runner;
use crate::store::JobStore;

/// Create a new test job and start executing it.
///
/// One container run per requested architecture is started asynchronously;
/// the response only acknowledges acceptance.
#[utoipa::path(
    post,
    path = "/api/v1/jobs",
    tag = "Jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job accepted", body = CreateJobResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
    )
)]
pub async fn create_job(
    store: web::Data<dyn JobStore>,
    runner: web::Data<Runner>,
    body: web::Json<CreateJobRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    if req.repo.trim().is_empty() {
        return Err(AppError::InvalidInput("repo must not be empty".to_string()));
    }
    if req.test_command.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "test_command must not be empty".to_string(),
        ));
    }
    if req.architectures.is_empty() {
        return Err(AppError::InvalidInput(
            "at least one architecture is required".to_string(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for arch in &req.architectures {
        if arch.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "architecture names must not be empty".to_string(),
            ));
        }
        if !seen.insert(arch.as_str()) {
            return Err(AppError::InvalidInput(format!(
                "duplicate architecture '{}'",
                arch
            )));
        }
    }

    let job = Job::new(
        Uuid::now_v7(),
        req.repo,
        req.commit,
        req.test_command,
        req.architectures,
        req.timeout,
        req.env,
    );
    store.save_job(&job).await?;

    info!(
        job_id = %job.id,
        repo = %job.repo,
        commit = %job.commit,
        architectures = ?job.architectures,
        "job created"
    );

    // Kick off async execution.
    runner.submit(&job);

    Ok(HttpResponse::Created().json(CreateJobResponse { id: job.id }))
}

/// List jobs, newest first, with truncated log previews.
#[utoipa::path(
    get,
    path = "/api/v1/jobs",
    tag = "Jobs",
    params(
        ("status" = Option<String>, Query, description = "Only return jobs with this aggregate status")
    ),
    responses(
        (status = 200, description = "Jobs", body = [JobView]),
    )
)]
pub async fn list_jobs(
    store: web::Data<dyn JobStore>,
    query: web::Query<ListJobsQuery>,
) -> AppResult<HttpResponse> {
    let jobs = store.list_jobs().await?;

    let views: Vec<JobView> = jobs
        .iter()
        .filter(|j| query.status.map_or(true, |s| j.status == s))
        .map(JobView::from)
        .collect();

    info!(count = views.len(), status_filter = ?query.status, "jobs listed");

    Ok(HttpResponse::Ok().json(views))
}

/// Fetch one job with per-target results (truncated logs).
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID")
    ),
    responses(
        (status = 200, description = "Job", body = JobView),
        (status = 404, description = "Job not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_job(
    store: web::Data<dyn JobStore>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let job = store.get_job(id).await?;

    info!(job_id = %id, status = %job.status, "job fetched");

    Ok(HttpResponse::Ok().json(JobView::from(&job)))
}

/// Fetch the full, untruncated log of one target.
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/targets/{arch}/log",
    tag = "Jobs",
    params(
        ("id" = Uuid, Path, description = "Job UUID"),
        ("arch" = String, Path, description = "Target architecture")
    ),
    responses(
        (status = 200, description = "Combined log text", body = String, content_type = "text/plain"),
        (status = 404, description = "Job or target not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_target_log(
    store: web::Data<dyn JobStore>,
    path: web::Path<(Uuid, String)>,
) -> AppResult<HttpResponse> {
    let (id, arch) = path.into_inner();
    let job = store.get_job(id).await?;

    let target = job
        .target(&arch)
        .ok_or_else(|| AppError::NotFound(format!("Target {} for job {}", arch, id)))?;

    info!(job_id = %id, arch = %arch, "target log fetched");

    let body = if target.log.is_empty() {
        "(no log)\n".to_string()
    } else {
        target.log.clone()
    };

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(body))
}

/// Configure job routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/jobs")
            .route(web::post().to(create_job))
            .route(web::get().to(list_jobs)),
    )
    .service(web::resource("/jobs/{id}").route(web::get().to(get_job)))
    .service(web::resource("/jobs/{id}/targets/{arch}/log").route(web::get().to(get_target_log)));
}
