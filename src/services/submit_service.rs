// src/services/submit_service.rs
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::compute::{is_safe_job_id, result_path};
use crate::error::SubmitError;
use crate::status::JobStatus;
use crate::store::{GetOutcome, JobStore};
use crate::submit::SubmissionCoordinator;

/// Shared handler state, explicitly constructed in the binary.
pub struct AppState {
    pub coordinator: SubmissionCoordinator,
    pub store: Arc<dyn JobStore>,
    pub result_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub fasta: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Unparseable request bodies answer with the same 422/detail shape the
/// validation path uses, not the framework's bare 400.
pub fn json_error_handler(
    err: actix_web::error::JsonPayloadError,
    _req: &actix_web::HttpRequest,
) -> actix_web::Error {
    let detail = err.to_string();
    let response = HttpResponse::UnprocessableEntity().json(json!({ "detail": detail }));
    actix_web::error::InternalError::from_response(err, response).into()
}

pub async fn submit(state: web::Data<AppState>, body: web::Json<SubmitRequest>) -> impl Responder {
    match state.coordinator.submit(&body.fasta).await {
        Ok(record) => HttpResponse::Ok().json(SubmitResponse {
            job_id: record.job_id,
            status: record.status,
        }),
        Err(SubmitError::Validation(err)) => {
            HttpResponse::UnprocessableEntity().json(json!({ "detail": err.to_string() }))
        }
        Err(err @ SubmitError::BrokerRejected(_)) => {
            error!(%err, "submission rejected by broker");
            HttpResponse::BadRequest().json(json!({ "detail": err.to_string() }))
        }
        Err(err) => {
            error!(%err, "submission failed");
            HttpResponse::InternalServerError().json(json!({ "detail": err.to_string() }))
        }
    }
}

pub async fn status(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    match state.store.get(&job_id).await {
        Ok(GetOutcome::Found(record)) => HttpResponse::Ok().json(record),
        Ok(GetOutcome::NotFound) => HttpResponse::NotFound()
            .json(json!({ "detail": format!("job {job_id} not found") })),
        Err(err) => {
            error!(%job_id, %err, "status lookup failed");
            HttpResponse::InternalServerError().json(json!({
                "detail": format!("unexpected error while fetching job status for {job_id}")
            }))
        }
    }
}

pub async fn results(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    // ids are hex digests; anything else never reaches the filesystem
    if !is_safe_job_id(&job_id) {
        return HttpResponse::NotFound()
            .json(json!({ "detail": format!("results for job {job_id} not found") }));
    }
    match tokio::fs::read(result_path(&state.result_dir, &job_id)).await {
        Ok(bytes) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(bytes),
        Err(_) => HttpResponse::NotFound()
            .json(json!({ "detail": format!("results for job {job_id} not found") })),
    }
}
