// src/services/store_service.rs
//! The metadata store's own HTTP surface (`/job`), consumed by external
//! workers that do not link this crate. Thin delegation to the store; the
//! state machine is enforced underneath either way.
use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::error::StoreError;
use crate::services::submit_service::AppState;
use crate::status::JobStatus;
use crate::store::GetOutcome;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: JobStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

pub async fn create_job(
    state: web::Data<AppState>,
    body: web::Json<CreateJobRequest>,
) -> impl Responder {
    match state.store.create(&body.job_id, Utc::now()).await {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(err @ StoreError::AlreadyExists(_)) => {
            HttpResponse::Conflict().json(json!({ "detail": err.to_string() }))
        }
        Err(err) => {
            error!(job_id = %body.job_id, %err, "job create failed");
            HttpResponse::InternalServerError().json(json!({ "detail": err.to_string() }))
        }
    }
}

pub async fn get_job(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    match state.store.get(&job_id).await {
        Ok(GetOutcome::Found(record)) => HttpResponse::Ok().json(record),
        Ok(GetOutcome::NotFound) => {
            HttpResponse::NotFound().json(json!({ "detail": format!("job {job_id} not found") }))
        }
        Err(err) => {
            error!(%job_id, %err, "job read failed");
            HttpResponse::InternalServerError().json(json!({ "detail": err.to_string() }))
        }
    }
}

pub async fn patch_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<TransitionRequest>,
) -> impl Responder {
    let job_id = path.into_inner();
    match state
        .store
        .transition(&job_id, body.status, body.completed_at)
        .await
    {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(err @ (StoreError::IllegalTransition { .. } | StoreError::InvalidTimestamp(_))) => {
            HttpResponse::Conflict().json(json!({ "detail": err.to_string() }))
        }
        Err(err @ StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(json!({ "detail": err.to_string() }))
        }
        Err(err) => {
            error!(%job_id, %err, "job transition failed");
            HttpResponse::InternalServerError().json(json!({ "detail": err.to_string() }))
        }
    }
}
