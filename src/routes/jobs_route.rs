// src/routes/jobs_route.rs
use actix_web::web;

use crate::services::store_service::{create_job, get_job, patch_job};
use crate::services::submit_service::{json_error_handler, results, status, submit};

pub fn job_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .route("/submit", web::post().to(submit))
        .route("/status/{job_id}", web::get().to(status))
        .route("/results/{job_id}", web::get().to(results))
        .service(
            web::scope("/job")
                .route("/", web::post().to(create_job))
                .route("/{job_id}", web::get().to(get_job))
                .route("/{job_id}", web::patch().to(patch_job)),
        );
}
