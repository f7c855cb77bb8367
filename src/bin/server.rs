// src/bin/server.rs
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use clap::{Arg, Command};
use tracing::info;
use tracing_subscriber::EnvFilter;

use seqjobs::config::ApiConfig;
use seqjobs::routes::jobs_route::job_routes;
use seqjobs::services::submit_service::AppState;
use seqjobs::{RedisJobStore, RedisQueue, SubmissionCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let matches = Command::new("seqjobs-server")
        .about("Sequence-search front door (submit / status / results)")
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDR:PORT")
                .help("Address to listen on (overrides BIND_ADDR)"),
        )
        .arg(
            Arg::new("queue")
                .short('q')
                .long("queue")
                .value_name("QUEUE")
                .help("Queue name to publish jobs to (overrides QUEUE_NAME)"),
        )
        .get_matches();

    let mut config = ApiConfig::from_env();
    if let Some(bind) = matches.get_one::<String>("bind") {
        config.bind_addr = bind.clone();
    }
    if let Some(queue) = matches.get_one::<String>("queue") {
        config.queue = queue.clone();
    }

    let store = Arc::new(RedisJobStore::new(&config.redis_url));
    let publisher = Arc::new(RedisQueue::new(&config.redis_url, &config.queue));
    let state = web::Data::new(AppState {
        coordinator: SubmissionCoordinator::new(store.clone(), publisher),
        store,
        result_dir: config.result_dir.clone(),
    });

    info!(bind = %config.bind_addr, queue = %config.queue, "starting server");
    HttpServer::new(move || App::new().app_data(state.clone()).configure(job_routes))
        .bind(&config.bind_addr)?
        .run()
        .await?;
    Ok(())
}
