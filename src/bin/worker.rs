// src/bin/worker.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Arg, Command};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use seqjobs::config::WorkerConfig;
use seqjobs::runner::run_worker;
use seqjobs::{JobPipeline, MmseqsSearch, RedisConsumer, RedisJobStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let matches = Command::new("seqjobs-worker")
        .about("Sequence-search worker: consumes queued jobs and runs the search tool")
        .arg(
            Arg::new("queue")
                .short('q')
                .long("queue")
                .value_name("QUEUE")
                .help("Queue to consume from (overrides QUEUE_NAME)"),
        )
        .arg(
            Arg::new("concurrency")
                .short('c')
                .long("concurrency")
                .value_name("NUMBER")
                .help("Number of consumers, each with prefetch of one")
                .default_value("1"),
        )
        .get_matches();

    let mut config = WorkerConfig::from_env();
    if let Some(queue) = matches.get_one::<String>("queue") {
        config.queue = queue.clone();
    }
    let concurrency: usize = matches
        .get_one::<String>("concurrency")
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(1)
        .max(1);

    let store = Arc::new(RedisJobStore::new(&config.redis_url));
    let search = Arc::new(MmseqsSearch::new(
        &config.mmseqs_bin,
        &config.db_path,
        &config.workspace_dir,
        &config.result_dir,
        Duration::from_secs(config.search_timeout_secs),
    ));
    let pipeline = Arc::new(JobPipeline::new(store, search));

    info!(queue = %config.queue, concurrency, "starting worker");
    let mut handles = Vec::with_capacity(concurrency);
    for i in 0..concurrency {
        let consumer = RedisConsumer::new(
            &config.redis_url,
            &config.queue,
            format!("{}-{i}", config.consumer_tag),
        );
        handles.push(tokio::spawn(run_worker(consumer, pipeline.clone())));
    }

    signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
