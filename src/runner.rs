// src/runner.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::broker::{JobMessage, RedisConsumer};
use crate::compute::SearchTool;
use crate::error::StoreError;
use crate::status::JobStatus;
use crate::store::JobStore;

/// What the worker tells the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove the message from the queue.
    Ack,
    /// Unprocessable; drop without requeue so a poison message cannot loop.
    Discard,
}

/// Drives one delivered message through the job state machine and the
/// compute step. Redelivery-safe: a duplicate delivery of a finished job is
/// acked without recomputing, and a duplicate of one still running is
/// tolerated rather than crashing the worker.
pub struct JobPipeline {
    store: Arc<dyn JobStore>,
    search: Arc<dyn SearchTool>,
}

impl JobPipeline {
    pub fn new(store: Arc<dyn JobStore>, search: Arc<dyn SearchTool>) -> Self {
        Self { store, search }
    }

    pub async fn handle(&self, raw: &str) -> Disposition {
        let message = match JobMessage::parse(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "discarding poison message");
                return Disposition::Discard;
            }
        };
        let job_id = message.job_id.as_str();

        match self.store.transition(job_id, JobStatus::Running, None).await {
            Ok(_) => {}
            Err(StoreError::IllegalTransition { from: JobStatus::Running, .. }) => {
                // redelivery while (or after) another attempt marked it
                // running; re-running is safe because the artifact move is a
                // same-path replace
                info!(job_id, "job already marked running, processing redelivery");
            }
            Err(StoreError::IllegalTransition { from, .. }) if from.is_terminal() => {
                info!(job_id, %from, "job already terminal, dropping redelivery");
                return Disposition::Ack;
            }
            Err(err) => {
                error!(job_id, %err, "could not mark job running");
                self.mark_failed(job_id).await;
                return Disposition::Discard;
            }
        }

        match self.search.run(job_id, &message.payload).await {
            Ok(_result) => match self
                .store
                .transition(job_id, JobStatus::Finished, Some(Utc::now()))
                .await
            {
                Ok(record) => {
                    info!(job_id, completed_at = ?record.completed_at, "job finished");
                    Disposition::Ack
                }
                Err(err) => {
                    error!(job_id, %err, "search succeeded but status update failed");
                    // the message is dropped either way; the record must
                    // not stay RUNNING if the store comes back
                    self.mark_failed(job_id).await;
                    Disposition::Discard
                }
            },
            Err(err) => {
                error!(job_id, %err, "search failed");
                self.mark_failed(job_id).await;
                Disposition::Discard
            }
        }
    }

    /// Best effort: the message is discarded either way, and the store may
    /// itself be the component that is down.
    async fn mark_failed(&self, job_id: &str) {
        if let Err(err) = self
            .store
            .transition(job_id, JobStatus::Failed, Some(Utc::now()))
            .await
        {
            warn!(job_id, %err, "could not mark job failed");
        }
    }
}

/// Consume one message at a time from the queue until shutdown. Broker
/// errors back off and retry; processing outcomes are reported back to the
/// broker per delivery.
pub async fn run_worker(consumer: RedisConsumer, pipeline: Arc<JobPipeline>) -> anyhow::Result<()> {
    consumer.recover().await?;
    info!("waiting for jobs");

    loop {
        let delivery = match consumer.next(5.0).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(err) => {
                error!(%err, "broker unavailable, backing off");
                sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let disposition = pipeline.handle(&delivery.raw).await;
        let result = match disposition {
            Disposition::Ack => consumer.ack(&delivery).await,
            Disposition::Discard => consumer.discard(&delivery).await,
        };
        if let Err(err) = result {
            error!(%err, "failed to settle delivery with the broker");
            sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::ComputeError;
    use crate::store::{GetOutcome, MemoryJobStore};

    const JOB_ID: &str = "16209d13c2fc3d8c27380c442f629595";

    struct StubSearch {
        runs: AtomicUsize,
        fail: bool,
    }

    impl StubSearch {
        fn ok() -> Self {
            Self { runs: AtomicUsize::new(0), fail: false }
        }
        fn failing() -> Self {
            Self { runs: AtomicUsize::new(0), fail: true }
        }
    }

    #[async_trait]
    impl SearchTool for StubSearch {
        async fn run(&self, job_id: &str, _payload: &str) -> Result<PathBuf, ComputeError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ComputeError::ToolFailed { code: Some(1), stderr: "boom".into() })
            } else {
                Ok(PathBuf::from(format!("/results/{job_id}.m8")))
            }
        }
    }

    fn envelope() -> String {
        JobMessage::new(JOB_ID, ">seq1\nMKT\n").encode().unwrap()
    }

    async fn queued_store() -> Arc<MemoryJobStore> {
        let store = Arc::new(MemoryJobStore::new());
        store.create(JOB_ID, Utc::now()).await.unwrap();
        store
    }

    async fn record_of(store: &MemoryJobStore) -> crate::store::JobRecord {
        match store.get(JOB_ID).await.unwrap() {
            GetOutcome::Found(record) => record,
            GetOutcome::NotFound => panic!("job record missing"),
        }
    }

    #[tokio::test]
    async fn successful_run_finishes_and_acks() {
        let store = queued_store().await;
        let search = Arc::new(StubSearch::ok());
        let pipeline = JobPipeline::new(store.clone(), search.clone());

        assert_eq!(pipeline.handle(&envelope()).await, Disposition::Ack);
        let record = record_of(&store).await;
        assert_eq!(record.status, JobStatus::Finished);
        assert!(record.completed_at.is_some());
        assert_eq!(search.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compute_failure_marks_failed_and_discards() {
        let store = queued_store().await;
        let pipeline = JobPipeline::new(store.clone(), Arc::new(StubSearch::failing()));

        assert_eq!(pipeline.handle(&envelope()).await, Disposition::Discard);
        let record = record_of(&store).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn redelivery_after_finish_acks_without_recompute() {
        let store = queued_store().await;
        let search = Arc::new(StubSearch::ok());
        let pipeline = JobPipeline::new(store.clone(), search.clone());

        assert_eq!(pipeline.handle(&envelope()).await, Disposition::Ack);
        assert_eq!(pipeline.handle(&envelope()).await, Disposition::Ack);

        // single terminal state, single compute invocation
        assert_eq!(record_of(&store).await.status, JobStatus::Finished);
        assert_eq!(search.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn redelivery_while_running_is_tolerated() {
        let store = queued_store().await;
        store.transition(JOB_ID, JobStatus::Running, None).await.unwrap();
        let search = Arc::new(StubSearch::ok());
        let pipeline = JobPipeline::new(store.clone(), search.clone());

        // RUNNING -> RUNNING conflict must not crash the worker
        assert_eq!(pipeline.handle(&envelope()).await, Disposition::Ack);
        assert_eq!(record_of(&store).await.status, JobStatus::Finished);
    }

    #[tokio::test]
    async fn malformed_message_is_poison() {
        let store = queued_store().await;
        let search = Arc::new(StubSearch::ok());
        let pipeline = JobPipeline::new(store.clone(), search.clone());

        assert_eq!(pipeline.handle("{not json").await, Disposition::Discard);
        assert_eq!(
            pipeline.handle(r#"{"job_id":"","payload":"x"}"#).await,
            Disposition::Discard
        );
        // nothing touched the store or the tool
        assert_eq!(record_of(&store).await.status, JobStatus::Queued);
        assert_eq!(search.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn path_shaped_job_id_never_reaches_the_tool() {
        // a crafted envelope id would otherwise become a filename under
        // the result directory
        let store = Arc::new(MemoryJobStore::new());
        let search = Arc::new(StubSearch::ok());
        let pipeline = JobPipeline::new(store.clone(), search.clone());

        let raw = r#"{"job_id": "../../escape", "payload": ">seq1\nMKT\n"}"#;
        assert_eq!(pipeline.handle(raw).await, Disposition::Discard);
        assert_eq!(search.runs.load(Ordering::SeqCst), 0);
    }

    /// Rejects FINISHED as if the store dropped out mid-update, but still
    /// accepts FAILED.
    struct FinishRejectingStore {
        inner: Arc<MemoryJobStore>,
    }

    #[async_trait]
    impl JobStore for FinishRejectingStore {
        async fn create(
            &self,
            job_id: &str,
            submitted_at: chrono::DateTime<Utc>,
        ) -> Result<crate::store::JobRecord, StoreError> {
            self.inner.create(job_id, submitted_at).await
        }

        async fn get(&self, job_id: &str) -> Result<GetOutcome, StoreError> {
            self.inner.get(job_id).await
        }

        async fn transition(
            &self,
            job_id: &str,
            target: JobStatus,
            completed_at: Option<chrono::DateTime<Utc>>,
        ) -> Result<crate::store::JobRecord, StoreError> {
            if target == JobStatus::Finished {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.transition(job_id, target, completed_at).await
        }
    }

    #[tokio::test]
    async fn failed_finish_update_still_marks_the_job_failed() {
        let inner = queued_store().await;
        let store = Arc::new(FinishRejectingStore { inner: inner.clone() });
        let pipeline = JobPipeline::new(store, Arc::new(StubSearch::ok()));

        assert_eq!(pipeline.handle(&envelope()).await, Disposition::Discard);
        // the record must not be left RUNNING forever
        let record = record_of(&inner).await;
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn message_without_record_is_discarded() {
        // the queued-but-never-recorded consistency gap from the submit path
        let store = Arc::new(MemoryJobStore::new());
        let pipeline = JobPipeline::new(store.clone(), Arc::new(StubSearch::ok()));

        assert_eq!(pipeline.handle(&envelope()).await, Disposition::Discard);
        assert!(matches!(store.get(JOB_ID).await.unwrap(), GetOutcome::NotFound));
    }
}
