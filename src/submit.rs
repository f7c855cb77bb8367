// src/submit.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::broker::{JobMessage, PublishOutcome, QueuePublisher};
use crate::error::{StoreError, SubmitError};
use crate::fasta::FastaPayload;
use crate::store::{GetOutcome, JobRecord, JobStore};

/// Orchestrates a submission: validate, derive identity, dedup against the
/// store, publish, persist. Holds injected clients rather than ambient
/// handles so every failure path is explicit.
pub struct SubmissionCoordinator {
    store: Arc<dyn JobStore>,
    publisher: Arc<dyn QueuePublisher>,
}

impl SubmissionCoordinator {
    pub fn new(store: Arc<dyn JobStore>, publisher: Arc<dyn QueuePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Submit a sequence payload.
    ///
    /// New content is published to the queue first (the durability point for
    /// the work itself) and only then recorded in the store. Identical
    /// content maps to the same job id, so a resubmission returns the
    /// existing record without touching the queue or writing anything.
    pub async fn submit(&self, payload: &str) -> Result<JobRecord, SubmitError> {
        let fasta = FastaPayload::parse(payload)?;
        let job_id = fasta.job_id();

        match self.store.get(&job_id).await? {
            GetOutcome::Found(record) => {
                info!(%job_id, status = %record.status, "duplicate submission, returning existing job");
                Ok(record)
            }
            GetOutcome::NotFound => {
                let records = fasta.len();
                let message = JobMessage::new(job_id.clone(), fasta.into_inner());
                match self.publisher.publish(&message).await? {
                    PublishOutcome::Accepted => {}
                    PublishOutcome::Rejected => {
                        return Err(SubmitError::BrokerRejected(job_id));
                    }
                }

                match self.store.create(&job_id, Utc::now()).await {
                    Ok(record) => {
                        info!(%job_id, records, "job queued");
                        Ok(record)
                    }
                    // Lost a race against a concurrent identical submission:
                    // create is the linearization point, so hand back the
                    // winner's record. The extra queue message is absorbed by
                    // worker idempotence.
                    Err(StoreError::AlreadyExists(_)) => match self.store.get(&job_id).await? {
                        GetOutcome::Found(record) => {
                            warn!(%job_id, "concurrent duplicate submission, returning existing job");
                            Ok(record)
                        }
                        GetOutcome::NotFound => {
                            Err(SubmitError::Store(StoreError::NotFound(job_id)))
                        }
                    },
                    Err(err) => Err(err.into()),
                }
            }
        }
    }
}
