//! seqjobs - sequence-search job submission and orchestration.
//!
//! Submissions are deduplicated by a content-derived job id, published to a
//! durable queue as the durability checkpoint, and tracked through a
//! forward-only status lifecycle (`QUEUED -> RUNNING -> FINISHED | FAILED`)
//! owned by the metadata store. Workers consume one message at a time,
//! invoke the external search tool in a removable scratch directory, and
//! settle each delivery with the broker (ack, or discard-without-requeue
//! for poison messages).

pub mod broker;
pub mod compute;
pub mod config;
pub mod constants;
pub mod error;
pub mod fasta;
pub mod rdconfig;
pub mod routes;
pub mod runner;
pub mod services;
pub mod status;
pub mod store;
pub mod submit;

pub use broker::{JobMessage, PublishOutcome, QueuePublisher, RedisConsumer, RedisQueue};
pub use compute::{MmseqsSearch, SearchTool};
pub use error::{BrokerError, ComputeError, FastaError, StoreError, SubmitError};
pub use fasta::FastaPayload;
pub use runner::{Disposition, JobPipeline};
pub use status::JobStatus;
pub use store::{GetOutcome, JobRecord, JobStore, MemoryJobStore, RedisJobStore};
pub use submit::SubmissionCoordinator;
