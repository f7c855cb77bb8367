//! End-to-end HTTP tests over the Actix app with the in-memory store and a
//! recording publisher, mirroring how an operator exercises the front door.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::{test, web, App};
use async_trait::async_trait;
use serde_json::{json, Value};

use seqjobs::routes::jobs_route::job_routes;
use seqjobs::services::submit_service::AppState;
use seqjobs::{
    BrokerError, JobMessage, JobStatus, JobStore, MemoryJobStore, PublishOutcome, QueuePublisher,
    SubmissionCoordinator,
};

const VALID_FASTA: &str = ">seq1\nMKT\n";
const VALID_JOB_ID: &str = "16209d13c2fc3d8c27380c442f629595";

#[derive(Default)]
struct RecordingPublisher {
    published: AtomicUsize,
    reject: bool,
}

#[async_trait]
impl QueuePublisher for RecordingPublisher {
    async fn publish(&self, _message: &JobMessage) -> Result<PublishOutcome, BrokerError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            Ok(PublishOutcome::Rejected)
        } else {
            Ok(PublishOutcome::Accepted)
        }
    }
}

struct TestHarness {
    store: Arc<MemoryJobStore>,
    publisher: Arc<RecordingPublisher>,
    result_dir: tempfile::TempDir,
}

impl TestHarness {
    fn new(reject: bool) -> Self {
        Self {
            store: Arc::new(MemoryJobStore::new()),
            publisher: Arc::new(RecordingPublisher { reject, ..Default::default() }),
            result_dir: tempfile::tempdir().unwrap(),
        }
    }

    fn state(&self) -> web::Data<AppState> {
        let store: Arc<dyn JobStore> = self.store.clone();
        web::Data::new(AppState {
            coordinator: SubmissionCoordinator::new(store.clone(), self.publisher.clone()),
            store,
            result_dir: self.result_dir.path().to_path_buf(),
        })
    }
}

macro_rules! app {
    ($harness:expr) => {
        test::init_service(App::new().app_data($harness.state()).configure(job_routes)).await
    };
}

#[actix_web::test]
async fn submit_new_fasta_queues_a_job() {
    let harness = TestHarness::new(false);
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({ "fasta": VALID_FASTA }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["job_id"], VALID_JOB_ID);
    assert_eq!(body["status"], "QUEUED");
    assert_eq!(harness.publisher.published.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn resubmitting_identical_fasta_is_deduplicated() {
    let harness = TestHarness::new(false);
    let app = app!(harness);

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/submit")
            .set_json(json!({ "fasta": VALID_FASTA }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["job_id"], VALID_JOB_ID);
    }
    // second submission published nothing
    assert_eq!(harness.publisher.published.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn invalid_fasta_is_a_422_with_field_detail() {
    let harness = TestHarness::new(false);
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({ "fasta": ">seq1\n\n" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().contains("empty sequence"));
    assert_eq!(harness.publisher.published.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn unparseable_body_is_a_422_with_detail() {
    let harness = TestHarness::new(false);
    let app = app!(harness);

    // not JSON at all, and JSON missing the fasta field
    for payload in ["{not json", r#"{"sequence": "MKT"}"#] {
        let req = test::TestRequest::post()
            .uri("/submit")
            .insert_header(("content-type", "application/json"))
            .set_payload(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422, "payload {payload:?}");
        let body: Value = test::read_body_json(resp).await;
        assert!(body["detail"].is_string());
    }
    assert_eq!(harness.publisher.published.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn broker_rejection_is_a_400_and_persists_nothing() {
    let harness = TestHarness::new(true);
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({ "fasta": VALID_FASTA }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // the status endpoint confirms no record was created
    let req = test::TestRequest::get()
        .uri(&format!("/status/{VALID_JOB_ID}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn status_reflects_worker_progress() {
    let harness = TestHarness::new(false);
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/submit")
        .set_json(json!({ "fasta": VALID_FASTA }))
        .to_request();
    test::call_service(&app, req).await;

    harness
        .store
        .transition(VALID_JOB_ID, JobStatus::Running, None)
        .await
        .unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/status/{VALID_JOB_ID}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["job_id"], VALID_JOB_ID);
    assert_eq!(body["status"], "RUNNING");
    assert!(body["submitted_at"].is_string());
    assert!(body.get("completed_at").is_none());
}

#[actix_web::test]
async fn results_serve_artifact_bytes_or_404() {
    let harness = TestHarness::new(false);
    std::fs::write(
        harness.result_dir.path().join(format!("{VALID_JOB_ID}.m8")),
        "seq1\tsp|P0\t0.99\n",
    )
    .unwrap();
    let app = app!(harness);

    let req = test::TestRequest::get()
        .uri(&format!("/results/{VALID_JOB_ID}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );
    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"seq1\tsp|P0\t0.99\n");

    let req = test::TestRequest::get()
        .uri("/results/0000000000000000000000000000dead")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn metadata_surface_enforces_the_state_machine() {
    let harness = TestHarness::new(false);
    let app = app!(harness);

    // create
    let req = test::TestRequest::post()
        .uri("/job/")
        .set_json(json!({ "job_id": "abc123" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // duplicate create conflicts
    let req = test::TestRequest::post()
        .uri("/job/")
        .set_json(json!({ "job_id": "abc123" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // legal transition
    let req = test::TestRequest::patch()
        .uri("/job/abc123")
        .set_json(json!({ "status": "RUNNING" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // illegal transition is rejected, not applied
    let req = test::TestRequest::patch()
        .uri("/job/abc123")
        .set_json(json!({ "status": "QUEUED" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // unknown job
    let req = test::TestRequest::patch()
        .uri("/job/nope")
        .set_json(json!({ "status": "RUNNING" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get().uri("/job/abc123").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "RUNNING");
}
