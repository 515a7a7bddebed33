//! Test: Publication - docs artifact flows to the host, one job per group at a time

use crate::helpers::*;
use async_trait::async_trait;
use envflow::core::{EventType, OrchestrationError, PublicationStep};
use envflow::execution::SchedulingStrategy;
use envflow::publication::{
    DeployableUnit, HostError, HostingProvider, PublicationJob, PublicationPipeline, StagedUpload,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_docs_run_publishes_site() {
    let harness = Harness::janus(MockRunner::new());

    let report = harness.run(&push("main", "stfc/janus-core"), &["docs"]).await;

    assert_job_succeeded(&report, "docs");
    let publication = report.publication.as_ref().expect("docs should be published");
    let result = publication.result.as_ref().expect("publication should succeed");
    assert_eq!(result.target, "github-pages");
    assert_eq!(result.concurrency_group, "pages");
    assert_eq!(result.files, 1);
    assert!(result.started_at <= result.finished_at);

    let published = harness.site.path().join("github-pages/index.html");
    assert_eq!(std::fs::read_to_string(published).unwrap(), "<h1>janus-core</h1>");
}

#[tokio::test]
async fn test_failed_docs_build_publishes_nothing() {
    let harness = Harness::janus(MockRunner::new().fail_when("docs", "sphinx-build"));

    let report = harness.run(&push("main", "stfc/janus-core"), &["docs"]).await;

    assert_job_failed(&report, "docs", "commands");
    assert!(report.publication.is_none());
    assert!(!harness.site.path().join("github-pages").exists());
}

#[tokio::test]
async fn test_run_without_docs_does_not_publish() {
    let harness = Harness::janus(MockRunner::new());

    let report = harness
        .run(&trigger(EventType::Manual, "main", "stfc/janus-core"), &["py312"])
        .await;

    assert!(report.publication.is_none());
    assert_eq!(report.state.total_jobs, 1);
}

#[tokio::test]
async fn test_concurrent_runs_publish_one_at_a_time() {
    let harness = Harness::janus(MockRunner::new().with_delay(Duration::from_millis(10)));
    let event = push("main", "stfc/janus-core");

    let (first, second) = tokio::join!(
        harness.run(&event, &["docs"]),
        harness.run(&event, &["docs"])
    );

    let a = first.publication.unwrap().result.unwrap();
    let b = second.publication.unwrap().result.unwrap();
    let (earlier, later) = if a.started_at <= b.started_at { (a, b) } else { (b, a) };
    assert!(
        later.started_at >= earlier.finished_at,
        "publications overlapped: {:?} / {:?}",
        earlier,
        later
    );
}

/// Host that records upload/deploy order and rejects the first upload
struct FlakyHost {
    uploads: AtomicUsize,
    log: Mutex<Vec<String>>,
}

#[async_trait]
impl HostingProvider for FlakyHost {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn upload(&self, unit: &DeployableUnit, target: &str) -> Result<StagedUpload, HostError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("upload-{}", n));
        tokio::time::sleep(Duration::from_millis(10)).await;
        if n == 0 {
            return Err(HostError::Rejected("storage quota exceeded".to_string()));
        }
        Ok(StagedUpload {
            target: target.to_string(),
            staging_id: format!("stage-{}", n),
            location: unit.source.clone(),
        })
    }

    async fn deploy(&self, staged: &StagedUpload) -> Result<String, HostError> {
        self.log.lock().unwrap().push(format!("deploy-{}", staged.staging_id));
        Ok(format!("https://stfc.github.io/janus-core/{}", staged.staging_id))
    }
}

#[tokio::test]
async fn test_queue_proceeds_after_failed_predecessor() {
    let site = tempfile::tempdir().unwrap();
    std::fs::write(site.path().join("index.html"), "<h1>docs</h1>").unwrap();

    let host = Arc::new(FlakyHost {
        uploads: AtomicUsize::new(0),
        log: Mutex::new(Vec::new()),
    });
    let pipeline = PublicationPipeline::new(host.clone());
    let first = PublicationJob::new("docs", site.path(), "github-pages", "pages");
    let second = PublicationJob::new("docs", site.path(), "github-pages", "pages");

    let (a, b) = tokio::join!(pipeline.publish(&first), pipeline.publish(&second));

    match a {
        Err(OrchestrationError::PublicationFailure { step, .. }) => assert_eq!(step, PublicationStep::Upload),
        other => panic!("Expected upload failure, got {:?}", other),
    }
    assert_eq!(b.unwrap().url, "https://stfc.github.io/janus-core/stage-1");

    // The failed upload never reached deploy, and the second job waited for it
    assert_eq!(
        *host.log.lock().unwrap(),
        vec!["upload-0", "upload-1", "deploy-stage-1"]
    );
}

#[tokio::test]
async fn test_publication_event_filter() {
    let yaml = format!("{}  events: [push]\n", JANUS_YAML);
    let harness = Harness::new(&yaml, MockRunner::new(), SchedulingStrategy::Sequential);

    // Manual dispatch passes the gate and builds docs, but does not deploy
    let report = harness
        .run(&trigger(EventType::Manual, "main", "stfc/janus-core"), &["docs"])
        .await;
    assert_job_succeeded(&report, "docs");
    assert!(report.publication.is_none());
    assert!(!harness.site.path().join("github-pages").exists());

    let report = harness.run(&push("main", "stfc/janus-core"), &["docs"]).await;
    assert!(report.publication.as_ref().is_some_and(|p| p.is_success()));
}
