use super::{CycleError, CycleOutcome, JobKind, JobOutcome, Worker};
use crate::coordinator::{Job, WorkRequest};
use crate::fetch::pin_and_resolve;
use crate::storage;
use std::time::Instant;
use tracing::{error, info, warn};

impl Worker {
    /// Run a single request-execute-report cycle
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let started = Instant::now();

        // Never contact the coordinator with partial identity
        let status = storage::node_status(self.node.as_ref())
            .await
            .map_err(CycleError::NodeStatus)?;
        self.observer.node_peers(status.peer_count);

        let mut request = WorkRequest::new(&self.account, &status);
        let job = self
            .coordinator
            .request_work(&request)
            .await
            .map_err(CycleError::RequestWork)?;

        if job.is_idle() {
            info!("No work available");
            return Ok(CycleOutcome::Idle);
        }

        let outcome = self.execute(&job).await;
        outcome.apply_to(&mut request);

        match self.node.repo_stats().await {
            Ok(usage) => {
                self.observer.repo_usage(&usage);
                request.used = Some(usage.used_bytes);
                request.avail = Some(usage.capacity_bytes);
            }
            Err(e) => warn!(error = %e, "Repo stat failed, reporting without usage"),
        }

        let reported = self.coordinator.report(&request).await;
        outcome.observe(self.observer.as_ref(), started.elapsed());
        reported.map_err(CycleError::Report)?;

        Ok(if outcome.failed {
            CycleOutcome::Incomplete
        } else {
            CycleOutcome::Complete
        })
    }

    /// Execute every directive in `job`: download, then pin, then delete
    async fn execute(&self, job: &Job) -> JobOutcome {
        let mut outcome = JobOutcome::default();

        if let Some(download) = job.download() {
            info!(url = download.url, filename = download.filename, "Got download job");

            match self.fetcher.fetch_or_pin(download.url, download.filename).await {
                Ok(stored) => {
                    outcome.downloaded = Some(stored);
                    outcome.record_success(JobKind::Download);
                }
                Err(e) => {
                    error!(url = download.url, error = %e, "Downloading file failed");
                    outcome.record_failure(JobKind::Download);
                }
            }
        }

        if let Some(reference) = job.pin() {
            info!(reference, "Got pin job");

            match pin_and_resolve(self.node.as_ref(), reference).await {
                Ok(pinned) => {
                    outcome.pinned = Some(pinned);
                    outcome.record_success(JobKind::Pin);
                }
                Err(e) => {
                    error!(reference, error = %e, "Pin add failed");
                    outcome.record_failure(JobKind::Pin);
                }
            }
        }

        if let Some(reference) = job.delete() {
            info!(reference, "Got delete job");

            match self.node.pin_remove(reference).await {
                Ok(()) => {
                    outcome.deleted = Some(reference.to_string());
                    outcome.record_success(JobKind::Delete);
                }
                Err(e) => {
                    error!(reference, error = %e, "Pin delete failed");
                    outcome.record_failure(JobKind::Delete);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Account, Coordinator, CoordinatorError, IDLE_MARKER};
    use crate::observability::Metrics;
    use crate::storage::memory::InMemoryNode;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Coordinator double that hands out one job and records every payload
    struct ScriptedCoordinator {
        job: Job,
        requests: Mutex<Vec<WorkRequest>>,
        reports: Mutex<Vec<WorkRequest>>,
        fail_reports: bool,
    }

    impl ScriptedCoordinator {
        fn new(job: Job) -> Self {
            Self {
                job,
                requests: Mutex::new(Vec::new()),
                reports: Mutex::new(Vec::new()),
                fail_reports: false,
            }
        }

        fn reports(&self) -> Vec<WorkRequest> {
            self.reports.lock().unwrap().clone()
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Coordinator for ScriptedCoordinator {
        async fn request_work(&self, request: &WorkRequest) -> crate::coordinator::Result<Job> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.job.clone())
        }

        async fn report(&self, report: &WorkRequest) -> crate::coordinator::Result<()> {
            self.reports.lock().unwrap().push(report.clone());
            if self.fail_reports {
                return Err(CoordinatorError::CoordinatorUnreachable {
                    endpoint: "response".to_string(),
                    attempts: 6,
                    reason: "unexpected EOF".to_string(),
                });
            }
            Ok(())
        }
    }

    fn worker(
        node: &Arc<InMemoryNode>,
        coordinator: &Arc<ScriptedCoordinator>,
        metrics: &Arc<Metrics>,
    ) -> Worker {
        Worker::new(
            node.clone(),
            coordinator.clone(),
            reqwest::Client::new(),
            Account {
                email: "host@example.com".to_string(),
                protocol_version: "0.6r".to_string(),
            },
            metrics.clone(),
        )
    }

    #[tokio::test]
    async fn test_idle_job_touches_nothing_else() {
        let node = Arc::new(InMemoryNode::new());
        let coordinator = Arc::new(ScriptedCoordinator::new(Job {
            message: Some(IDLE_MARKER.to_string()),
            ..Job::default()
        }));
        let metrics = Arc::new(Metrics::new());

        let outcome = worker(&node, &coordinator, &metrics).run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Idle);
        assert_eq!(coordinator.request_count(), 1);
        assert!(coordinator.reports().is_empty());
        assert!(node.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_failure_aborts_before_coordinator() {
        let node = Arc::new(InMemoryNode::new());
        node.fail("diag/sys");
        let coordinator = Arc::new(ScriptedCoordinator::new(Job::default()));
        let metrics = Arc::new(Metrics::new());

        let err = worker(&node, &coordinator, &metrics).run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::NodeStatus(_)));
        assert_eq!(coordinator.request_count(), 0);
        assert!(coordinator.reports().is_empty());
    }

    #[tokio::test]
    async fn test_every_directive_runs_despite_failures() {
        let node = Arc::new(InMemoryNode::new());
        let coordinator = Arc::new(ScriptedCoordinator::new(Job {
            // Nothing listens on port 1, so both download attempts fail
            download: Some("http://127.0.0.1:1/ep.mp3".to_string()),
            filename: Some("ep.mp3".to_string()),
            pin: Some("QmMissing".to_string()),
            delete: Some("QmOld".to_string()),
            ..Job::default()
        }));
        let metrics = Arc::new(Metrics::new());

        let outcome = worker(&node, &coordinator, &metrics).run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Incomplete);
        assert_eq!(
            node.calls(),
            vec!["pin_add QmMissing".to_string(), "pin_remove QmOld".to_string()]
        );

        let reports = coordinator.reports();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert!(report.error);
        assert!(report.downloaded.is_none());
        assert!(report.pinned.is_none());
        assert_eq!(report.deleted.as_deref(), Some("QmOld"));
        assert!(report.used.is_some());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.job(JobKind::Download).failed, 1);
        assert_eq!(snapshot.job(JobKind::Pin).failed, 1);
        assert_eq!(snapshot.job(JobKind::Delete).succeeded, 1);
    }

    #[tokio::test]
    async fn test_pin_and_delete_complete() {
        let node = Arc::new(InMemoryNode::new());
        node.make_reachable("QmDir", "QmFile", 5000);
        let coordinator = Arc::new(ScriptedCoordinator::new(Job {
            pin: Some("QmDir".to_string()),
            delete: Some("QmNeverPinned".to_string()),
            ..Job::default()
        }));
        let metrics = Arc::new(Metrics::new());

        let outcome = worker(&node, &coordinator, &metrics).run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Complete);
        assert!(node.is_pinned("QmDir"));

        let reports = coordinator.reports();
        let report = &reports[0];
        assert_eq!(report.pinned.as_deref(), Some("QmFile/QmDir"));
        assert_eq!(report.length, Some(5000));
        assert_eq!(report.deleted.as_deref(), Some("QmNeverPinned"));
        assert!(!report.error);
        assert_eq!(report.peers, 8);
    }

    #[tokio::test]
    async fn test_repo_stat_failure_still_reports() {
        let node = Arc::new(InMemoryNode::new());
        node.fail("repo/stat");
        let coordinator = Arc::new(ScriptedCoordinator::new(Job {
            delete: Some("QmOld".to_string()),
            ..Job::default()
        }));
        let metrics = Arc::new(Metrics::new());

        let outcome = worker(&node, &coordinator, &metrics).run_cycle().await.unwrap();

        assert_eq!(outcome, CycleOutcome::Complete);
        let reports = coordinator.reports();
        let report = &reports[0];
        assert!(report.used.is_none());
        assert!(report.avail.is_none());
    }

    #[tokio::test]
    async fn test_report_failure_fails_cycle() {
        let node = Arc::new(InMemoryNode::new());
        let mut scripted = ScriptedCoordinator::new(Job {
            delete: Some("QmOld".to_string()),
            ..Job::default()
        });
        scripted.fail_reports = true;
        let coordinator = Arc::new(scripted);
        let metrics = Arc::new(Metrics::new());

        let err = worker(&node, &coordinator, &metrics).run_cycle().await.unwrap_err();

        assert!(matches!(err, CycleError::Report(_)));
        // The attempt is still observed
        assert_eq!(metrics.snapshot().job(JobKind::Delete).succeeded, 1);
    }
}
