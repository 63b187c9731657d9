use crate::coordinator::WorkRequest;
use crate::fetch::StoredContent;
use crate::observability::Observer;
use std::fmt;
use std::time::Duration;

/// Kind of directive a job carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Download,
    Pin,
    Delete,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Download, JobKind::Pin, JobKind::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Download => "download",
            JobKind::Pin => "pin",
            JobKind::Delete => "delete",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing one job, built during a cycle and then discarded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub downloaded: Option<StoredContent>,
    pub pinned: Option<StoredContent>,
    pub deleted: Option<String>,
    /// Set when any directive failed
    pub failed: bool,
    /// Directives attempted, in execution order, with their success
    pub attempts: Vec<(JobKind, bool)>,
}

impl JobOutcome {
    pub(crate) fn record_failure(&mut self, kind: JobKind) {
        self.failed = true;
        self.attempts.push((kind, false));
    }

    pub(crate) fn record_success(&mut self, kind: JobKind) {
        self.attempts.push((kind, true));
    }

    /// Copy the outcome into the report payload
    ///
    /// The protocol has one length field; when both a download and a pin
    /// succeed the pin's length wins.
    pub fn apply_to(&self, report: &mut WorkRequest) {
        if let Some(downloaded) = &self.downloaded {
            report.downloaded = Some(downloaded.reference.clone());
            report.length = Some(downloaded.length);
        }
        if let Some(pinned) = &self.pinned {
            report.pinned = Some(pinned.reference.clone());
            report.length = Some(pinned.length);
        }
        if let Some(deleted) = &self.deleted {
            report.deleted = Some(deleted.clone());
        }
        report.error = self.failed;
    }

    pub(crate) fn observe(&self, observer: &dyn Observer, duration: Duration) {
        for (kind, success) in &self.attempts {
            observer.job_finished(*kind, *success, duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(reference: &str, length: u64) -> StoredContent {
        StoredContent {
            reference: reference.to_string(),
            length,
        }
    }

    #[test]
    fn test_apply_download_outcome() {
        let outcome = JobOutcome {
            downloaded: Some(stored("A/B", 1000)),
            ..JobOutcome::default()
        };

        let mut report = WorkRequest::default();
        outcome.apply_to(&mut report);

        assert_eq!(report.downloaded.as_deref(), Some("A/B"));
        assert_eq!(report.length, Some(1000));
        assert!(!report.error);
        assert!(report.pinned.is_none());
    }

    #[test]
    fn test_pin_length_wins_over_download() {
        let outcome = JobOutcome {
            downloaded: Some(stored("A/B", 1000)),
            pinned: Some(stored("C/D", 2000)),
            deleted: Some("QmOld".to_string()),
            ..JobOutcome::default()
        };

        let mut report = WorkRequest::default();
        outcome.apply_to(&mut report);

        assert_eq!(report.length, Some(2000));
        assert_eq!(report.pinned.as_deref(), Some("C/D"));
        assert_eq!(report.deleted.as_deref(), Some("QmOld"));
    }

    #[test]
    fn test_failure_sets_error_flag() {
        let mut outcome = JobOutcome::default();
        outcome.record_success(JobKind::Delete);
        outcome.record_failure(JobKind::Pin);

        let mut report = WorkRequest::default();
        outcome.apply_to(&mut report);

        assert!(report.error);
        assert_eq!(
            outcome.attempts,
            vec![(JobKind::Delete, true), (JobKind::Pin, false)]
        );
    }
}
