//! Job status and progress, derived from item outcomes.
//!
//! [`derive_status`] is pure: it never touches storage. Callers persist the
//! returned transition with a compare-and-set update, so concurrent pollers
//! converge on the same forward-only state.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::job::{
    AnalysisJob, ItemStatus, JobItem, JobProfile, JobStatus, JobTransition, JobType,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub processing: usize,
    pub pending: usize,
}

impl JobProgress {
    pub fn from_items(items: &[JobItem]) -> Self {
        let mut progress = JobProgress {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Completed => progress.completed += 1,
                ItemStatus::Failed => progress.failed += 1,
                ItemStatus::Skipped => progress.skipped += 1,
                ItemStatus::Processing => progress.processing += 1,
                ItemStatus::Pending => progress.pending += 1,
            }
        }
        progress
    }

    /// Items in a terminal state.
    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.processed() == self.total
    }

    /// Item-level percentage. A job with no items is either done (100) or
    /// has nothing to show yet (0).
    pub fn percentage(&self, status: JobStatus) -> f64 {
        if self.total == 0 {
            return if status == JobStatus::Completed { 100.0 } else { 0.0 };
        }
        self.processed() as f64 / self.total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusDerivation {
    pub progress: JobProgress,
    pub transition: Option<JobTransition>,
}

/// Compute the job's progress and the forward transition, if any, its items
/// call for.
///
/// `stale_after` fails a job that is neither finished nor terminal once no
/// activity has been seen on it or its items for that long.
pub fn derive_status(
    job: &AnalysisJob,
    items: &[JobItem],
    now: DateTime<Utc>,
    stale_after: Option<Duration>,
) -> StatusDerivation {
    let progress = JobProgress::from_items(items);

    if job.status.is_terminal() {
        return StatusDerivation {
            progress,
            transition: None,
        };
    }

    let transition = if progress.is_finished() {
        Some(JobTransition {
            started_at: Some(now),
            completed_at: Some(now),
            ..JobTransition::to(JobStatus::Completed)
        })
    } else if job.status == JobStatus::Pending
        && (progress.processed() > 0 || progress.processing > 0)
    {
        Some(JobTransition {
            started_at: Some(now),
            ..JobTransition::to(JobStatus::Processing)
        })
    } else {
        stale_after
            .filter(|limit| now - last_activity(job, items) > *limit)
            .map(|limit| JobTransition {
                error_message: Some(format!(
                    "No progress for {} seconds; {} of {} items finished",
                    limit.num_seconds(),
                    progress.processed(),
                    progress.total
                )),
                completed_at: Some(now),
                ..JobTransition::to(JobStatus::Failed)
            })
    };

    StatusDerivation {
        progress,
        transition,
    }
}

fn last_activity(job: &AnalysisJob, items: &[JobItem]) -> DateTime<Utc> {
    items
        .iter()
        .flat_map(|item| [Some(item.created_at), item.started_at, item.completed_at])
        .flatten()
        .chain([job.created_at, job.updated_at])
        .chain(job.started_at)
        .max()
        .unwrap_or(job.updated_at)
}

/// What a status query returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub job_type: JobType,
    pub profile: JobProfile,
    pub status: JobStatus,
    pub progress_percentage: f64,
    pub completed_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    pub processing_items: usize,
    pub pending_items: usize,
    pub total_items: usize,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatusReport {
    pub fn new(job: &AnalysisJob, progress: &JobProgress) -> Self {
        Self {
            job_id: job.id,
            project_id: job.project_id,
            job_type: job.job_type,
            profile: job.profile,
            status: job.status,
            progress_percentage: progress.percentage(job.status),
            completed_items: progress.completed,
            failed_items: progress.failed,
            skipped_items: progress.skipped,
            processing_items: progress.processing,
            pending_items: progress.pending,
            total_items: progress.total,
            error_message: job.error_message.clone(),
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::AnalysisTask;

    fn job(status: JobStatus) -> AnalysisJob {
        let now = Utc::now();
        AnalysisJob {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            job_type: JobType::QualityAnalysis,
            profile: JobProfile::ScoringOnly,
            status,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn items(job: &AnalysisJob, statuses: &[ItemStatus]) -> Vec<JobItem> {
        statuses
            .iter()
            .map(|&status| JobItem {
                id: Uuid::new_v4(),
                job_id: job.id,
                image_id: Uuid::new_v4(),
                task: AnalysisTask::QualityAssessment,
                status,
                error_message: None,
                processing_time_ms: None,
                retry_count: 0,
                started_at: None,
                completed_at: None,
                created_at: job.created_at,
            })
            .collect()
    }

    #[test]
    fn test_all_items_done_completes_job() {
        let mut j = job(JobStatus::Pending);
        let its = items(&j, &[ItemStatus::Completed, ItemStatus::Completed]);
        let now = Utc::now();

        let derived = derive_status(&j, &its, now, None);
        let transition = derived.transition.expect("should complete");
        assert_eq!(transition.to, JobStatus::Completed);
        assert_eq!(transition.completed_at, Some(now));

        j.apply(&transition, now);
        let report = JobStatusReport::new(&j, &derived.progress);
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.progress_percentage, 100.0);
        assert_eq!(report.completed_items, 2);
        assert_eq!(report.total_items, 2);
    }

    #[test]
    fn test_failed_and_skipped_items_count_as_processed() {
        let j = job(JobStatus::Processing);
        let its = items(
            &j,
            &[ItemStatus::Completed, ItemStatus::Failed, ItemStatus::Skipped],
        );

        let derived = derive_status(&j, &its, Utc::now(), None);
        assert_eq!(derived.progress.processed(), 3);
        assert_eq!(derived.transition.map(|t| t.to), Some(JobStatus::Completed));
    }

    #[test]
    fn test_first_activity_moves_pending_to_processing() {
        let j = job(JobStatus::Pending);
        let its = items(&j, &[ItemStatus::Processing, ItemStatus::Pending]);
        let now = Utc::now();

        let transition = derive_status(&j, &its, now, None).transition.unwrap();
        assert_eq!(transition.to, JobStatus::Processing);
        assert_eq!(transition.started_at, Some(now));
        assert_eq!(transition.completed_at, None);
    }

    #[test]
    fn test_untouched_job_stays_put() {
        let j = job(JobStatus::Pending);
        let its = items(&j, &[ItemStatus::Pending, ItemStatus::Pending]);
        let derived = derive_status(&j, &its, Utc::now(), None);
        assert!(derived.transition.is_none());
        assert_eq!(derived.progress.percentage(j.status), 0.0);
    }

    #[test]
    fn test_processing_job_with_more_progress_does_not_rewrite() {
        let j = job(JobStatus::Processing);
        let its = items(&j, &[ItemStatus::Completed, ItemStatus::Pending]);
        let derived = derive_status(&j, &its, Utc::now(), None);
        assert!(derived.transition.is_none());
        assert_eq!(derived.progress.percentage(j.status), 50.0);
    }

    #[test]
    fn test_terminal_job_never_moves() {
        for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            let j = job(status);
            let its = items(&j, &[ItemStatus::Completed]);
            let much_later = Utc::now() + Duration::days(30);
            assert!(derive_status(&j, &its, much_later, Some(Duration::seconds(1)))
                .transition
                .is_none());
        }
    }

    #[test]
    fn test_derivation_is_idempotent_after_applying() {
        let mut j = job(JobStatus::Pending);
        let its = items(&j, &[ItemStatus::Completed, ItemStatus::Completed]);
        let now = Utc::now();

        let first = derive_status(&j, &its, now, None);
        j.apply(first.transition.as_ref().unwrap(), now);

        let second = derive_status(&j, &its, now, None);
        assert!(second.transition.is_none());
        assert_eq!(
            JobStatusReport::new(&j, &first.progress),
            JobStatusReport::new(&j, &second.progress)
        );
    }

    #[test]
    fn test_zero_items_reports_by_job_status() {
        let pending = job(JobStatus::Pending);
        let derived = derive_status(&pending, &[], Utc::now(), None);
        assert!(derived.transition.is_none());
        assert_eq!(derived.progress.percentage(pending.status), 0.0);

        let done = job(JobStatus::Completed);
        assert_eq!(JobProgress::default().percentage(done.status), 100.0);
    }

    #[test]
    fn test_stale_job_fails_after_timeout() {
        let j = job(JobStatus::Processing);
        let its = items(&j, &[ItemStatus::Completed, ItemStatus::Pending]);
        let later = j.updated_at + Duration::hours(25);

        let transition = derive_status(&j, &its, later, Some(Duration::hours(24)))
            .transition
            .unwrap();
        assert_eq!(transition.to, JobStatus::Failed);
        assert!(transition
            .error_message
            .as_deref()
            .unwrap()
            .contains("1 of 2 items finished"));

        let within = j.updated_at + Duration::hours(23);
        assert!(derive_status(&j, &its, within, Some(Duration::hours(24)))
            .transition
            .is_none());
    }

    #[test]
    fn test_recent_item_activity_keeps_job_alive() {
        let j = job(JobStatus::Processing);
        let mut its = items(&j, &[ItemStatus::Completed, ItemStatus::Pending]);
        its[0].completed_at = Some(j.updated_at + Duration::hours(20));

        let later = j.updated_at + Duration::hours(25);
        assert!(derive_status(&j, &its, later, Some(Duration::hours(24)))
            .transition
            .is_none());
    }

    #[test]
    fn test_progress_never_decreases_as_items_finish() {
        let j = job(JobStatus::Processing);
        let mut its = items(&j, &[ItemStatus::Pending; 4]);
        let mut last = 0.0;

        for i in 0..its.len() {
            its[i].status = if i % 2 == 0 {
                ItemStatus::Completed
            } else {
                ItemStatus::Failed
            };
            let pct = JobProgress::from_items(&its).percentage(j.status);
            assert!(pct >= last);
            last = pct;
        }
        assert_eq!(last, 100.0);
    }
}
