//! Waiting for a linode's job queue to drain.

use std::time::Duration;

use tracing::debug;

use crate::remote::RemoteApi;
use crate::types::LinodeId;
use crate::{Error, Result};

/// Budget for ordinary provisioning and boot operations.
pub const STANDARD_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Resize jobs run roughly 1-3 minutes per GB; budget for the slow end.
pub const RESIZE_PER_GB: Duration = Duration::from_secs(3 * 60);

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wait budgets used by the create and update paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub standard: Duration,
    pub resize_per_gb: Duration,
}

impl Timeouts {
    /// Budget for a resize of a linode with `total_storage_mb` of storage.
    ///
    /// Counted in whole GB, never less than one.
    pub fn resize_budget(&self, total_storage_mb: i64) -> Duration {
        let gb = (total_storage_mb / 1024).max(1);
        self.resize_per_gb * u32::try_from(gb).unwrap_or(u32::MAX)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            standard: STANDARD_DEADLINE,
            resize_per_gb: RESIZE_PER_GB,
        }
    }
}

/// Polls the job list of one linode until every job reports a finish time.
#[derive(Debug, Clone, Copy)]
pub struct JobWaiter {
    poll_interval: Duration,
}

impl JobWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Resolve once all jobs are finished, or fail with [`Error::Timeout`]
    /// after `deadline`.
    ///
    /// A timeout says nothing about the remote job itself, which keeps
    /// running. Errors from listing jobs are returned as-is. Dropping the
    /// future stops the wait.
    pub async fn await_completion(
        &self,
        api: &dyn RemoteApi,
        linode_id: LinodeId,
        deadline: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(deadline, self.poll(api, linode_id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                linode_id,
                waited: deadline,
            }),
        }
    }

    async fn poll(&self, api: &dyn RemoteApi, linode_id: LinodeId) -> Result<()> {
        loop {
            let jobs = api.list_jobs(linode_id).await?;
            let pending = jobs.iter().filter(|j| !j.is_finished()).count();
            if pending == 0 {
                return Ok(());
            }
            debug!(%linode_id, pending, "waiting for jobs");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Default for JobWaiter {
    fn default() -> Self {
        Self::new(POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::mock::{Call, JobMode, MockRemote};

    #[tokio::test(start_paused = true)]
    async fn completed_jobs_return_without_sleeping() {
        let mock = MockRemote::new();
        let start = Instant::now();

        JobWaiter::default()
            .await_completion(&mock, LinodeId(7), STANDARD_DEADLINE)
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(mock.count(|c| matches!(c, Call::ListJobs { .. })), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_jobs_are_polled_each_interval() {
        let mock = MockRemote::new();
        mock.set_jobs(JobMode::PendingFor(3));
        let start = Instant::now();

        JobWaiter::default()
            .await_completion(&mock, LinodeId(7), STANDARD_DEADLINE)
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(mock.count(|c| matches!(c, Call::ListJobs { .. })), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_job_times_out_at_deadline() {
        let mock = MockRemote::new();
        mock.set_jobs(JobMode::Stuck);
        let start = Instant::now();
        let deadline = Duration::from_secs(5);

        let err = JobWaiter::default()
            .await_completion(&mock, LinodeId(7), deadline)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Timeout { linode_id: LinodeId(7), waited } if waited == deadline
        ));
        assert_eq!(start.elapsed(), deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn list_errors_are_not_retried() {
        let mock = MockRemote::new();
        mock.fail_on("list_jobs");

        let err = JobWaiter::default()
            .await_completion(&mock, LinodeId(7), STANDARD_DEADLINE)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Remote(_)));
        assert_eq!(mock.count(|c| matches!(c, Call::ListJobs { .. })), 1);
    }

    #[test]
    fn resize_budget_scales_with_storage() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.resize_budget(20480), Duration::from_secs(20 * 180));
        assert_eq!(timeouts.resize_budget(10240 + 512), Duration::from_secs(10 * 180));
        assert_eq!(timeouts.resize_budget(512), Duration::from_secs(180));
    }
}
