pub mod catalog;
pub mod config;
pub mod credentials;
pub mod image;
pub mod jobs;
pub mod linode;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod provision;
pub mod readback;
pub mod reconcile;
pub mod remote;
pub mod types;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::jobs::{JobWaiter, Timeouts};
use crate::remote::RemoteApi;
use crate::types::LinodeId;

pub use crate::provision::{ProvisionError, ProvisionProgress, ProvisionStep};
pub use crate::reconcile::{AppliedChange, ReconcileError, ReconcileStep};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The remote job may still finish after this is returned.
    #[error("jobs for linode {linode_id} did not complete within {waited:?}")]
    Timeout { linode_id: LinodeId, waited: Duration },

    #[error("remote error: {0}")]
    Remote(#[from] linode_api::Error),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("invalid value for env var {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid id: {0}")]
    InvalidId(String),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A multi-step run that stopped part way.
///
/// `committed` holds whatever the run had already applied remotely when
/// `step` failed; nothing is rolled back.
#[derive(Debug)]
pub struct Interrupted<S, C> {
    pub step: S,
    pub committed: C,
    pub source: Error,
}

impl<S: fmt::Display, C> fmt::Display for Interrupted<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.source)
    }
}

impl<S, C> std::error::Error for Interrupted<S, C>
where
    S: fmt::Display + fmt::Debug,
    C: fmt::Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Tags an error with the step it came from.
pub(crate) fn at<S>(step: S) -> impl FnOnce(Error) -> (S, Error) {
    move |e| (step, e)
}

/// Drives a single linode through create, read, reconcile and delete.
///
/// Owns the reference catalog for its lifetime, so lookups are fetched once
/// per orchestrator and shared by every run it executes.
pub struct Orchestrator {
    api: Arc<dyn RemoteApi>,
    catalog: Catalog,
    waiter: JobWaiter,
    timeouts: Timeouts,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn RemoteApi>, waiter: JobWaiter, timeouts: Timeouts) -> Self {
        Self {
            api,
            catalog: Catalog::new(),
            waiter,
            timeouts,
        }
    }

    /// Build against the live Linode API using env configuration.
    ///
    /// See [`Settings::from_env`] for the variables read.
    pub fn from_env() -> Result<Self> {
        let settings = Settings::from_env()?;
        let client = linode_api::LinodeClient::with_base_url(&settings.api_key, &settings.api_url);
        info!(api_url = %client.base_url(), "linode orchestrator configured");

        Ok(Self::new(
            Arc::new(client),
            JobWaiter::new(settings.poll_interval),
            settings.timeouts(),
        ))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn api(&self) -> &dyn RemoteApi {
        self.api.as_ref()
    }

    /// Delete the linode. Disks, configs and IPs go with it remotely.
    pub async fn destroy(&self, linode_id: LinodeId) -> Result<()> {
        self.api.delete_linode(linode_id).await?;
        info!(%linode_id, "linode destroyed");
        Ok(())
    }

    async fn fetch_linode(&self, linode_id: LinodeId) -> Result<linode_api::Linode> {
        self.api
            .get_linode(linode_id)
            .await?
            .ok_or_else(|| Error::not_found("linode", linode_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockRemote};

    #[tokio::test]
    async fn destroy_issues_single_delete() {
        let mock = Arc::new(MockRemote::with_catalog());
        let id = mock.seed_linode(2, 2);
        let orchestrator = mock.orchestrator();

        orchestrator.destroy(id).await.unwrap();

        assert_eq!(mock.mutations(), vec![Call::DeleteLinode { linode_id: id }]);
        assert!(mock.linode(id).is_none());
    }

    #[test]
    fn interrupted_display_names_step() {
        let err = Interrupted {
            step: ProvisionStep::CreateSwap,
            committed: ProvisionProgress::default(),
            source: Error::Constraint("no room".into()),
        };
        assert_eq!(
            err.to_string(),
            "creating swap disk failed: constraint violated: no room"
        );
    }
}
