//! Root image resolution, deploy, and provenance recovery.

use linode_api::DeployDiskRequest;
use tracing::info;

use crate::credentials::Credentials;
use crate::remote::RemoteApi;
use crate::types::LinodeId;
use crate::{Error, Orchestrator, Result};

/// Where a root image comes from. Distribution and private image ids are
/// separate id spaces and never compared with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Distribution(i64),
    Private(i64),
}

impl ImageSource {
    pub fn id(&self) -> i64 {
        match *self {
            ImageSource::Distribution(id) | ImageSource::Private(id) => id,
        }
    }
}

/// Resolve `name` against distributions first, then private images.
///
/// Distributions match on exact label only. Private images match on exact
/// label or on the id written as a string. Private images are not listed
/// when a distribution matches.
pub async fn resolve_image(api: &dyn RemoteApi, name: &str) -> Result<ImageSource> {
    let distributions = api.distributions().await?;
    if let Some(d) = distributions.iter().find(|d| d.label == name) {
        return Ok(ImageSource::Distribution(d.id));
    }

    let images = api.images().await?;
    images
        .iter()
        .find(|i| i.label == name || i.id.to_string() == name)
        .map(|i| ImageSource::Private(i.id))
        .ok_or_else(|| Error::not_found("image", name))
}

/// Label written on a deployed root disk. The remote keeps no provenance of
/// its own, so read-back recovers the image id from this.
pub fn root_disk_label(linode_id: LinodeId, image: ImageSource) -> String {
    format!("Root({linode_id})__Base({})", image.id())
}

/// Image a root disk came from, recovered from its label.
///
/// Understands `Root(..)__Base(<id>)` and the older `<image> Disk` form.
pub fn image_provenance(label: &str) -> Option<String> {
    if let Some(start) = label.find("Base(") {
        let rest = &label[start + "Base(".len()..];
        let digits: &str = match rest.find(')') {
            Some(end) => &rest[..end],
            None => return None,
        };
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Some(digits.to_string());
        }
    }
    label
        .strip_suffix(" Disk")
        .filter(|image| !image.is_empty())
        .map(str::to_string)
}

/// Whether `desired` names the image a root disk was deployed from.
///
/// An id recovered from a `Base(<id>)` label is compared against `desired`
/// resolved to an id; the legacy form only carries a name. A desired image
/// that no longer resolves does not match.
pub async fn image_matches(api: &dyn RemoteApi, desired: &str, provenance: &str) -> Result<bool> {
    if desired == provenance {
        return Ok(true);
    }
    if !provenance.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    match resolve_image(api, desired).await {
        Ok(source) => Ok(source.id().to_string() == provenance),
        Err(Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Inputs for deploying the root disk.
#[derive(Debug, Clone, Copy)]
pub struct RootDisk<'a> {
    pub image: &'a str,
    /// Disk size in MB.
    pub size: i64,
    pub credentials: &'a Credentials,
}

impl Orchestrator {
    /// Deploy the root disk and wait for the deploy job.
    ///
    /// Returns the new disk id once the linode's jobs have drained.
    pub async fn deploy_image(&self, linode_id: LinodeId, root: RootDisk<'_>) -> Result<i64> {
        let source = resolve_image(self.api(), root.image).await?;
        let ssh_key = &root.credentials.ssh_key;
        let req = DeployDiskRequest {
            source_id: source.id(),
            label: root_disk_label(linode_id, source),
            size: root.size,
            root_pass: root.credentials.root_password.clone(),
            root_ssh_key: (!ssh_key.is_empty()).then(|| ssh_key.clone()),
        };

        let disk_id = match source {
            ImageSource::Distribution(_) => {
                self.api.create_disk_from_distribution(linode_id, &req).await?
            }
            ImageSource::Private(_) => self.api.create_disk_from_image(linode_id, &req).await?,
        };
        info!(%linode_id, disk_id, image = root.image, ?source, size = root.size, "root disk deploying");

        self.waiter
            .await_completion(self.api(), linode_id, self.timeouts.standard)
            .await?;
        Ok(disk_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mock::{Call, JobMode, MockRemote};

    fn creds() -> Credentials {
        Credentials {
            ssh_key: "ssh-ed25519 AAAA".into(),
            root_password: "hunter2".into(),
        }
    }

    #[tokio::test]
    async fn distribution_wins_over_private_image() {
        let mock = MockRemote::with_catalog();
        // "Debian 9" is both distribution 140 and private image 4002.
        let source = resolve_image(&mock, "Debian 9").await.unwrap();
        assert_eq!(source, ImageSource::Distribution(140));
        assert_eq!(mock.count(|c| matches!(c, Call::Images)), 0);
    }

    #[tokio::test]
    async fn private_image_by_label_or_id() {
        let mock = MockRemote::with_catalog();
        assert_eq!(
            resolve_image(&mock, "golden-web").await.unwrap(),
            ImageSource::Private(4001)
        );
        assert_eq!(
            resolve_image(&mock, "4002").await.unwrap(),
            ImageSource::Private(4002)
        );
    }

    #[tokio::test]
    async fn distribution_ids_are_not_matched_as_strings() {
        let mock = MockRemote::with_catalog();
        let err = resolve_image(&mock, "140").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "image", .. }));
    }

    #[test]
    fn label_round_trip() {
        let label = root_disk_label(LinodeId(8098), ImageSource::Private(4001));
        assert_eq!(label, "Root(8098)__Base(4001)");
        assert!(label.len() <= 50);
        assert_eq!(image_provenance(&label).as_deref(), Some("4001"));
    }

    #[test]
    fn provenance_forms() {
        assert_eq!(image_provenance("Debian 9 Disk").as_deref(), Some("Debian 9"));
        assert_eq!(image_provenance("Root(1)__Base()"), None);
        assert_eq!(image_provenance("Root(1)__Base(12"), None);
        assert_eq!(image_provenance("swap"), None);
        assert_eq!(image_provenance(" Disk"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_labels_disk_and_waits() {
        let mock = Arc::new(MockRemote::with_catalog());
        let id = mock.seed_linode(2, 1);
        mock.set_jobs(JobMode::PendingFor(2));
        let orchestrator = mock.orchestrator();

        let disk_id = orchestrator
            .deploy_image(
                id,
                RootDisk {
                    image: "golden-web",
                    size: 19968,
                    credentials: &creds(),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            mock.mutations(),
            vec![Call::DeployImage {
                linode_id: id,
                image_id: 4001,
                label: format!("Root({id})__Base(4001)"),
                size: 19968,
            }]
        );
        assert_eq!(mock.disks(id)[0].id, disk_id);
        assert_eq!(mock.count(|c| matches!(c, Call::ListJobs { .. })), 3);
    }

    #[tokio::test]
    async fn unknown_image_deploys_nothing() {
        let mock = Arc::new(MockRemote::with_catalog());
        let id = mock.seed_linode(2, 1);
        let orchestrator = mock.orchestrator();

        let err = orchestrator
            .deploy_image(
                id,
                RootDisk {
                    image: "Plan 9",
                    size: 1024,
                    credentials: &creds(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
        assert!(mock.mutations().is_empty());
    }
}
