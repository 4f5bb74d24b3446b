//! Create path: allocate a linode and bring it to running with the desired
//! disks, boot config and network.

use std::fmt;

use linode_api::{CreateConfigRequest, CreateDiskRequest, Disk};
use serde::Serialize;
use tracing::{info, warn};

use crate::image::RootDisk;
use crate::reconcile::identity_changes;
use crate::types::{DesiredState, LinodeId, ObservedState};
use crate::{Error, Interrupted, Orchestrator, at};

/// Boot config device slot of the root disk.
const ROOT_DEVICE_NUM: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    ResolvePlacement,
    CreateInstance,
    CreateSwap,
    FetchInstance,
    ApplyIdentity,
    DeployImage,
    AllocatePrivateIp,
    ClassifyDisks,
    ResolveKernel,
    CreateConfig,
    Boot,
    AwaitBoot,
    ReadBack,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionStep::ResolvePlacement => "resolving region and plan",
            ProvisionStep::CreateInstance => "creating linode",
            ProvisionStep::CreateSwap => "creating swap disk",
            ProvisionStep::FetchInstance => "fetching linode",
            ProvisionStep::ApplyIdentity => "applying label and group",
            ProvisionStep::DeployImage => "deploying root image",
            ProvisionStep::AllocatePrivateIp => "allocating private address",
            ProvisionStep::ClassifyDisks => "classifying disks",
            ProvisionStep::ResolveKernel => "resolving kernel",
            ProvisionStep::CreateConfig => "creating boot config",
            ProvisionStep::Boot => "booting",
            ProvisionStep::AwaitBoot => "waiting for boot",
            ProvisionStep::ReadBack => "reading back state",
        };
        f.write_str(s)
    }
}

/// Remote resources a provisioning run has committed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionProgress {
    pub linode_id: Option<LinodeId>,
    pub datacenter_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub swap_disk_id: Option<i64>,
    pub root_disk_id: Option<i64>,
    pub private_ip_address: Option<String>,
    pub config_id: Option<i64>,
}

pub type ProvisionError = Interrupted<ProvisionStep, ProvisionProgress>;

type StepResult<T> = std::result::Result<T, (ProvisionStep, Error)>;

/// Root and optional swap disk of a freshly provisioned linode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskLayout {
    pub root: i64,
    pub swap: Option<i64>,
}

impl DiskLayout {
    /// Split `disks` into root and swap. Exactly one non-swap disk is
    /// required, and a swap disk exactly when `expect_swap`.
    pub fn classify(disks: &[Disk], expect_swap: bool) -> crate::Result<Self> {
        let expected = 1 + usize::from(expect_swap);
        if disks.len() != expected {
            return Err(Error::InvariantViolation(format!(
                "expected {expected} disks, found {}",
                disks.len()
            )));
        }

        let mut root = None;
        let mut swap = None;
        for disk in disks {
            let slot = if disk.is_swap() { &mut swap } else { &mut root };
            if slot.replace(disk.id).is_some() {
                return Err(Error::InvariantViolation(format!(
                    "more than one {} disk",
                    if disk.is_swap() { "swap" } else { "root" }
                )));
            }
        }

        match root {
            Some(root) if swap.is_some() == expect_swap => Ok(Self { root, swap }),
            _ => Err(Error::InvariantViolation(format!(
                "unexpected disk types: {}",
                disks.iter().map(|d| d.kind.as_str()).collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Boot device order, root first.
    pub fn boot_devices(&self) -> Vec<i64> {
        std::iter::once(self.root).chain(self.swap).collect()
    }
}

impl Orchestrator {
    /// Create a linode matching `desired` and return its observed state.
    ///
    /// Steps run strictly in order and nothing is rolled back. On failure the
    /// error carries the step and every resource already created, including
    /// the linode id once it exists.
    pub async fn provision(
        &self,
        desired: &DesiredState,
    ) -> std::result::Result<ObservedState, ProvisionError> {
        let mut progress = ProvisionProgress::default();
        match self.run_provision(desired, &mut progress).await {
            Ok(observed) => Ok(observed),
            Err((step, source)) => {
                warn!(linode_id = ?progress.linode_id, %step, error = %source, "provisioning interrupted");
                Err(Interrupted {
                    step,
                    committed: progress,
                    source,
                })
            }
        }
    }

    async fn run_provision(
        &self,
        desired: &DesiredState,
        progress: &mut ProvisionProgress,
    ) -> StepResult<ObservedState> {
        use ProvisionStep::*;

        if desired.swap_size < 0 {
            return Err((
                ResolvePlacement,
                Error::Constraint(format!("swap size {} is negative", desired.swap_size)),
            ));
        }
        let datacenter_id = self
            .catalog
            .region_id(self.api(), &desired.region)
            .await
            .map_err(at(ResolvePlacement))?;
        let plan_id = self
            .catalog
            .plan_id(self.api(), desired.size)
            .await
            .map_err(at(ResolvePlacement))?;

        let linode_id = self
            .api
            .create_linode(datacenter_id, plan_id)
            .await
            .map_err(at(CreateInstance))?;
        progress.linode_id = Some(linode_id);
        progress.datacenter_id = Some(datacenter_id);
        progress.plan_id = Some(plan_id);
        info!(%linode_id, datacenter_id, plan_id, "linode created");

        if desired.swap_size > 0 {
            let req = CreateDiskRequest {
                label: "swap".into(),
                kind: "swap".into(),
                size: desired.swap_size,
            };
            let disk_id = self
                .api
                .create_disk(linode_id, &req)
                .await
                .map_err(at(CreateSwap))?;
            progress.swap_disk_id = Some(disk_id);
            info!(%linode_id, disk_id, size = desired.swap_size, "swap disk created");
        }

        let linode = self.fetch_linode(linode_id).await.map_err(at(FetchInstance))?;

        let identity = identity_changes(desired, &linode.label, &linode.display_group);
        if !identity.is_empty() {
            self.api
                .update_linode(linode_id, &identity)
                .await
                .map_err(at(ApplyIdentity))?;
            info!(%linode_id, label = ?identity.label, group = ?identity.display_group, "linode identity applied");
        }

        let root_size = linode.total_hd - desired.swap_size;
        if root_size <= 0 {
            return Err((
                DeployImage,
                Error::Constraint(format!(
                    "swap size {} MB leaves no room in {} MB of storage",
                    desired.swap_size, linode.total_hd
                )),
            ));
        }
        let root_disk_id = self
            .deploy_image(
                linode_id,
                RootDisk {
                    image: &desired.image,
                    size: root_size,
                    credentials: &desired.credentials,
                },
            )
            .await
            .map_err(at(DeployImage))?;
        progress.root_disk_id = Some(root_disk_id);

        if desired.private_networking {
            let address = self
                .api
                .add_private_ip(linode_id)
                .await
                .map_err(at(AllocatePrivateIp))?;
            info!(%linode_id, %address, "private address allocated");
            progress.private_ip_address = Some(address);
        }

        let disks = self.api.list_disks(linode_id).await.map_err(at(ClassifyDisks))?;
        let layout =
            DiskLayout::classify(&disks, desired.swap_size > 0).map_err(at(ClassifyDisks))?;

        let kernel_id = self
            .catalog
            .kernel_id(self.api(), &desired.kernel)
            .await
            .map_err(at(ResolveKernel))?;

        let req = CreateConfigRequest {
            kernel_id,
            label: desired.image.clone(),
            disks: layout.boot_devices(),
            root_device_num: ROOT_DEVICE_NUM,
            helper_distro: desired.helper_distro,
            helper_network: desired.manage_private_ip_automatically,
        };
        let config_id = self
            .api
            .create_config(linode_id, &req)
            .await
            .map_err(at(CreateConfig))?;
        progress.config_id = Some(config_id);
        info!(%linode_id, config_id, kernel_id, disks = ?req.disks, "boot config created");

        self.api
            .boot_linode(linode_id, Some(config_id))
            .await
            .map_err(at(Boot))?;
        self.waiter
            .await_completion(self.api(), linode_id, self.timeouts.standard)
            .await
            .map_err(at(AwaitBoot))?;
        info!(%linode_id, "linode provisioned");

        let mut observed = self.read(linode_id).await.map_err(at(ReadBack))?;
        observed.credentials = Some(desired.credentials.fingerprints());
        Ok(observed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::credentials::Credentials;
    use crate::mock::{Call, MockRemote};
    use crate::types::InstanceStatus;

    fn desired(swap_size: i64) -> DesiredState {
        DesiredState {
            image: "Debian 9".into(),
            kernel: "Latest 64 bit".into(),
            name: "web1".into(),
            group: "Linode".into(),
            region: "Dallas, TX, USA".into(),
            size: 1024,
            private_networking: false,
            manage_private_ip_automatically: true,
            helper_distro: true,
            disk_expansion: false,
            swap_size,
            credentials: Credentials {
                ssh_key: "ssh-ed25519 AAAA".into(),
                root_password: "hunter2".into(),
            },
        }
    }

    fn disk(id: i64, kind: &str) -> Disk {
        Disk {
            id,
            label: kind.into(),
            kind: kind.into(),
            size: 512,
        }
    }

    fn created_config(mock: &MockRemote) -> Call {
        mock.calls()
            .into_iter()
            .find(|c| matches!(c, Call::CreateConfig { .. }))
            .unwrap()
    }

    #[test]
    fn classify_orders_root_first() {
        let layout = DiskLayout::classify(&[disk(2, "swap"), disk(1, "ext4")], true).unwrap();
        assert_eq!(layout.boot_devices(), vec![1, 2]);

        let layout = DiskLayout::classify(&[disk(1, "ext4")], false).unwrap();
        assert_eq!(layout.boot_devices(), vec![1]);
    }

    #[test]
    fn classify_rejects_unexpected_cardinality() {
        for (disks, swap) in [
            (vec![disk(1, "ext4")], true),
            (vec![disk(1, "ext4"), disk(2, "ext4")], true),
            (vec![disk(1, "swap")], false),
            (vec![], false),
        ] {
            assert!(matches!(
                DiskLayout::classify(&disks, swap),
                Err(Error::InvariantViolation(_))
            ));
        }
    }

    #[tokio::test]
    async fn swap_disk_goes_second() {
        let mock = Arc::new(MockRemote::with_catalog());
        let orchestrator = mock.orchestrator();

        let observed = orchestrator.provision(&desired(512)).await.unwrap();
        let id = observed.linode_id;

        let disks = mock.disks(id);
        let swap = disks.iter().find(|d| d.is_swap()).unwrap();
        let root = disks.iter().find(|d| !d.is_swap()).unwrap();
        assert_eq!(root.size, 20480 - 512);
        assert_eq!(root.label, format!("Root({id})__Base(140)"));

        let Call::CreateConfig {
            disks,
            root_device_num,
            kernel_id,
            helper_distro,
            helper_network,
            ..
        } = created_config(&mock)
        else {
            unreachable!()
        };
        assert_eq!(disks, vec![root.id, swap.id]);
        assert_eq!(root_device_num, 1);
        assert_eq!(kernel_id, 138);
        assert!(helper_distro && helper_network);

        assert_eq!(observed.swap_size, 512);
        assert_eq!(observed.status, InstanceStatus::Running);
        assert_eq!(observed.kernel.as_deref(), Some("Latest 64 bit"));
        assert_eq!(observed.image_id.as_deref(), Some("140"));
    }

    #[tokio::test]
    async fn no_swap_boots_single_device() {
        let mock = Arc::new(MockRemote::with_catalog());
        let orchestrator = mock.orchestrator();

        let observed = orchestrator.provision(&desired(0)).await.unwrap();

        assert_eq!(mock.count(|c| matches!(c, Call::CreateDisk { .. })), 0);
        let Call::CreateConfig { disks, .. } = created_config(&mock) else {
            unreachable!()
        };
        assert_eq!(disks.len(), 1);
        assert_eq!(mock.disks(observed.linode_id)[0].size, 20480);
        assert_eq!(observed.swap_size, 0);
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let mock = Arc::new(MockRemote::with_catalog());
        let orchestrator = mock.orchestrator();

        let mut want = desired(256);
        want.private_networking = true;
        let id = orchestrator.provision(&want).await.unwrap().linode_id;

        let kinds: Vec<&str> = mock
            .mutations()
            .iter()
            .map(|c| match c {
                Call::CreateLinode { .. } => "create",
                Call::CreateDisk { .. } => "swap",
                Call::UpdateLinode { .. } => "identity",
                Call::DeployDistribution { .. } => "deploy",
                Call::AddPrivateIp { .. } => "private_ip",
                Call::CreateConfig { .. } => "config",
                Call::BootLinode { .. } => "boot",
                other => panic!("unexpected mutation {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            ["create", "swap", "identity", "deploy", "private_ip", "config", "boot"]
        );

        let linode = mock.linode(id).unwrap();
        assert_eq!(linode.label, "web1");
        assert_eq!(linode.display_group, "Linode");
    }

    #[tokio::test]
    async fn private_networking_is_read_back() {
        let mock = Arc::new(MockRemote::with_catalog());
        let orchestrator = mock.orchestrator();

        let mut want = desired(512);
        want.private_networking = true;
        let observed = orchestrator.provision(&want).await.unwrap();

        assert!(observed.private_networking);
        assert!(
            observed
                .private_ip_address
                .as_deref()
                .is_some_and(|a| a.starts_with("192.168."))
        );
    }

    #[tokio::test]
    async fn fingerprints_are_attached() {
        let mock = Arc::new(MockRemote::with_catalog());
        let orchestrator = mock.orchestrator();
        let want = desired(512);

        let observed = orchestrator.provision(&want).await.unwrap();

        assert_eq!(observed.credentials, Some(want.credentials.fingerprints()));
    }

    #[tokio::test]
    async fn failure_after_create_keeps_linode_id() {
        let mock = Arc::new(MockRemote::with_catalog());
        mock.fail_on("create_disk_from_distribution");
        let orchestrator = mock.orchestrator();

        let err = orchestrator.provision(&desired(512)).await.unwrap_err();

        assert_eq!(err.step, ProvisionStep::DeployImage);
        assert!(matches!(err.source, Error::Remote(_)));
        let id = err.committed.linode_id.unwrap();
        assert!(mock.linode(id).is_some());
        assert_eq!(err.committed.datacenter_id, Some(2));
        assert_eq!(err.committed.plan_id, Some(1));
        assert!(err.committed.swap_disk_id.is_some());
        assert_eq!(err.committed.root_disk_id, None);
        assert_eq!(mock.count(|c| matches!(c, Call::DeleteLinode { .. })), 0);
    }

    #[tokio::test]
    async fn unknown_region_creates_nothing() {
        let mock = Arc::new(MockRemote::with_catalog());
        let orchestrator = mock.orchestrator();
        let mut want = desired(512);
        want.region = "Atlantis".into();

        let err = orchestrator.provision(&want).await.unwrap_err();

        assert_eq!(err.step, ProvisionStep::ResolvePlacement);
        assert_eq!(err.committed, ProvisionProgress::default());
        assert!(mock.mutations().is_empty());
    }

    #[tokio::test]
    async fn oversized_swap_fails_before_deploy() {
        let mock = Arc::new(MockRemote::with_catalog());
        let orchestrator = mock.orchestrator();

        let err = orchestrator.provision(&desired(20480)).await.unwrap_err();

        assert_eq!(err.step, ProvisionStep::DeployImage);
        assert!(matches!(err.source, Error::Constraint(_)));
        assert_eq!(mock.count(|c| matches!(c, Call::DeployDistribution { .. })), 0);
    }

    #[tokio::test]
    async fn unknown_kernel_leaves_disks_in_place() {
        let mock = Arc::new(MockRemote::with_catalog());
        let orchestrator = mock.orchestrator();
        let mut want = desired(512);
        want.kernel = "Latest 2.6".into();

        let err = orchestrator.provision(&want).await.unwrap_err();

        assert_eq!(err.step, ProvisionStep::ResolveKernel);
        assert!(err.committed.root_disk_id.is_some());
        assert_eq!(err.committed.config_id, None);
        assert_eq!(mock.count(|c| matches!(c, Call::CreateConfig { .. })), 0);
    }
}
