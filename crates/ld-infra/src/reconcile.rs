//! Update path: apply the subset of a desired state that differs from what
//! the remote reports.
//!
//! Changes run in a fixed order (identity, size, boot config, private
//! networking) because the later ones assume what the earlier ones leave
//! behind. Nothing is rolled back: an interrupted run reports every change it
//! had already applied.

use std::fmt;

use linode_api::{Disk, UpdateConfigRequest, UpdateLinodeRequest};
use serde::Serialize;
use tracing::{info, warn};

use crate::credentials::CredentialFingerprints;
use crate::image::image_matches;
use crate::types::{DesiredState, LinodeId, ObservedState};
use crate::{Error, Interrupted, Orchestrator, Result, at};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStep {
    Observe,
    Preflight,
    Identity,
    Resize,
    ExpandDisk,
    BootResized,
    BootConfig,
    PrivateNetworking,
    ReadBack,
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconcileStep::Observe => "reading current state",
            ReconcileStep::Preflight => "checking requested changes",
            ReconcileStep::Identity => "updating label and group",
            ReconcileStep::Resize => "resizing linode",
            ReconcileStep::ExpandDisk => "expanding disk",
            ReconcileStep::BootResized => "booting resized linode",
            ReconcileStep::BootConfig => "updating boot config",
            ReconcileStep::PrivateNetworking => "enabling private networking",
            ReconcileStep::ReadBack => "reading back state",
        };
        f.write_str(s)
    }
}

/// One remote change made by a reconcile run, recorded as soon as the remote
/// accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AppliedChange {
    Identity {
        label: Option<String>,
        group: Option<String>,
    },
    Resized {
        plan_id: i64,
    },
    DiskExpanded {
        disk_id: i64,
        size: i64,
    },
    Booted,
    BootConfig {
        /// Only set when the kernel was rebound.
        kernel_id: Option<i64>,
        helper_distro: Option<bool>,
        helper_network: Option<bool>,
    },
    PrivateIp {
        address: String,
    },
    Rebooted,
}

pub type ReconcileError = Interrupted<ReconcileStep, Vec<AppliedChange>>;

type StepResult<T> = std::result::Result<T, (ReconcileStep, Error)>;

/// Growth of the largest disk into newly available plan storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskExpansion {
    pub disk_id: i64,
    /// New size in MB.
    pub size: i64,
}

/// A checked plan change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub plan_id: i64,
    /// Storage allowance of the target plan, in MB.
    pub target_storage: i64,
    /// Sum of all current disk sizes, in MB.
    pub current_usage: i64,
    pub expansion: Option<DiskExpansion>,
}

impl ResizePlan {
    /// Fails with [`Error::Constraint`] when the disks already use more than
    /// the target plan allows.
    ///
    /// With `expand`, the largest disk (first one on ties) grows to
    /// `target - (usage - largest)`.
    pub fn new(plan_id: i64, target_storage: i64, disks: &[Disk], expand: bool) -> Result<Self> {
        let current_usage: i64 = disks.iter().map(|d| d.size).sum();
        if current_usage > target_storage {
            return Err(Error::Constraint(format!(
                "disks use {current_usage} MB but plan {plan_id} allows {target_storage} MB"
            )));
        }

        let largest = disks
            .iter()
            .fold(None::<&Disk>, |best, d| match best {
                Some(b) if b.size >= d.size => Some(b),
                _ => Some(d),
            });
        let expansion = largest
            .filter(|_| expand)
            .map(|d| DiskExpansion {
                disk_id: d.id,
                size: target_storage - (current_usage - d.size),
            })
            .filter(|e| disks.iter().any(|d| d.id == e.disk_id && d.size < e.size));

        Ok(Self {
            plan_id,
            target_storage,
            current_usage,
            expansion,
        })
    }
}

/// Label/group update needed to move from the current values to `desired`.
/// An empty desired name leaves the label alone.
pub(crate) fn identity_changes(
    desired: &DesiredState,
    label: &str,
    group: &str,
) -> UpdateLinodeRequest {
    UpdateLinodeRequest {
        label: (!desired.name.is_empty() && desired.name != label).then(|| desired.name.clone()),
        display_group: (desired.group != group).then(|| desired.group.clone()),
    }
}

/// Reject transitions the remote cannot perform in place. Makes no calls.
pub fn preflight(desired: &DesiredState, observed: &ObservedState) -> Result<()> {
    if observed.private_networking && !desired.private_networking {
        return Err(Error::UnsupportedOperation(format!(
            "private networking cannot be disabled on linode {}",
            observed.linode_id
        )));
    }
    if desired.region != observed.region {
        return Err(Error::UnsupportedOperation(format!(
            "moving linode {} from {} to {} requires a new linode",
            observed.linode_id, observed.region, desired.region
        )));
    }
    if let Some(stored) = &observed.credentials {
        let fresh = desired.credentials.fingerprints();
        if stored.ssh_key != fresh.ssh_key || stored.root_password != fresh.root_password {
            return Err(Error::UnsupportedOperation(format!(
                "changing credentials of linode {} requires a new linode",
                observed.linode_id
            )));
        }
    }
    Ok(())
}

impl Orchestrator {
    /// Read the linode, bring it to `desired`, and read it back.
    ///
    /// `stored` are the fingerprints recorded at provisioning; when given, a
    /// credential change is rejected.
    pub async fn update(
        &self,
        linode_id: LinodeId,
        desired: &DesiredState,
        stored: Option<CredentialFingerprints>,
    ) -> std::result::Result<ObservedState, ReconcileError> {
        let mut applied = Vec::new();
        match self.run_update(linode_id, desired, stored, &mut applied).await {
            Ok(observed) => Ok(observed),
            Err((step, source)) => Err(interrupted(linode_id, step, source, applied)),
        }
    }

    /// Apply the differences between `desired` and a fresh `observed`.
    ///
    /// Returns the changes made, in order; empty when nothing differed.
    pub async fn reconcile(
        &self,
        desired: &DesiredState,
        observed: &ObservedState,
    ) -> std::result::Result<Vec<AppliedChange>, ReconcileError> {
        let mut applied = Vec::new();
        match self.apply(desired, observed, &mut applied).await {
            Ok(()) => Ok(applied),
            Err((step, source)) => Err(interrupted(observed.linode_id, step, source, applied)),
        }
    }

    async fn run_update(
        &self,
        linode_id: LinodeId,
        desired: &DesiredState,
        stored: Option<CredentialFingerprints>,
        applied: &mut Vec<AppliedChange>,
    ) -> StepResult<ObservedState> {
        let mut observed = self
            .read(linode_id)
            .await
            .map_err(at(ReconcileStep::Observe))?;
        observed.credentials = stored;
        self.apply(desired, &observed, applied).await?;

        let mut observed = self
            .read(linode_id)
            .await
            .map_err(at(ReconcileStep::ReadBack))?;
        observed.credentials = Some(desired.credentials.fingerprints());
        Ok(observed)
    }

    async fn apply(
        &self,
        desired: &DesiredState,
        observed: &ObservedState,
        applied: &mut Vec<AppliedChange>,
    ) -> StepResult<()> {
        let linode_id = observed.linode_id;
        preflight(desired, observed).map_err(at(ReconcileStep::Preflight))?;
        self.check_image(desired, observed)
            .await
            .map_err(at(ReconcileStep::Preflight))?;

        let identity = identity_changes(desired, &observed.name, &observed.group);
        if !identity.is_empty() {
            self.api
                .update_linode(linode_id, &identity)
                .await
                .map_err(at(ReconcileStep::Identity))?;
            info!(%linode_id, label = ?identity.label, group = ?identity.display_group, "linode identity updated");
            applied.push(AppliedChange::Identity {
                label: identity.label,
                group: identity.display_group,
            });
        }

        if desired.size != observed.size {
            self.resize(linode_id, desired, applied).await?;
        }

        self.update_boot_config(linode_id, desired, observed, applied)
            .await
            .map_err(at(ReconcileStep::BootConfig))?;

        if desired.private_networking && !observed.private_networking {
            self.enable_private_networking(linode_id, desired, applied)
                .await
                .map_err(at(ReconcileStep::PrivateNetworking))?;
        }

        Ok(())
    }

    /// The root image is fixed at creation; a different one needs a new linode.
    async fn check_image(&self, desired: &DesiredState, observed: &ObservedState) -> Result<()> {
        let Some(deployed) = observed.image_id.as_deref() else {
            return Ok(());
        };
        if image_matches(self.api(), &desired.image, deployed).await? {
            return Ok(());
        }
        Err(Error::UnsupportedOperation(format!(
            "replacing image {deployed} of linode {} with {} requires a new linode",
            observed.linode_id, desired.image
        )))
    }

    async fn resize(
        &self,
        linode_id: LinodeId,
        desired: &DesiredState,
        applied: &mut Vec<AppliedChange>,
    ) -> StepResult<()> {
        use ReconcileStep::{BootResized, ExpandDisk, Resize};

        let api = self.api();
        let plan_id = self
            .catalog
            .plan_id(api, desired.size)
            .await
            .map_err(at(Resize))?;
        let target_storage = self
            .catalog
            .plan_storage_mb(api, plan_id)
            .await
            .map_err(at(Resize))?;
        let disks = api.list_disks(linode_id).await.map_err(at(Resize))?;
        let plan = ResizePlan::new(plan_id, target_storage, &disks, desired.disk_expansion)
            .map_err(at(Resize))?;
        let linode = self.fetch_linode(linode_id).await.map_err(at(Resize))?;
        let budget = self.timeouts.resize_budget(linode.total_hd);

        api.resize_linode(linode_id, plan_id)
            .await
            .map_err(at(Resize))?;
        applied.push(AppliedChange::Resized { plan_id });
        info!(%linode_id, plan_id, ?budget, "linode resize queued");
        self.waiter
            .await_completion(api, linode_id, budget)
            .await
            .map_err(at(Resize))?;

        if let Some(DiskExpansion { disk_id, size }) = plan.expansion {
            api.resize_disk(linode_id, disk_id, size)
                .await
                .map_err(at(ExpandDisk))?;
            applied.push(AppliedChange::DiskExpanded { disk_id, size });
            info!(%linode_id, disk_id, size, "disk expansion queued");
            self.waiter
                .await_completion(api, linode_id, budget)
                .await
                .map_err(at(ExpandDisk))?;
        }

        api.boot_linode(linode_id, None)
            .await
            .map_err(at(BootResized))?;
        applied.push(AppliedChange::Booted);
        self.waiter
            .await_completion(api, linode_id, self.timeouts.standard)
            .await
            .map_err(at(BootResized))?;
        Ok(())
    }

    async fn update_boot_config(
        &self,
        linode_id: LinodeId,
        desired: &DesiredState,
        observed: &ObservedState,
        applied: &mut Vec<AppliedChange>,
    ) -> Result<()> {
        let mut configs = self.api.list_configs(linode_id).await?;
        if configs.len() != 1 {
            return Err(Error::InvariantViolation(format!(
                "linode {linode_id} has {} boot configs, expected 1",
                configs.len()
            )));
        }
        let config = configs.remove(0);

        let mut req = UpdateConfigRequest {
            kernel_id: None,
            helper_distro: (desired.helper_distro != config.helper_distro)
                .then_some(desired.helper_distro),
            helper_network: (desired.manage_private_ip_automatically != config.helper_network)
                .then_some(desired.manage_private_ip_automatically),
        };
        if observed.kernel.as_deref() != Some(desired.kernel.as_str()) {
            let kernel_id = self.catalog.kernel_id(self.api(), &desired.kernel).await?;
            if kernel_id != config.kernel_id {
                req.kernel_id = Some(kernel_id);
            }
        }
        if req.is_empty() {
            return Ok(());
        }

        let change = AppliedChange::BootConfig {
            kernel_id: req.kernel_id,
            helper_distro: req.helper_distro,
            helper_network: req.helper_network,
        };
        // The update call rebinds the kernel; send the current one to keep it.
        req.kernel_id.get_or_insert(config.kernel_id);
        self.api.update_config(linode_id, config.id, &req).await?;
        info!(%linode_id, config_id = config.id, ?req, "boot config updated");
        applied.push(change);
        Ok(())
    }

    async fn enable_private_networking(
        &self,
        linode_id: LinodeId,
        desired: &DesiredState,
        applied: &mut Vec<AppliedChange>,
    ) -> Result<()> {
        let address = self.api.add_private_ip(linode_id).await?;
        info!(%linode_id, %address, "private address allocated");
        applied.push(AppliedChange::PrivateIp { address });

        if desired.manage_private_ip_automatically {
            self.api.reboot_linode(linode_id, None).await?;
            applied.push(AppliedChange::Rebooted);
            self.waiter
                .await_completion(self.api(), linode_id, self.timeouts.standard)
                .await?;
        }
        Ok(())
    }
}

fn interrupted(
    linode_id: LinodeId,
    step: ReconcileStep,
    source: Error,
    applied: Vec<AppliedChange>,
) -> ReconcileError {
    warn!(%linode_id, %step, error = %source, applied = applied.len(), "reconcile interrupted");
    Interrupted {
        step,
        committed: applied,
        source,
    }
}
