use async_trait::async_trait;
use linode_api::{
    CreateConfigRequest, CreateDiskRequest, Datacenter, DeployDiskRequest, Disk, Distribution,
    Image, IpAddress, Job, Kernel, Linode, LinodeConfig, Plan, UpdateConfigRequest,
    UpdateLinodeRequest,
};

use crate::Result;
use crate::types::LinodeId;

/// The remote control plane as the orchestrator sees it.
///
/// Every call is synchronous from the caller's point of view; work the
/// remote finishes later is only observable through [`RemoteApi::list_jobs`].
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    /// `None` when the linode no longer exists.
    async fn get_linode(&self, linode_id: LinodeId) -> Result<Option<Linode>>;

    async fn create_linode(&self, datacenter_id: i64, plan_id: i64) -> Result<LinodeId>;

    async fn update_linode(&self, linode_id: LinodeId, req: &UpdateLinodeRequest) -> Result<()>;

    async fn resize_linode(&self, linode_id: LinodeId, plan_id: i64) -> Result<()>;

    /// Boot with `config_id`, or the last used config when `None`.
    async fn boot_linode(&self, linode_id: LinodeId, config_id: Option<i64>) -> Result<()>;

    async fn reboot_linode(&self, linode_id: LinodeId, config_id: Option<i64>) -> Result<()>;

    async fn delete_linode(&self, linode_id: LinodeId) -> Result<()>;

    async fn list_disks(&self, linode_id: LinodeId) -> Result<Vec<Disk>>;

    /// Returns the new disk id.
    async fn create_disk(&self, linode_id: LinodeId, req: &CreateDiskRequest) -> Result<i64>;

    async fn create_disk_from_distribution(
        &self,
        linode_id: LinodeId,
        req: &DeployDiskRequest,
    ) -> Result<i64>;

    async fn create_disk_from_image(&self, linode_id: LinodeId, req: &DeployDiskRequest)
    -> Result<i64>;

    async fn resize_disk(&self, linode_id: LinodeId, disk_id: i64, size: i64) -> Result<()>;

    async fn list_configs(&self, linode_id: LinodeId) -> Result<Vec<LinodeConfig>>;

    /// Returns the new config id.
    async fn create_config(&self, linode_id: LinodeId, req: &CreateConfigRequest) -> Result<i64>;

    async fn update_config(
        &self,
        linode_id: LinodeId,
        config_id: i64,
        req: &UpdateConfigRequest,
    ) -> Result<()>;

    async fn list_ips(&self, linode_id: LinodeId) -> Result<Vec<IpAddress>>;

    /// Returns the allocated private address.
    async fn add_private_ip(&self, linode_id: LinodeId) -> Result<String>;

    async fn list_jobs(&self, linode_id: LinodeId) -> Result<Vec<Job>>;

    async fn kernels(&self) -> Result<Vec<Kernel>>;

    async fn datacenters(&self) -> Result<Vec<Datacenter>>;

    async fn plans(&self) -> Result<Vec<Plan>>;

    async fn distributions(&self) -> Result<Vec<Distribution>>;

    async fn images(&self) -> Result<Vec<Image>>;
}
