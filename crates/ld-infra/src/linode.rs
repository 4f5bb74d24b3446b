use async_trait::async_trait;
use linode_api::{
    CreateConfigRequest, CreateDiskRequest, Datacenter, DeployDiskRequest, Disk, Distribution,
    Image, IpAddress, Job, Kernel, Linode, LinodeClient, LinodeConfig, Plan, UpdateConfigRequest,
    UpdateLinodeRequest,
};
use tracing::{debug, warn};

use crate::remote::RemoteApi;
use crate::types::LinodeId;
use crate::{Error, Result};

/// `ERRORCODE` the action API uses for an unknown object.
const OBJECT_NOT_FOUND: i64 = 5;

/// Live Linode API, delegating to `linode_api::LinodeClient` for all HTTP calls.
#[async_trait]
impl RemoteApi for LinodeClient {
    async fn get_linode(&self, linode_id: LinodeId) -> Result<Option<Linode>> {
        let mut linodes = match self.linode_list(Some(linode_id.0)).await {
            Ok(linodes) => linodes,
            Err(linode_api::Error::Remote { errors, .. })
                if errors.iter().any(|e| e.code == OBJECT_NOT_FOUND) =>
            {
                debug!(%linode_id, "linode: not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match linodes.len() {
            0 => Ok(None),
            1 => Ok(linodes.pop()),
            n => Err(Error::InvariantViolation(format!(
                "{n} linodes returned for id {linode_id}"
            ))),
        }
    }

    async fn create_linode(&self, datacenter_id: i64, plan_id: i64) -> Result<LinodeId> {
        let resp = self.linode_create(datacenter_id, plan_id).await?;
        Ok(LinodeId(resp.linode_id))
    }

    async fn update_linode(&self, linode_id: LinodeId, req: &UpdateLinodeRequest) -> Result<()> {
        self.linode_update(linode_id.0, req).await?;
        Ok(())
    }

    async fn resize_linode(&self, linode_id: LinodeId, plan_id: i64) -> Result<()> {
        self.linode_resize(linode_id.0, plan_id).await?;
        Ok(())
    }

    async fn boot_linode(&self, linode_id: LinodeId, config_id: Option<i64>) -> Result<()> {
        let job = self.linode_boot(linode_id.0, config_id).await?;
        debug!(%linode_id, job_id = job.job_id, "linode: boot queued");
        Ok(())
    }

    async fn reboot_linode(&self, linode_id: LinodeId, config_id: Option<i64>) -> Result<()> {
        let job = self.linode_reboot(linode_id.0, config_id).await?;
        debug!(%linode_id, job_id = job.job_id, "linode: reboot queued");
        Ok(())
    }

    async fn delete_linode(&self, linode_id: LinodeId) -> Result<()> {
        match self.linode_delete(linode_id.0, true).await {
            Ok(_) => Ok(()),
            Err(linode_api::Error::Remote { errors, .. })
                if errors.iter().any(|e| e.code == OBJECT_NOT_FOUND) =>
            {
                warn!(%linode_id, "linode: already destroyed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_disks(&self, linode_id: LinodeId) -> Result<Vec<Disk>> {
        Ok(self.disk_list(linode_id.0).await?)
    }

    async fn create_disk(&self, linode_id: LinodeId, req: &CreateDiskRequest) -> Result<i64> {
        Ok(self.disk_create(linode_id.0, req).await?.disk_id)
    }

    async fn create_disk_from_distribution(
        &self,
        linode_id: LinodeId,
        req: &DeployDiskRequest,
    ) -> Result<i64> {
        Ok(self.disk_create_from_distribution(linode_id.0, req).await?.disk_id)
    }

    async fn create_disk_from_image(
        &self,
        linode_id: LinodeId,
        req: &DeployDiskRequest,
    ) -> Result<i64> {
        Ok(self.disk_create_from_image(linode_id.0, req).await?.disk_id)
    }

    async fn resize_disk(&self, linode_id: LinodeId, disk_id: i64, size: i64) -> Result<()> {
        self.disk_resize(linode_id.0, disk_id, size).await?;
        Ok(())
    }

    async fn list_configs(&self, linode_id: LinodeId) -> Result<Vec<LinodeConfig>> {
        Ok(self.config_list(linode_id.0).await?)
    }

    async fn create_config(&self, linode_id: LinodeId, req: &CreateConfigRequest) -> Result<i64> {
        Ok(self.config_create(linode_id.0, req).await?.config_id)
    }

    async fn update_config(
        &self,
        linode_id: LinodeId,
        config_id: i64,
        req: &UpdateConfigRequest,
    ) -> Result<()> {
        self.config_update(linode_id.0, config_id, req).await?;
        Ok(())
    }

    async fn list_ips(&self, linode_id: LinodeId) -> Result<Vec<IpAddress>> {
        Ok(self.ip_list(linode_id.0).await?)
    }

    async fn add_private_ip(&self, linode_id: LinodeId) -> Result<String> {
        Ok(self.ip_add_private(linode_id.0).await?.address)
    }

    async fn list_jobs(&self, linode_id: LinodeId) -> Result<Vec<Job>> {
        Ok(self.job_list(linode_id.0, false).await?)
    }

    async fn kernels(&self) -> Result<Vec<Kernel>> {
        Ok(self.avail_kernels().await?)
    }

    async fn datacenters(&self) -> Result<Vec<Datacenter>> {
        Ok(self.avail_datacenters().await?)
    }

    async fn plans(&self) -> Result<Vec<Plan>> {
        Ok(self.avail_linode_plans().await?)
    }

    async fn distributions(&self) -> Result<Vec<Distribution>> {
        Ok(self.avail_distributions().await?)
    }

    async fn images(&self) -> Result<Vec<Image>> {
        Ok(self.image_list().await?)
    }
}
