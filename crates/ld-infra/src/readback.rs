use linode_api::{Disk, IpAddress};
use tracing::info;

use crate::image::image_provenance;
use crate::types::{ConnectionInfo, InstanceStatus, LinodeId, ObservedState};
use crate::{Orchestrator, Result};

impl Orchestrator {
    /// Project the remote state of a linode into desired-state terms.
    ///
    /// Fails with `NotFound` when the linode is gone. Boot config fields stay
    /// `None` unless the linode has exactly one config. Credential
    /// fingerprints are never reported by the remote and are left unset.
    pub async fn read(&self, linode_id: LinodeId) -> Result<ObservedState> {
        let api = self.api();
        let linode = self.fetch_linode(linode_id).await?;

        let ips = api.list_ips(linode_id).await?;
        let ip_address = last_address(&ips, true);
        let private_ip_address = last_address(&ips, false);

        let region = self.catalog.region_name(api, linode.datacenter_id).await?;
        let size = self.catalog.plan_ram(api, linode.plan_id).await?;
        let plan_storage = self.catalog.plan_storage_mb(api, linode.plan_id).await?;

        let disks = api.list_disks(linode_id).await?;
        let plan_storage_utilized = disks.iter().map(|d| d.size).sum();
        let swap_size = disks.iter().find(|d| d.is_swap()).map_or(0, |d| d.size);
        let image_id = provenance(&disks);

        let mut configs = api.list_configs(linode_id).await?;
        let (helper_distro, manage_private_ip_automatically, kernel) = match configs.pop() {
            Some(config) if configs.is_empty() => (
                Some(config.helper_distro),
                Some(config.helper_network),
                Some(self.catalog.kernel_name(api, config.kernel_id).await?),
            ),
            _ => (None, None, None),
        };

        let connection = ip_address.clone().map(ConnectionInfo::ssh);
        if let Some(conn) = &connection {
            info!(%linode_id, protocol = %conn.protocol, host = %conn.host, "connection info");
        }

        Ok(ObservedState {
            linode_id,
            name: linode.label,
            group: linode.display_group,
            region,
            size,
            status: InstanceStatus::from_code(linode.status),
            plan_storage,
            plan_storage_utilized,
            private_networking: private_ip_address.is_some(),
            ip_address,
            private_ip_address,
            swap_size,
            helper_distro,
            manage_private_ip_automatically,
            kernel,
            image_id,
            connection,
            credentials: None,
        })
    }
}

fn last_address(ips: &[IpAddress], public: bool) -> Option<String> {
    ips.iter()
        .filter(|ip| ip.is_public == public)
        .next_back()
        .map(|ip| ip.address.clone())
}

fn provenance(disks: &[Disk]) -> Option<String> {
    disks
        .iter()
        .filter(|d| !d.is_swap())
        .find_map(|d| image_provenance(&d.label))
}
