//! Reference lists (kernels, regions, plans) with name/id translation.
//!
//! Each list is fetched on first use and kept for the lifetime of the
//! [`Catalog`]. There is no invalidation: a new catalog fetches again.

use linode_api::{Datacenter, Kernel, Plan};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::remote::RemoteApi;
use crate::{Error, Result};

/// Kernel labels with this prefix track the remote's current build.
pub const FLOATING_KERNEL_PREFIX: &str = "Latest";

/// Lazily populated reference lists.
///
/// Concurrent first use of a kind results in a single fetch; a failed fetch
/// leaves the slot empty so the next caller tries again.
#[derive(Debug, Default)]
pub struct Catalog {
    kernels: OnceCell<Vec<Kernel>>,
    regions: OnceCell<Vec<Datacenter>>,
    plans: OnceCell<Vec<Plan>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn kernels(&self, api: &dyn RemoteApi) -> Result<&[Kernel]> {
        let kernels = self
            .kernels
            .get_or_try_init(|| async {
                debug!("catalog: fetching kernels");
                api.kernels().await
            })
            .await?;
        Ok(kernels)
    }

    pub async fn regions(&self, api: &dyn RemoteApi) -> Result<&[Datacenter]> {
        let regions = self
            .regions
            .get_or_try_init(|| async {
                debug!("catalog: fetching datacenters");
                api.datacenters().await
            })
            .await?;
        Ok(regions)
    }

    pub async fn plans(&self, api: &dyn RemoteApi) -> Result<&[Plan]> {
        let plans = self
            .plans
            .get_or_try_init(|| async {
                debug!("catalog: fetching plans");
                api.plans().await
            })
            .await?;
        Ok(plans)
    }

    pub async fn kernel_id(&self, api: &dyn RemoteApi, name: &str) -> Result<i64> {
        find_kernel(self.kernels(api).await?, name)
            .map(|k| k.id)
            .ok_or_else(|| Error::not_found("kernel", name))
    }

    /// Kernel label for `kernel_id`, with the build qualifier removed from
    /// floating kernels.
    pub async fn kernel_name(&self, api: &dyn RemoteApi, kernel_id: i64) -> Result<String> {
        self.kernels(api)
            .await?
            .iter()
            .find(|k| k.id == kernel_id)
            .map(|k| kernel_display_name(&k.label))
            .ok_or_else(|| Error::not_found("kernel id", kernel_id))
    }

    pub async fn region_id(&self, api: &dyn RemoteApi, name: &str) -> Result<i64> {
        self.regions(api)
            .await?
            .iter()
            .find(|r| r.location == name)
            .map(|r| r.id)
            .ok_or_else(|| Error::not_found("region", name))
    }

    pub async fn region_name(&self, api: &dyn RemoteApi, region_id: i64) -> Result<String> {
        self.regions(api)
            .await?
            .iter()
            .find(|r| r.id == region_id)
            .map(|r| r.location.clone())
            .ok_or_else(|| Error::not_found("region id", region_id))
    }

    /// Plan id for a RAM quantity in MB.
    pub async fn plan_id(&self, api: &dyn RemoteApi, ram: i64) -> Result<i64> {
        self.plans(api)
            .await?
            .iter()
            .find(|p| p.ram == ram)
            .map(|p| p.id)
            .ok_or_else(|| Error::not_found("plan with RAM", ram))
    }

    pub async fn plan_ram(&self, api: &dyn RemoteApi, plan_id: i64) -> Result<i64> {
        Ok(self.plan(api, plan_id).await?.ram)
    }

    /// Storage allowance of a plan in MB.
    pub async fn plan_storage_mb(&self, api: &dyn RemoteApi, plan_id: i64) -> Result<i64> {
        Ok(self.plan(api, plan_id).await?.disk * 1024)
    }

    async fn plan(&self, api: &dyn RemoteApi, plan_id: i64) -> Result<&Plan> {
        self.plans(api)
            .await?
            .iter()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| Error::not_found("plan id", plan_id))
    }
}

/// Exact label match, or prefix match for floating kernel names.
pub fn find_kernel<'a>(kernels: &'a [Kernel], name: &str) -> Option<&'a Kernel> {
    if name.starts_with(FLOATING_KERNEL_PREFIX) {
        kernels.iter().find(|k| k.label.starts_with(name))
    } else {
        kernels.iter().find(|k| k.label == name)
    }
}

/// `"Latest 4.x (4.19.86)"` becomes `"Latest 4.x"`; other labels pass through.
pub fn kernel_display_name(label: &str) -> String {
    if !label.starts_with(FLOATING_KERNEL_PREFIX) {
        return label.to_string();
    }
    match (label.find('('), label.rfind(')')) {
        (Some(open), Some(close)) if open < close => {
            format!("{}{}", label[..open].trim_end(), label[close + 1..].trim_start())
        }
        _ => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockRemote};

    fn kernel(id: i64, label: &str) -> Kernel {
        Kernel {
            id,
            label: label.into(),
        }
    }

    #[test]
    fn floating_label_is_stripped() {
        assert_eq!(kernel_display_name("Latest 4.x (4.19.86)"), "Latest 4.x");
        assert_eq!(
            kernel_display_name("Latest 64 bit (5.4.10-x86_64-linode132)"),
            "Latest 64 bit"
        );
        assert_eq!(kernel_display_name("4.14.12-x86_64-linode92"), "4.14.12-x86_64-linode92");
        assert_eq!(kernel_display_name("GRUB (legacy)"), "GRUB (legacy)");
        assert_eq!(kernel_display_name("Latest 32 bit"), "Latest 32 bit");
    }

    #[test]
    fn floating_name_matches_by_prefix() {
        let kernels = vec![
            kernel(1, "4.19.86-x86_64-linode"),
            kernel(2, "Latest 4.x (4.19.86)"),
        ];
        assert_eq!(find_kernel(&kernels, "Latest 4.x").map(|k| k.id), Some(2));
        assert_eq!(find_kernel(&kernels, "4.19.86-x86_64-linode").map(|k| k.id), Some(1));
        // Non-floating names require an exact match.
        assert!(find_kernel(&kernels, "4.19").is_none());
    }

    #[tokio::test]
    async fn floating_kernel_round_trip() {
        let mock = MockRemote::with_catalog();
        let catalog = Catalog::new();

        let id = catalog.kernel_id(&mock, "Latest 4.x").await.unwrap();
        assert_eq!(id, 210);
        assert_eq!(catalog.kernel_name(&mock, id).await.unwrap(), "Latest 4.x");
    }

    #[tokio::test]
    async fn names_round_trip_for_every_kind() {
        let mock = MockRemote::with_catalog();
        let catalog = Catalog::new();

        for region in ["Dallas, TX, USA", "Newark, NJ, USA"] {
            let id = catalog.region_id(&mock, region).await.unwrap();
            assert_eq!(catalog.region_name(&mock, id).await.unwrap(), region);
        }
        for ram in [1024, 2048, 4096] {
            let id = catalog.plan_id(&mock, ram).await.unwrap();
            assert_eq!(catalog.plan_ram(&mock, id).await.unwrap(), ram);
        }
        for kernel in ["Latest 64 bit", "4.14.12-x86_64-linode92", "GRUB 2"] {
            let id = catalog.kernel_id(&mock, kernel).await.unwrap();
            assert_eq!(catalog.kernel_name(&mock, id).await.unwrap(), kernel);
        }
    }

    #[tokio::test]
    async fn misses_are_not_found() {
        let mock = MockRemote::with_catalog();
        let catalog = Catalog::new();

        assert!(matches!(
            catalog.region_id(&mock, "Atlantis").await,
            Err(Error::NotFound { kind: "region", .. })
        ));
        assert!(matches!(
            catalog.plan_id(&mock, 3000).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            catalog.kernel_name(&mock, 9999).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn plan_storage_is_reported_in_mb() {
        let mock = MockRemote::with_catalog();
        let catalog = Catalog::new();
        let id = catalog.plan_id(&mock, 1024).await.unwrap();
        assert_eq!(catalog.plan_storage_mb(&mock, id).await.unwrap(), 20480);
    }

    #[tokio::test]
    async fn each_list_is_fetched_once() {
        let mock = MockRemote::with_catalog();
        let catalog = Catalog::new();

        // The mock yields inside every list fetch, so all three lookups are
        // waiting on the plan list at the same time.
        let (a, b, c) = tokio::join!(
            catalog.plan_id(&mock, 1024),
            catalog.plan_id(&mock, 2048),
            catalog.plan_ram(&mock, 1),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        catalog.region_id(&mock, "Dallas, TX, USA").await.unwrap();
        catalog.region_name(&mock, 2).await.unwrap();

        assert_eq!(mock.count(|c| matches!(c, Call::Plans)), 1);
        assert_eq!(mock.count(|c| matches!(c, Call::Datacenters)), 1);
        assert_eq!(mock.count(|c| matches!(c, Call::Kernels)), 0);
    }

    #[tokio::test]
    async fn failed_fetch_is_retried() {
        let mock = MockRemote::with_catalog();
        mock.fail_on("plans");
        let catalog = Catalog::new();

        assert!(matches!(catalog.plan_id(&mock, 1024).await, Err(Error::Remote(_))));

        mock.clear_failure();
        assert_eq!(catalog.plan_id(&mock, 1024).await.unwrap(), 1);
        assert_eq!(mock.count(|c| matches!(c, Call::Plans)), 2);
    }
}
