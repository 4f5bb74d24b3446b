//! In-memory remote for tests.
//!
//! Records every call in order and keeps just enough linode/disk/config/IP
//! state for the orchestrator to run its full create and update paths.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use linode_api::{
    ActionError, CreateConfigRequest, CreateDiskRequest, Datacenter, DeployDiskRequest, Disk,
    Distribution, Image, IpAddress, Job, Kernel, Linode, LinodeConfig, Plan, UpdateConfigRequest,
    UpdateLinodeRequest,
};

use crate::jobs::{JobWaiter, Timeouts};
use crate::remote::RemoteApi;
use crate::types::LinodeId;
use crate::{Orchestrator, Result};

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetLinode { linode_id: LinodeId },
    CreateLinode { datacenter_id: i64, plan_id: i64 },
    UpdateLinode {
        linode_id: LinodeId,
        label: Option<String>,
        display_group: Option<String>,
    },
    ResizeLinode { linode_id: LinodeId, plan_id: i64 },
    BootLinode { linode_id: LinodeId, config_id: Option<i64> },
    RebootLinode { linode_id: LinodeId, config_id: Option<i64> },
    DeleteLinode { linode_id: LinodeId },
    ListDisks { linode_id: LinodeId },
    CreateDisk { linode_id: LinodeId, kind: String, size: i64 },
    DeployDistribution {
        linode_id: LinodeId,
        distribution_id: i64,
        label: String,
        size: i64,
    },
    DeployImage { linode_id: LinodeId, image_id: i64, label: String, size: i64 },
    ResizeDisk { linode_id: LinodeId, disk_id: i64, size: i64 },
    ListConfigs { linode_id: LinodeId },
    CreateConfig {
        linode_id: LinodeId,
        kernel_id: i64,
        disks: Vec<i64>,
        root_device_num: i64,
        helper_distro: bool,
        helper_network: bool,
    },
    UpdateConfig { linode_id: LinodeId, config_id: i64, req: UpdateConfigRequest },
    ListIps { linode_id: LinodeId },
    AddPrivateIp { linode_id: LinodeId },
    ListJobs { linode_id: LinodeId },
    Kernels,
    Datacenters,
    Plans,
    Distributions,
    Images,
}

impl Call {
    /// Calls that change remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::CreateLinode { .. }
                | Call::UpdateLinode { .. }
                | Call::ResizeLinode { .. }
                | Call::BootLinode { .. }
                | Call::RebootLinode { .. }
                | Call::DeleteLinode { .. }
                | Call::CreateDisk { .. }
                | Call::DeployDistribution { .. }
                | Call::DeployImage { .. }
                | Call::ResizeDisk { .. }
                | Call::CreateConfig { .. }
                | Call::UpdateConfig { .. }
                | Call::AddPrivateIp { .. }
        )
    }
}

/// How the job queue answers `list_jobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// Every job is finished.
    Complete,
    /// One job stays pending for this many more polls.
    PendingFor(u32),
    /// One job never finishes.
    Stuck,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<Call>,
    kernels: Vec<Kernel>,
    datacenters: Vec<Datacenter>,
    plans: Vec<Plan>,
    distributions: Vec<Distribution>,
    images: Vec<Image>,
    linodes: BTreeMap<LinodeId, Linode>,
    disks: BTreeMap<LinodeId, Vec<Disk>>,
    configs: BTreeMap<LinodeId, Vec<LinodeConfig>>,
    ips: BTreeMap<LinodeId, Vec<IpAddress>>,
    jobs: JobMode,
    fail_on: Option<&'static str>,
    next_id: i64,
}

pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    /// Empty reference lists and no linodes.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                calls: Vec::new(),
                kernels: Vec::new(),
                datacenters: Vec::new(),
                plans: Vec::new(),
                distributions: Vec::new(),
                images: Vec::new(),
                linodes: BTreeMap::new(),
                disks: BTreeMap::new(),
                configs: BTreeMap::new(),
                ips: BTreeMap::new(),
                jobs: JobMode::Complete,
                fail_on: None,
                next_id: 1000,
            }),
        }
    }

    /// A small realistic catalog:
    ///
    /// - kernels 210 `Latest 4.x (4.19.86)`, 138 `Latest 64 bit (...)`,
    ///   300 `4.14.12-x86_64-linode92`, 301 `GRUB 2`
    /// - datacenters 2 `Dallas, TX, USA`, 6 `Newark, NJ, USA`
    /// - plans 1 (1024 MB / 20 GB), 2 (2048 / 40), 3 (4096 / 80)
    /// - distributions 140 `Debian 9`, 146 `Ubuntu 18.04 LTS`
    /// - private images 4001 `golden-web`, 4002 `Debian 9`
    pub fn with_catalog() -> Self {
        let mock = Self::new();
        {
            let mut s = mock.lock();
            s.kernels = vec![
                Kernel { id: 210, label: "Latest 4.x (4.19.86)".into() },
                Kernel { id: 138, label: "Latest 64 bit (5.4.10-x86_64-linode132)".into() },
                Kernel { id: 300, label: "4.14.12-x86_64-linode92".into() },
                Kernel { id: 301, label: "GRUB 2".into() },
            ];
            s.datacenters = vec![
                Datacenter { id: 2, location: "Dallas, TX, USA".into(), abbr: "dallas".into() },
                Datacenter { id: 6, location: "Newark, NJ, USA".into(), abbr: "newark".into() },
            ];
            s.plans = vec![
                Plan { id: 1, label: "Linode 1024".into(), ram: 1024, disk: 20 },
                Plan { id: 2, label: "Linode 2048".into(), ram: 2048, disk: 40 },
                Plan { id: 3, label: "Linode 4096".into(), ram: 4096, disk: 80 },
            ];
            s.distributions = vec![
                Distribution { id: 140, label: "Debian 9".into() },
                Distribution { id: 146, label: "Ubuntu 18.04 LTS".into() },
            ];
            s.images = vec![
                Image { id: 4001, label: "golden-web".into() },
                Image { id: 4002, label: "Debian 9".into() },
            ];
        }
        mock
    }

    /// Build an orchestrator over this mock with a 1s poll and default timeouts.
    pub fn orchestrator(self: &Arc<Self>) -> Orchestrator {
        Orchestrator::new(
            self.clone(),
            JobWaiter::default(),
            Timeouts::default(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: Call, action: &'static str) -> Result<MutexGuard<'_, MockState>> {
        let mut s = self.lock();
        s.calls.push(call);
        if s.fail_on == Some(action) {
            return Err(linode_api::Error::Remote {
                action,
                errors: vec![ActionError {
                    code: 8,
                    message: format!("{action} failed"),
                }],
            }
            .into());
        }
        Ok(s)
    }

    // ── Scenario setup ───────────────────────────────────────────────

    /// Make the named trait method fail with a remote error.
    pub fn fail_on(&self, action: &'static str) {
        self.lock().fail_on = Some(action);
    }

    pub fn clear_failure(&self) {
        self.lock().fail_on = None;
    }

    pub fn set_jobs(&self, mode: JobMode) {
        self.lock().jobs = mode;
    }

    /// Insert a running linode with a public address and no disks or configs.
    pub fn seed_linode(&self, datacenter_id: i64, plan_id: i64) -> LinodeId {
        let mut s = self.lock();
        let id = LinodeId(s.alloc_id());
        let total_hd = s.plan_storage(plan_id);
        s.linodes.insert(
            id,
            Linode {
                id: id.0,
                label: format!("linode{id}"),
                display_group: String::new(),
                datacenter_id,
                plan_id,
                status: 1,
                total_hd,
            },
        );
        let ip_id = s.alloc_id();
        s.ips.entry(id).or_default().push(IpAddress {
            id: ip_id,
            address: format!("203.0.113.{}", id.0 % 250),
            is_public: true,
        });
        id
    }

    pub fn seed_disk(&self, linode_id: LinodeId, kind: &str, label: &str, size: i64) -> i64 {
        let mut s = self.lock();
        let id = s.alloc_id();
        s.disks.entry(linode_id).or_default().push(Disk {
            id,
            label: label.into(),
            kind: kind.into(),
            size,
        });
        id
    }

    pub fn seed_config(
        &self,
        linode_id: LinodeId,
        kernel_id: i64,
        helper_distro: bool,
        helper_network: bool,
    ) -> i64 {
        let mut s = self.lock();
        let id = s.alloc_id();
        let disk_list = s
            .disks
            .get(&linode_id)
            .map(|d| d.iter().map(|d| d.id.to_string()).collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        s.configs.entry(linode_id).or_default().push(LinodeConfig {
            id,
            linode_id: linode_id.0,
            kernel_id,
            label: "seeded".into(),
            disk_list,
            root_device_num: 1,
            helper_distro,
            helper_network,
        });
        id
    }

    pub fn seed_private_ip(&self, linode_id: LinodeId, address: &str) {
        let mut s = self.lock();
        let id = s.alloc_id();
        s.ips.entry(linode_id).or_default().push(IpAddress {
            id,
            address: address.into(),
            is_public: false,
        });
    }

    pub fn update_seeded_linode(&self, linode_id: LinodeId, f: impl FnOnce(&mut Linode)) {
        if let Some(linode) = self.lock().linodes.get_mut(&linode_id) {
            f(linode);
        }
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn linode(&self, linode_id: LinodeId) -> Option<Linode> {
        self.lock().linodes.get(&linode_id).cloned()
    }

    pub fn disks(&self, linode_id: LinodeId) -> Vec<Disk> {
        self.lock().disks.get(&linode_id).cloned().unwrap_or_default()
    }

    pub fn configs(&self, linode_id: LinodeId) -> Vec<LinodeConfig> {
        self.lock().configs.get(&linode_id).cloned().unwrap_or_default()
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn plan_storage(&self, plan_id: i64) -> i64 {
        self.plans
            .iter()
            .find(|p| p.id == plan_id)
            .map(|p| p.disk * 1024)
            .unwrap_or(0)
    }

    fn push_disk(&mut self, linode_id: LinodeId, kind: &str, label: &str, size: i64) -> i64 {
        let id = self.alloc_id();
        self.disks.entry(linode_id).or_default().push(Disk {
            id,
            label: label.into(),
            kind: kind.into(),
            size,
        });
        id
    }

    fn set_status(&mut self, linode_id: LinodeId, status: i32) {
        if let Some(linode) = self.linodes.get_mut(&linode_id) {
            linode.status = status;
        }
    }
}

fn job(id: i64, finished: bool) -> Job {
    Job {
        id,
        label: format!("job {id}"),
        host_finish_dt: finished
            .then(|| NaiveDate::from_ymd_opt(2020, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)))
            .flatten(),
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn get_linode(&self, linode_id: LinodeId) -> Result<Option<Linode>> {
        let s = self.record(Call::GetLinode { linode_id }, "get_linode")?;
        Ok(s.linodes.get(&linode_id).cloned())
    }

    async fn create_linode(&self, datacenter_id: i64, plan_id: i64) -> Result<LinodeId> {
        let mut s = self.record(Call::CreateLinode { datacenter_id, plan_id }, "create_linode")?;
        let id = LinodeId(s.alloc_id());
        let total_hd = s.plan_storage(plan_id);
        s.linodes.insert(
            id,
            Linode {
                id: id.0,
                label: format!("linode{id}"),
                display_group: String::new(),
                datacenter_id,
                plan_id,
                status: 0,
                total_hd,
            },
        );
        let ip_id = s.alloc_id();
        s.ips.entry(id).or_default().push(IpAddress {
            id: ip_id,
            address: format!("203.0.113.{}", id.0 % 250),
            is_public: true,
        });
        Ok(id)
    }

    async fn update_linode(&self, linode_id: LinodeId, req: &UpdateLinodeRequest) -> Result<()> {
        let mut s = self.record(
            Call::UpdateLinode {
                linode_id,
                label: req.label.clone(),
                display_group: req.display_group.clone(),
            },
            "update_linode",
        )?;
        if let Some(linode) = s.linodes.get_mut(&linode_id) {
            if let Some(label) = &req.label {
                linode.label = label.clone();
            }
            if let Some(group) = &req.display_group {
                linode.display_group = group.clone();
            }
        }
        Ok(())
    }

    async fn resize_linode(&self, linode_id: LinodeId, plan_id: i64) -> Result<()> {
        let mut s = self.record(Call::ResizeLinode { linode_id, plan_id }, "resize_linode")?;
        let total_hd = s.plan_storage(plan_id);
        if let Some(linode) = s.linodes.get_mut(&linode_id) {
            linode.plan_id = plan_id;
            linode.total_hd = total_hd;
            linode.status = 2;
        }
        Ok(())
    }

    async fn boot_linode(&self, linode_id: LinodeId, config_id: Option<i64>) -> Result<()> {
        let mut s = self.record(Call::BootLinode { linode_id, config_id }, "boot_linode")?;
        s.set_status(linode_id, 1);
        Ok(())
    }

    async fn reboot_linode(&self, linode_id: LinodeId, config_id: Option<i64>) -> Result<()> {
        let mut s = self.record(Call::RebootLinode { linode_id, config_id }, "reboot_linode")?;
        s.set_status(linode_id, 1);
        Ok(())
    }

    async fn delete_linode(&self, linode_id: LinodeId) -> Result<()> {
        let mut s = self.record(Call::DeleteLinode { linode_id }, "delete_linode")?;
        s.linodes.remove(&linode_id);
        s.disks.remove(&linode_id);
        s.configs.remove(&linode_id);
        s.ips.remove(&linode_id);
        Ok(())
    }

    async fn list_disks(&self, linode_id: LinodeId) -> Result<Vec<Disk>> {
        let s = self.record(Call::ListDisks { linode_id }, "list_disks")?;
        Ok(s.disks.get(&linode_id).cloned().unwrap_or_default())
    }

    async fn create_disk(&self, linode_id: LinodeId, req: &CreateDiskRequest) -> Result<i64> {
        let mut s = self.record(
            Call::CreateDisk {
                linode_id,
                kind: req.kind.clone(),
                size: req.size,
            },
            "create_disk",
        )?;
        Ok(s.push_disk(linode_id, &req.kind, &req.label, req.size))
    }

    async fn create_disk_from_distribution(
        &self,
        linode_id: LinodeId,
        req: &DeployDiskRequest,
    ) -> Result<i64> {
        let mut s = self.record(
            Call::DeployDistribution {
                linode_id,
                distribution_id: req.source_id,
                label: req.label.clone(),
                size: req.size,
            },
            "create_disk_from_distribution",
        )?;
        Ok(s.push_disk(linode_id, "ext4", &req.label, req.size))
    }

    async fn create_disk_from_image(
        &self,
        linode_id: LinodeId,
        req: &DeployDiskRequest,
    ) -> Result<i64> {
        let mut s = self.record(
            Call::DeployImage {
                linode_id,
                image_id: req.source_id,
                label: req.label.clone(),
                size: req.size,
            },
            "create_disk_from_image",
        )?;
        Ok(s.push_disk(linode_id, "ext4", &req.label, req.size))
    }

    async fn resize_disk(&self, linode_id: LinodeId, disk_id: i64, size: i64) -> Result<()> {
        let mut s = self.record(Call::ResizeDisk { linode_id, disk_id, size }, "resize_disk")?;
        if let Some(disk) = s
            .disks
            .get_mut(&linode_id)
            .and_then(|d| d.iter_mut().find(|d| d.id == disk_id))
        {
            disk.size = size;
        }
        Ok(())
    }

    async fn list_configs(&self, linode_id: LinodeId) -> Result<Vec<LinodeConfig>> {
        let s = self.record(Call::ListConfigs { linode_id }, "list_configs")?;
        Ok(s.configs.get(&linode_id).cloned().unwrap_or_default())
    }

    async fn create_config(&self, linode_id: LinodeId, req: &CreateConfigRequest) -> Result<i64> {
        let mut s = self.record(
            Call::CreateConfig {
                linode_id,
                kernel_id: req.kernel_id,
                disks: req.disks.clone(),
                root_device_num: req.root_device_num,
                helper_distro: req.helper_distro,
                helper_network: req.helper_network,
            },
            "create_config",
        )?;
        let id = s.alloc_id();
        s.configs.entry(linode_id).or_default().push(LinodeConfig {
            id,
            linode_id: linode_id.0,
            kernel_id: req.kernel_id,
            label: req.label.clone(),
            disk_list: req
                .disks
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(","),
            root_device_num: req.root_device_num,
            helper_distro: req.helper_distro,
            helper_network: req.helper_network,
        });
        Ok(id)
    }

    async fn update_config(
        &self,
        linode_id: LinodeId,
        config_id: i64,
        req: &UpdateConfigRequest,
    ) -> Result<()> {
        let mut s = self.record(
            Call::UpdateConfig {
                linode_id,
                config_id,
                req: req.clone(),
            },
            "update_config",
        )?;
        if let Some(config) = s
            .configs
            .get_mut(&linode_id)
            .and_then(|c| c.iter_mut().find(|c| c.id == config_id))
        {
            if let Some(kernel_id) = req.kernel_id {
                config.kernel_id = kernel_id;
            }
            if let Some(v) = req.helper_distro {
                config.helper_distro = v;
            }
            if let Some(v) = req.helper_network {
                config.helper_network = v;
            }
        }
        Ok(())
    }

    async fn list_ips(&self, linode_id: LinodeId) -> Result<Vec<IpAddress>> {
        let s = self.record(Call::ListIps { linode_id }, "list_ips")?;
        Ok(s.ips.get(&linode_id).cloned().unwrap_or_default())
    }

    async fn add_private_ip(&self, linode_id: LinodeId) -> Result<String> {
        let mut s = self.record(Call::AddPrivateIp { linode_id }, "add_private_ip")?;
        let id = s.alloc_id();
        let address = format!("192.168.{}.{}", (id / 250) % 250, id % 250);
        s.ips.entry(linode_id).or_default().push(IpAddress {
            id,
            address: address.clone(),
            is_public: false,
        });
        Ok(address)
    }

    async fn list_jobs(&self, linode_id: LinodeId) -> Result<Vec<Job>> {
        let mut s = self.record(Call::ListJobs { linode_id }, "list_jobs")?;
        let pending = match s.jobs {
            JobMode::Complete => false,
            JobMode::Stuck => true,
            JobMode::PendingFor(0) => {
                s.jobs = JobMode::Complete;
                false
            }
            JobMode::PendingFor(n) => {
                s.jobs = JobMode::PendingFor(n - 1);
                true
            }
        };
        Ok(vec![job(1, true), job(2, !pending)])
    }

    async fn kernels(&self) -> Result<Vec<Kernel>> {
        // Suspend once so concurrent first uses overlap in the catalog.
        tokio::task::yield_now().await;
        let s = self.record(Call::Kernels, "kernels")?;
        Ok(s.kernels.clone())
    }

    async fn datacenters(&self) -> Result<Vec<Datacenter>> {
        tokio::task::yield_now().await;
        let s = self.record(Call::Datacenters, "datacenters")?;
        Ok(s.datacenters.clone())
    }

    async fn plans(&self) -> Result<Vec<Plan>> {
        tokio::task::yield_now().await;
        let s = self.record(Call::Plans, "plans")?;
        Ok(s.plans.clone())
    }

    async fn distributions(&self) -> Result<Vec<Distribution>> {
        let s = self.record(Call::Distributions, "distributions")?;
        Ok(s.distributions.clone())
    }

    async fn images(&self) -> Result<Vec<Image>> {
        let s = self.record(Call::Images, "images")?;
        Ok(s.images.clone())
    }
}
