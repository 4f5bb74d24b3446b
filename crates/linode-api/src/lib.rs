//! Typed Rust client for the Linode action API.
//!
//! Every call is a request against a single endpoint with an `api_action`
//! parameter; answers share an `ERRORARRAY`/`DATA` envelope. Covers the
//! subset needed to manage one instance end to end: linodes, disks,
//! configs, IPs, jobs, and the reference lists (kernels, datacenters,
//! plans, distributions, images).

mod types;

use serde::de::DeserializeOwned;

pub use types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.linode.com/";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("linode api request failed: {0}")]
    Request(reqwest::Error),

    #[error("linode api {action} returned {status}: {body}")]
    Api {
        action: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("linode api {action} rejected the call: {}", describe(.errors))]
    Remote {
        action: &'static str,
        errors: Vec<ActionError>,
    },

    #[error("linode api {action} returned malformed data: {source}")]
    Decode {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

// The request URL is dropped so transport errors never echo the endpoint.
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.without_url())
    }
}

fn describe(errors: &[ActionError]) -> String {
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the Linode action API.
#[derive(Clone)]
pub struct LinodeClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

type Params = Vec<(&'static str, String)>;

impl LinodeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(&self, action: &'static str, mut params: Params) -> Result<T> {
        params.push(("api_key", self.api_key.clone()));
        params.push(("api_action", action.to_string()));

        let resp = self
            .http
            .post(&self.base_url)
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { action, status, body });
        }

        let envelope: Envelope = resp.json().await?;
        unwrap_envelope(action, envelope)
    }

    // ── Linodes ──────────────────────────────────────────────────────

    /// Lists one linode when `linode_id` is set, otherwise every linode on the account.
    pub async fn linode_list(&self, linode_id: Option<i64>) -> Result<Vec<Linode>> {
        let mut params = Params::new();
        if let Some(id) = linode_id {
            params.push(("LinodeID", id.to_string()));
        }
        self.call("linode.list", params).await
    }

    pub async fn linode_create(&self, datacenter_id: i64, plan_id: i64) -> Result<LinodeIdResponse> {
        self.call(
            "linode.create",
            vec![
                ("DatacenterID", datacenter_id.to_string()),
                ("PlanID", plan_id.to_string()),
                ("PaymentTerm", "1".into()),
            ],
        )
        .await
    }

    pub async fn linode_update(&self, linode_id: i64, req: &UpdateLinodeRequest) -> Result<LinodeIdResponse> {
        let mut params = vec![("LinodeID", linode_id.to_string())];
        if let Some(label) = &req.label {
            params.push(("Label", label.clone()));
        }
        if let Some(group) = &req.display_group {
            params.push(("lpm_displayGroup", group.clone()));
        }
        self.call("linode.update", params).await
    }

    pub async fn linode_resize(&self, linode_id: i64, plan_id: i64) -> Result<serde_json::Value> {
        self.call(
            "linode.resize",
            vec![("LinodeID", linode_id.to_string()), ("PlanID", plan_id.to_string())],
        )
        .await
    }

    /// Boots with `config_id`, or with the last used config when `None`.
    pub async fn linode_boot(&self, linode_id: i64, config_id: Option<i64>) -> Result<JobIdResponse> {
        self.call("linode.boot", power_params(linode_id, config_id)).await
    }

    pub async fn linode_reboot(&self, linode_id: i64, config_id: Option<i64>) -> Result<JobIdResponse> {
        self.call("linode.reboot", power_params(linode_id, config_id)).await
    }

    pub async fn linode_delete(&self, linode_id: i64, skip_checks: bool) -> Result<LinodeIdResponse> {
        self.call(
            "linode.delete",
            vec![
                ("LinodeID", linode_id.to_string()),
                ("skipChecks", skip_checks.to_string()),
            ],
        )
        .await
    }

    // ── Disks ────────────────────────────────────────────────────────

    pub async fn disk_list(&self, linode_id: i64) -> Result<Vec<Disk>> {
        self.call("linode.disk.list", vec![("LinodeID", linode_id.to_string())])
            .await
    }

    pub async fn disk_create(&self, linode_id: i64, req: &CreateDiskRequest) -> Result<DiskJobResponse> {
        self.call(
            "linode.disk.create",
            vec![
                ("LinodeID", linode_id.to_string()),
                ("Label", req.label.clone()),
                ("Type", req.kind.clone()),
                ("Size", req.size.to_string()),
            ],
        )
        .await
    }

    pub async fn disk_create_from_distribution(
        &self,
        linode_id: i64,
        req: &DeployDiskRequest,
    ) -> Result<DiskJobResponse> {
        let mut params = deploy_params(linode_id, req);
        params.push(("DistributionID", req.source_id.to_string()));
        self.call("linode.disk.createfromdistribution", params).await
    }

    pub async fn disk_create_from_image(&self, linode_id: i64, req: &DeployDiskRequest) -> Result<DiskJobResponse> {
        let mut params = deploy_params(linode_id, req);
        params.push(("ImageID", req.source_id.to_string()));
        self.call("linode.disk.createfromimage", params).await
    }

    pub async fn disk_resize(&self, linode_id: i64, disk_id: i64, size: i64) -> Result<DiskJobResponse> {
        self.call(
            "linode.disk.resize",
            vec![
                ("LinodeID", linode_id.to_string()),
                ("DiskID", disk_id.to_string()),
                ("size", size.to_string()),
            ],
        )
        .await
    }

    // ── Configs ──────────────────────────────────────────────────────

    pub async fn config_list(&self, linode_id: i64) -> Result<Vec<LinodeConfig>> {
        self.call("linode.config.list", vec![("LinodeID", linode_id.to_string())])
            .await
    }

    pub async fn config_create(&self, linode_id: i64, req: &CreateConfigRequest) -> Result<ConfigIdResponse> {
        let disk_list = req
            .disks
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");

        self.call(
            "linode.config.create",
            vec![
                ("LinodeID", linode_id.to_string()),
                ("KernelID", req.kernel_id.to_string()),
                ("Label", req.label.clone()),
                ("DiskList", disk_list),
                ("RootDeviceNum", req.root_device_num.to_string()),
                ("helper_distro", req.helper_distro.to_string()),
                ("helper_network", req.helper_network.to_string()),
            ],
        )
        .await
    }

    pub async fn config_update(
        &self,
        linode_id: i64,
        config_id: i64,
        req: &UpdateConfigRequest,
    ) -> Result<ConfigIdResponse> {
        let mut params = vec![
            ("LinodeID", linode_id.to_string()),
            ("ConfigID", config_id.to_string()),
        ];
        if let Some(kernel_id) = req.kernel_id {
            params.push(("KernelID", kernel_id.to_string()));
        }
        if let Some(v) = req.helper_distro {
            params.push(("helper_distro", v.to_string()));
        }
        if let Some(v) = req.helper_network {
            params.push(("helper_network", v.to_string()));
        }
        self.call("linode.config.update", params).await
    }

    // ── IPs ──────────────────────────────────────────────────────────

    pub async fn ip_list(&self, linode_id: i64) -> Result<Vec<IpAddress>> {
        self.call("linode.ip.list", vec![("LinodeID", linode_id.to_string())])
            .await
    }

    pub async fn ip_add_private(&self, linode_id: i64) -> Result<PrivateIpResponse> {
        self.call("linode.ip.addprivate", vec![("LinodeID", linode_id.to_string())])
            .await
    }

    // ── Jobs ─────────────────────────────────────────────────────────

    pub async fn job_list(&self, linode_id: i64, pending_only: bool) -> Result<Vec<Job>> {
        self.call(
            "linode.job.list",
            vec![
                ("LinodeID", linode_id.to_string()),
                ("pendingOnly", pending_only.to_string()),
            ],
        )
        .await
    }

    // ── Reference lists ──────────────────────────────────────────────

    pub async fn avail_kernels(&self) -> Result<Vec<Kernel>> {
        self.call("avail.kernels", Params::new()).await
    }

    pub async fn avail_datacenters(&self) -> Result<Vec<Datacenter>> {
        self.call("avail.datacenters", Params::new()).await
    }

    pub async fn avail_linode_plans(&self) -> Result<Vec<Plan>> {
        self.call("avail.linodeplans", Params::new()).await
    }

    pub async fn avail_distributions(&self) -> Result<Vec<Distribution>> {
        self.call("avail.distributions", Params::new()).await
    }

    pub async fn image_list(&self) -> Result<Vec<Image>> {
        self.call("image.list", Params::new()).await
    }
}

fn power_params(linode_id: i64, config_id: Option<i64>) -> Params {
    let mut params = vec![("LinodeID", linode_id.to_string())];
    if let Some(id) = config_id {
        params.push(("ConfigID", id.to_string()));
    }
    params
}

fn deploy_params(linode_id: i64, req: &DeployDiskRequest) -> Params {
    let mut params = vec![
        ("LinodeID", linode_id.to_string()),
        ("Label", req.label.clone()),
        ("Size", req.size.to_string()),
        ("rootPass", req.root_pass.clone()),
    ];
    if let Some(key) = &req.root_ssh_key {
        params.push(("rootSSHKey", key.clone()));
    }
    params
}

/// Surfaces a non-empty `ERRORARRAY` as an error, otherwise decodes `DATA`.
fn unwrap_envelope<T: DeserializeOwned>(action: &'static str, envelope: Envelope) -> Result<T> {
    if !envelope.errors.is_empty() {
        return Err(Error::Remote {
            action,
            errors: envelope.errors,
        });
    }
    serde_json::from_value(envelope.data).map_err(|source| Error::Decode { action, source })
}
