use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

// ── Envelope ─────────────────────────────────────────────────────────

/// Every action answers with the same wrapper; `DATA` is only meaningful
/// when `ERRORARRAY` is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "ERRORARRAY", default)]
    pub errors: Vec<ActionError>,
    #[serde(rename = "ACTION", default)]
    pub action: String,
    #[serde(rename = "DATA", default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionError {
    #[serde(rename = "ERRORCODE")]
    pub code: i64,
    #[serde(rename = "ERRORMESSAGE")]
    pub message: String,
}

// ── Linodes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linode {
    #[serde(rename = "LINODEID")]
    pub id: i64,
    #[serde(rename = "LABEL", deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(rename = "LPM_DISPLAYGROUP", default, deserialize_with = "lenient_string")]
    pub display_group: String,
    #[serde(rename = "DATACENTERID")]
    pub datacenter_id: i64,
    #[serde(rename = "PLANID")]
    pub plan_id: i64,
    #[serde(rename = "STATUS")]
    pub status: i32,
    /// Total storage the plan grants, in MB.
    #[serde(rename = "TOTALHD")]
    pub total_hd: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateLinodeRequest {
    pub label: Option<String>,
    pub display_group: Option<String>,
}

impl UpdateLinodeRequest {
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.display_group.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinodeIdResponse {
    #[serde(rename = "LinodeID")]
    pub linode_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobIdResponse {
    #[serde(rename = "JobID")]
    pub job_id: i64,
}

// ── Disks ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disk {
    #[serde(rename = "DISKID")]
    pub id: i64,
    #[serde(rename = "LABEL", deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(rename = "TYPE")]
    pub kind: String,
    /// Size in MB.
    #[serde(rename = "SIZE")]
    pub size: i64,
}

impl Disk {
    pub fn is_swap(&self) -> bool {
        self.kind.eq_ignore_ascii_case("swap")
    }
}

#[derive(Debug, Clone)]
pub struct CreateDiskRequest {
    pub label: String,
    pub kind: String,
    pub size: i64,
}

/// Creates a disk from a distribution or a private image; `source_id` is
/// interpreted in whichever namespace the chosen action uses.
#[derive(Clone)]
pub struct DeployDiskRequest {
    pub source_id: i64,
    pub label: String,
    pub size: i64,
    pub root_pass: String,
    pub root_ssh_key: Option<String>,
}

impl std::fmt::Debug for DeployDiskRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployDiskRequest")
            .field("source_id", &self.source_id)
            .field("label", &self.label)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiskJobResponse {
    #[serde(rename = "JobID")]
    pub job_id: i64,
    #[serde(rename = "DiskID")]
    pub disk_id: i64,
}

// ── Configs ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinodeConfig {
    #[serde(rename = "ConfigID")]
    pub id: i64,
    #[serde(rename = "LinodeID")]
    pub linode_id: i64,
    #[serde(rename = "KernelID")]
    pub kernel_id: i64,
    #[serde(rename = "Label", default, deserialize_with = "lenient_string")]
    pub label: String,
    /// Comma separated disk ids, padded with empty slots.
    #[serde(rename = "DiskList", default)]
    pub disk_list: String,
    #[serde(rename = "RootDeviceNum", default)]
    pub root_device_num: i64,
    #[serde(rename = "helper_distro", default, deserialize_with = "flag")]
    pub helper_distro: bool,
    #[serde(rename = "helper_network", default, deserialize_with = "flag")]
    pub helper_network: bool,
}

impl LinodeConfig {
    pub fn disks(&self) -> Vec<i64> {
        self.disk_list
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CreateConfigRequest {
    pub kernel_id: i64,
    pub label: String,
    pub disks: Vec<i64>,
    pub root_device_num: i64,
    pub helper_distro: bool,
    pub helper_network: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateConfigRequest {
    pub kernel_id: Option<i64>,
    pub helper_distro: Option<bool>,
    pub helper_network: Option<bool>,
}

impl UpdateConfigRequest {
    pub fn is_empty(&self) -> bool {
        self.kernel_id.is_none() && self.helper_distro.is_none() && self.helper_network.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigIdResponse {
    #[serde(rename = "ConfigID")]
    pub config_id: i64,
}

// ── IPs ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddress {
    #[serde(rename = "IPADDRESSID")]
    pub id: i64,
    #[serde(rename = "IPADDRESS")]
    pub address: String,
    #[serde(rename = "ISPUBLIC", deserialize_with = "flag")]
    pub is_public: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivateIpResponse {
    #[serde(rename = "IPAddressID")]
    pub id: i64,
    #[serde(rename = "IPAddress")]
    pub address: String,
}

// ── Jobs ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "JOBID")]
    pub id: i64,
    #[serde(rename = "LABEL", default, deserialize_with = "lenient_string")]
    pub label: String,
    /// Unset while the host is still working on the job.
    #[serde(rename = "HOST_FINISH_DT", default, deserialize_with = "finish_time")]
    pub host_finish_dt: Option<NaiveDateTime>,
}

impl Job {
    pub fn is_finished(&self) -> bool {
        self.host_finish_dt.is_some()
    }
}

// ── Reference lists ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kernel {
    #[serde(rename = "KERNELID")]
    pub id: i64,
    #[serde(rename = "LABEL", deserialize_with = "lenient_string")]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datacenter {
    #[serde(rename = "DATACENTERID")]
    pub id: i64,
    #[serde(rename = "LOCATION")]
    pub location: String,
    #[serde(rename = "ABBR", default)]
    pub abbr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(rename = "PLANID")]
    pub id: i64,
    #[serde(rename = "LABEL", default, deserialize_with = "lenient_string")]
    pub label: String,
    /// RAM in MB.
    #[serde(rename = "RAM")]
    pub ram: i64,
    /// Storage allowance in GB.
    #[serde(rename = "DISK")]
    pub disk: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    #[serde(rename = "DISTRIBUTIONID")]
    pub id: i64,
    #[serde(rename = "LABEL", deserialize_with = "lenient_string")]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    #[serde(rename = "IMAGEID")]
    pub id: i64,
    #[serde(rename = "LABEL", deserialize_with = "lenient_string")]
    pub label: String,
}

// ── Field decoders ───────────────────────────────────────────────────

/// Labels come back as numbers when they look like numbers.
fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// Booleans are sent as either `true`/`false` or `1`/`0`.
fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        serde_json::Value::String(s) => Ok(matches!(s.as_str(), "1" | "true")),
        serde_json::Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("not a flag: {other}"))),
    }
}

fn finish_time<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveDateTime>, D::Error> {
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
