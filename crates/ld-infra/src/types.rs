use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::credentials::{CredentialFingerprints, Credentials};

/// Remote-assigned linode identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinodeId(pub i64);

impl fmt::Display for LinodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LinodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| Error::InvalidId(s.to_string()))
    }
}

/// Lifecycle status as reported by the remote control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    BeingCreated,
    BrandNew,
    Running,
    PoweredOff,
    Unknown,
}

impl InstanceStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::BeingCreated,
            0 => Self::BrandNew,
            1 => Self::Running,
            2 => Self::PoweredOff,
            _ => Self::Unknown,
        }
    }
}

fn default_group() -> String {
    "Linode".into()
}

fn default_swap_size() -> i64 {
    512
}

fn enabled() -> bool {
    true
}

/// Target configuration for one linode.
///
/// Credentials are input only: this type is never serialized, and its
/// `Debug` output redacts them.
#[derive(Debug, Clone, Deserialize)]
pub struct DesiredState {
    /// Distribution label, private image label, or private image id. Fixed at creation.
    pub image: String,
    /// Kernel label; names starting with `Latest` float with the remote build.
    pub kernel: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_group")]
    pub group: String,
    /// Datacenter location name. Fixed at creation.
    pub region: String,
    /// Plan size as RAM in MB.
    pub size: i64,
    #[serde(default)]
    pub private_networking: bool,
    #[serde(default = "enabled")]
    pub manage_private_ip_automatically: bool,
    #[serde(default = "enabled")]
    pub helper_distro: bool,
    #[serde(default)]
    pub disk_expansion: bool,
    /// Swap disk size in MB; 0 skips the swap disk.
    #[serde(default = "default_swap_size")]
    pub swap_size: i64,
    #[serde(flatten)]
    pub credentials: Credentials,
}

/// Where downstream tooling should connect to reach the linode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub protocol: String,
    pub host: String,
}

impl ConnectionInfo {
    pub fn ssh(host: impl Into<String>) -> Self {
        Self {
            protocol: "ssh".into(),
            host: host.into(),
        }
    }
}

/// Remote state projected back into desired-state terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub linode_id: LinodeId,
    pub name: String,
    pub group: String,
    pub region: String,
    pub size: i64,
    pub status: InstanceStatus,
    /// Storage allowance of the current plan, in MB.
    pub plan_storage: i64,
    /// Sum of all disk sizes, in MB.
    pub plan_storage_utilized: i64,
    pub ip_address: Option<String>,
    pub private_networking: bool,
    pub private_ip_address: Option<String>,
    pub swap_size: i64,
    /// Boot config fields are only read when the linode has exactly one config.
    pub helper_distro: Option<bool>,
    pub manage_private_ip_automatically: Option<bool>,
    pub kernel: Option<String>,
    /// Image id recovered from the root disk label.
    pub image_id: Option<String>,
    pub connection: Option<ConnectionInfo>,
    /// Carried forward from provisioning; the remote never reports these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialFingerprints>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_state_defaults() {
        let desired: DesiredState = serde_json::from_value(serde_json::json!({
            "image": "Debian 9",
            "kernel": "Latest 64 bit",
            "region": "Dallas, TX, USA",
            "size": 2048,
            "ssh_key": "ssh-ed25519 AAAA",
            "root_password": "hunter2",
        }))
        .unwrap();

        assert_eq!(desired.group, "Linode");
        assert_eq!(desired.swap_size, 512);
        assert!(desired.helper_distro);
        assert!(desired.manage_private_ip_automatically);
        assert!(!desired.private_networking);
        assert!(!desired.disk_expansion);
        assert!(!format!("{desired:?}").contains("hunter2"));
    }

    #[test]
    fn linode_id_parse() {
        assert_eq!("8098".parse::<LinodeId>().unwrap(), LinodeId(8098));
        assert!(matches!("web1".parse::<LinodeId>(), Err(Error::InvalidId(_))));
    }

    #[test]
    fn status_codes() {
        assert_eq!(InstanceStatus::from_code(-1), InstanceStatus::BeingCreated);
        assert_eq!(InstanceStatus::from_code(2), InstanceStatus::PoweredOff);
        assert_eq!(InstanceStatus::from_code(7), InstanceStatus::Unknown);
    }
}
