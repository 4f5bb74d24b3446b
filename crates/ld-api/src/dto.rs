use ld_infra::credentials::CredentialFingerprints;
use ld_infra::types::DesiredState;
use serde::Deserialize;

// ── Requests ───────────────────────────────────────────────────────

/// Desired state plus the credential fingerprints returned when the linode
/// was provisioned. Without them a credential change cannot be detected.
#[derive(Debug, Deserialize)]
pub struct UpdateInstanceRequest {
    #[serde(flatten)]
    pub desired: DesiredState,
    #[serde(default)]
    pub stored_credentials: Option<CredentialFingerprints>,
}
