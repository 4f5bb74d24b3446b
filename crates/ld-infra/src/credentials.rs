//! Write-only credential material and the fingerprints kept in its place.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SSH key and root password handed to the image deploy.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub ssh_key: String,
    pub root_password: String,
}

impl Credentials {
    pub fn fingerprints(&self) -> CredentialFingerprints {
        CredentialFingerprints {
            ssh_key: Fingerprint::of(&self.ssh_key),
            root_password: Fingerprint::of(&self.root_password),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssh_key", &Fingerprint::of(&self.ssh_key))
            .field("root_password", &"<redacted>")
            .finish()
    }
}

/// Base64 SHA-256 digest of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(secret: &str) -> Self {
        Self(STANDARD.encode(Sha256::digest(secret.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialFingerprints {
    pub ssh_key: Fingerprint,
    pub root_password: Fingerprint,
}
