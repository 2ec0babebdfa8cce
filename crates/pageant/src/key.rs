//! Key material reported by the agent.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Serialize, Serializer};
use ssh_encoding::Decode;
use ssh_key::{HashAlg, PublicKey};

/// One identity held by the agent.
///
/// The blob is kept verbatim: it is what a sign request must quote back.
/// Plain public keys additionally get a SHA-256 fingerprint; certificate
/// blobs don't parse as public keys and keep only algorithm and comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyDescriptor {
    pub algorithm: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(serialize_with = "serialize_base64")]
    pub blob: Vec<u8>,
}

impl KeyDescriptor {
    pub fn new(blob: Vec<u8>, comment: String) -> Self {
        let algorithm = Vec::<u8>::decode(&mut blob.as_slice())
            .ok()
            .map(|name| String::from_utf8_lossy(&name).into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        let fingerprint = if is_certificate_algorithm(&algorithm) {
            None
        } else {
            PublicKey::from_bytes(&blob)
                .ok()
                .map(|key| key.fingerprint(HashAlg::Sha256).to_string())
        };

        Self {
            algorithm,
            comment,
            fingerprint,
            blob,
        }
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        let mut key = PublicKey::from_bytes(&self.blob).ok()?;
        key.set_comment(self.comment.as_str());
        Some(key)
    }

    /// `authorized_keys` style line: `<algorithm> <base64> [comment]`.
    pub fn to_openssh_line(&self) -> String {
        let encoded = STANDARD.encode(&self.blob);
        if self.comment.is_empty() {
            format!("{} {}", self.algorithm, encoded)
        } else {
            format!("{} {} {}", self.algorithm, encoded, self.comment)
        }
    }

    pub fn is_certificate(&self) -> bool {
        is_certificate_algorithm(&self.algorithm)
    }
}

fn is_certificate_algorithm(name: &str) -> bool {
    name.contains("-cert-v01@openssh.com")
}

fn serialize_base64<S: Serializer>(blob: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(blob))
}

/// Signature returned by a sign request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub algorithm: String,
    pub bytes: Vec<u8>,
}
